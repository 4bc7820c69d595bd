//! REST implementation of the record store.
//!
//! Talks to the versioned data API of the instance named in the [`Session`]:
//! `query`, `query` follow-up pages, `sobjects` create/upsert and raw blob
//! downloads, all authenticated with the session's bearer token.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::{QueryPage, RecordStore, SaveResult, Session, SourceRecord};
use crate::error::{Error, Result};

/// Connect timeout for all store requests. Transfers themselves are not
/// time-bounded so large payloads can finish.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates the HTTP client shared by every worker of a run.
#[must_use]
pub fn create_http_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Maps a non-2xx store response to an error.
pub fn handle_http_error(status_code: u16, body: &str) -> Error {
    match status_code {
        429 => Error::RateLimit(60),
        401 | 403 => {
            let message = parse_store_error(body)
                .map(|(_, message)| message)
                .unwrap_or_else(|| body.to_string());
            Error::Authentication(message)
        }
        _ => match parse_store_error(body) {
            Some((code, message)) => Error::Api {
                status: status_code,
                code,
                message,
            },
            None => Error::Api {
                status: status_code,
                code: None,
                message: if body.is_empty() {
                    format!("HTTP {status_code}")
                } else {
                    body.to_string()
                },
            },
        },
    }
}

/// Extracts `(errorCode, message)` from a store error payload.
///
/// Accepts the list form `[{"message": .., "errorCode": ..}]` as well as a
/// single error object.
pub fn parse_store_error(body: &str) -> Option<(Option<String>, String)> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let entry = match &value {
        serde_json::Value::Array(items) => items.first()?,
        serde_json::Value::Object(_) => &value,
        _ => return None,
    };
    let message = entry
        .get("message")
        .or_else(|| entry.get("error_description"))
        .and_then(|m| m.as_str())?
        .to_string();
    let code = entry
        .get("errorCode")
        .or_else(|| entry.get("error"))
        .and_then(|c| c.as_str())
        .map(String::from);
    Some((code, message))
}

/// Record store backed by the remote REST API.
pub struct RestRecordStore {
    session: Session,
    client: Client,
}

impl RestRecordStore {
    /// Creates a REST store for an established session.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            client: create_http_client(),
        }
    }

    /// Session this store authenticates with.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.session.data_url())
    }

    fn sobject_url(&self, object_type: &str) -> String {
        format!("{}/sobjects/{}/", self.session.data_url(), object_type)
    }

    fn upsert_url(
        &self,
        object_type: &str,
        external_id_field: &str,
        external_id: &str,
    ) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.session.data_url())
            .map_err(|e| Error::Config(format!("Invalid instance URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config("Instance URL cannot carry a path".to_string()))?
            .extend(["sobjects", object_type, external_id_field, external_id]);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.session.access_token)
    }

    async fn ensure_success(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(handle_http_error(status.as_u16(), &body))
    }

    async fn read_page(response: Response) -> Result<QueryPage> {
        let response = Self::ensure_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Query(format!("Failed to parse query response: {e}")))
    }

    async fn read_save_result(response: Response) -> Result<SaveResult> {
        let response = Self::ensure_success(response).await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(SaveResult {
                success: true,
                created: Some(false),
                ..Default::default()
            });
        }
        let result: SaveResult = response.json().await?;
        if !result.success {
            let body = serde_json::Value::Array(result.errors.clone()).to_string();
            return Err(handle_http_error(status.as_u16(), &body));
        }
        Ok(result)
    }
}

#[async_trait]
impl RecordStore for RestRecordStore {
    fn store_type(&self) -> &'static str {
        "rest"
    }

    async fn query(&self, soql: &str) -> Result<QueryPage> {
        debug!("Query: {}", soql);
        let response = self
            .authorized(self.client.get(self.query_url()))
            .query(&[("q", soql)])
            .send()
            .await?;
        Self::read_page(response).await
    }

    async fn query_more(&self, next_records_url: &str) -> Result<QueryPage> {
        let url = self.session.resolve(next_records_url)?;
        debug!("Fetching next query page: {}", url);
        let response = self.authorized(self.client.get(url)).send().await?;
        Self::read_page(response).await
    }

    async fn create(&self, object_type: &str, body: &SourceRecord) -> Result<SaveResult> {
        let response = self
            .authorized(self.client.post(self.sobject_url(object_type)))
            .json(body)
            .send()
            .await?;
        Self::read_save_result(response).await
    }

    async fn upsert(
        &self,
        object_type: &str,
        external_id_field: &str,
        external_id: &str,
        body: &SourceRecord,
    ) -> Result<SaveResult> {
        let url = self.upsert_url(object_type, external_id_field, external_id)?;
        let response = self
            .authorized(self.client.patch(url))
            .json(body)
            .send()
            .await?;
        Self::read_save_result(response).await
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.session.resolve(path)?;
        debug!("Downloading from {}", url);
        let response = self
            .authorized(self.client.get(&url))
            .header("Content-Type", "application/octet-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transfer(format!(
                "Couldn't download {url}: HTTP {}",
                status.as_u16()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
#[path = "rest_tests.rs"]
mod tests;
