//! Tests for the REST record store.

use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> RestRecordStore {
    RestRecordStore::new(Session::new(server.uri(), "test-token", "v59.0"))
}

#[test]
fn test_handle_http_error_auth() {
    let err = handle_http_error(
        401,
        r#"[{"message":"Session expired or invalid","errorCode":"INVALID_SESSION_ID"}]"#,
    );
    match err {
        Error::Authentication(message) => assert_eq!(message, "Session expired or invalid"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_handle_http_error_rate_limit() {
    assert!(matches!(handle_http_error(429, ""), Error::RateLimit(60)));
}

#[test]
fn test_handle_http_error_structured_payload() {
    let err = handle_http_error(
        400,
        r#"[{"message":"DUPLICATE_VALUE","errorCode":"DUPLICATE_VALUE","fields":[]}]"#,
    );
    match err {
        Error::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 400);
            assert_eq!(code.as_deref(), Some("DUPLICATE_VALUE"));
            assert_eq!(message, "DUPLICATE_VALUE");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_handle_http_error_unstructured_payload() {
    let err = handle_http_error(500, "upstream exploded");
    assert_eq!(err.record_message(), "upstream exploded");
}

#[test]
fn test_parse_store_error_object_form() {
    let parsed = parse_store_error(r#"{"error":"invalid_grant","error_description":"expired"}"#);
    assert_eq!(
        parsed,
        Some((Some("invalid_grant".to_string()), "expired".to_string()))
    );
}

#[tokio::test]
async fn test_query_sends_bearer_token_and_soql() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/data/v59.0/query"))
        .and(query_param("q", "SELECT Id FROM Attachment"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 1,
            "done": true,
            "records": [{"attributes": {"type": "Attachment"}, "Id": "00P1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = store_for(&server)
        .query("SELECT Id FROM Attachment")
        .await
        .unwrap();

    assert_eq!(page.total_size, 1);
    assert_eq!(page.records[0]["Id"], "00P1");
    assert!(page.next_page().is_none());
}

#[tokio::test]
async fn test_query_more_follows_relative_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/data/v59.0/query/01gNEXT-2000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 3,
            "done": true,
            "records": [{"Id": "00P3"}]
        })))
        .mount(&server)
        .await;

    let page = store_for(&server)
        .query_more("/services/data/v59.0/query/01gNEXT-2000")
        .await
        .unwrap();

    assert_eq!(page.records.len(), 1);
}

#[tokio::test]
async fn test_query_unauthorized_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/data/v59.0/query"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!([
            {"message": "Session expired or invalid", "errorCode": "INVALID_SESSION_ID"}
        ])))
        .mount(&server)
        .await;

    let result = store_for(&server).query("SELECT Id FROM Account").await;

    assert!(matches!(result, Err(Error::Authentication(_))));
}

#[tokio::test]
async fn test_create_returns_new_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/data/v59.0/sobjects/Attachment/"))
        .and(body_json(json!({"Name": "a.pdf", "ParentId": "001NEW"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "00PNEW",
            "success": true,
            "errors": []
        })))
        .mount(&server)
        .await;

    let mut body = SourceRecord::new();
    body.insert("Name".into(), json!("a.pdf"));
    body.insert("ParentId".into(), json!("001NEW"));

    let result = store_for(&server).create("Attachment", &body).await.unwrap();

    assert!(result.success);
    assert_eq!(result.id.as_deref(), Some("00PNEW"));
}

#[tokio::test]
async fn test_create_rejection_carries_store_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/data/v59.0/sobjects/Attachment/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!([
            {"message": "DUPLICATE_VALUE", "errorCode": "DUPLICATE_VALUE", "fields": []}
        ])))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .create("Attachment", &SourceRecord::new())
        .await
        .unwrap_err();

    assert_eq!(err.record_message(), "DUPLICATE_VALUE");
}

#[tokio::test]
async fn test_upsert_update_returns_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(
            "/services/data/v59.0/sobjects/ContentVersion/Legacy_Id__c/068OLD",
        ))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let result = store_for(&server)
        .upsert("ContentVersion", "Legacy_Id__c", "068OLD", &SourceRecord::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.created, Some(false));
}

#[tokio::test]
async fn test_download_returns_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/data/v59.0/sobjects/Attachment/00P1/Body"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
        .mount(&server)
        .await;

    let bytes = store_for(&server)
        .download("/services/data/v59.0/sobjects/Attachment/00P1/Body")
        .await
        .unwrap();

    assert_eq!(bytes, b"%PDF-1.4");
}

#[tokio::test]
async fn test_download_non_success_is_transfer_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/data/v59.0/sobjects/Attachment/00P9/Body"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .download("/services/data/v59.0/sobjects/Attachment/00P9/Body")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transfer(_)));
    assert!(err.record_message().contains("HTTP 404"));
}

#[tokio::test]
async fn test_download_refuses_foreign_host() {
    let server = MockServer::start().await;
    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"leak".to_vec()))
        .expect(0)
        .mount(&other)
        .await;

    let err = store_for(&server)
        .download(&format!("{}/files/00P1", other.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
}
