//! Configuration types for recordfiles-migrate.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::{Error, Result};
use crate::store::{Session, DEFAULT_API_VERSION};
use crate::transfer::DEFAULT_WORKERS;

/// Largest batch size accepted; bigger id lists overflow the query URL.
pub const MAX_BATCH_SIZE: usize = 2000;

/// Connection details for the remote store.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Instance base URL.
    pub instance_url: String,
    /// Bearer token.
    #[serde(default)]
    pub access_token: String,
    /// REST API version.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Account name, shown in logs only.
    #[serde(default)]
    pub username: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("instance_url", &self.instance_url)
            .field("access_token", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("username", &self.username)
            .finish()
    }
}

impl Credentials {
    /// Load credentials from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let credentials: Self = serde_yaml::from_str(&content)?;
        Ok(credentials)
    }

    /// Validate the credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s) or the token is empty.
    pub fn validate(&self) -> Result<()> {
        if !(self.instance_url.starts_with("https://") || self.instance_url.starts_with("http://"))
        {
            return Err(Error::Config(format!(
                "instance_url must be an http(s) URL, got '{}'",
                self.instance_url
            )));
        }
        if self.access_token.trim().is_empty() {
            return Err(Error::Config(
                "access_token cannot be empty (set it in the file or via RF_ACCESS_TOKEN)"
                    .to_string(),
            ));
        }
        if self.api_version.is_empty() {
            return Err(Error::Config("api_version cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Builds the shared session.
    #[must_use]
    pub fn session(&self) -> Session {
        Session::new(&self.instance_url, &self.access_token, &self.api_version)
    }
}

/// Export/import settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Attachment export settings.
    #[serde(default)]
    pub attachment: AttachmentSettings,
    /// ContentVersion export settings.
    #[serde(default)]
    pub content_version: ContentVersionSettings,
    /// Run options.
    #[serde(default)]
    pub options: RunOptions,
}

/// Attachment export settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentSettings {
    /// Manifest file name, relative to the output directory.
    pub output_file: String,
    /// Fields selected for each Attachment.
    pub query_fields: Vec<String>,
    /// Payload directory name, relative to the output directory.
    pub output_dir: String,
}

impl Default for AttachmentSettings {
    fn default() -> Self {
        Self {
            output_file: "Attachment.csv".to_string(),
            query_fields: fields(&[
                "Id",
                "ParentId",
                "OwnerId",
                "CreatedById",
                "CreatedDate",
                "LastModifiedById",
                "LastModifiedDate",
                "Name",
                "ContentType",
                "BodyLength",
                "Description",
                "IsPrivate",
                "Body",
            ]),
            output_dir: "Attachment".to_string(),
        }
    }
}

/// ContentVersion export settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentVersionSettings {
    /// ContentDocumentLink manifest file name.
    pub link_output_file: String,
    /// Fields selected for each ContentDocumentLink.
    pub link_query_fields: Vec<String>,
    /// ContentVersion manifest file name.
    pub output_file: String,
    /// Fields selected for each ContentVersion.
    pub query_fields: Vec<String>,
    /// Payload directory name.
    pub output_dir: String,
}

impl Default for ContentVersionSettings {
    fn default() -> Self {
        Self {
            link_output_file: "ContentDocumentLink.csv".to_string(),
            link_query_fields: fields(&[
                "Id",
                "ContentDocumentId",
                "LinkedEntityId",
                "ShareType",
                "Visibility",
            ]),
            output_file: "ContentVersion.csv".to_string(),
            query_fields: fields(&[
                "Id",
                "ContentDocumentId",
                "Title",
                "Description",
                "PathOnClient",
                "FileExtension",
                "ContentSize",
                "CreatedDate",
                "LastModifiedDate",
                "ContentUrl",
                "ReasonForChange",
                "SharingOption",
                "SharingPrivacy",
                "Origin",
                "ContentLocation",
                "ExternalDocumentInfo1",
                "ExternalDocumentInfo2",
                "IsMajorVersion",
                "VersionData",
            ]),
            output_dir: "ContentVersion".to_string(),
        }
    }
}

/// Run options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Identifiers per batch query.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent transfers per batch.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Log level when neither `--verbose` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            log_level: default_log_level(),
        }
    }
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|&name| name.to_string()).collect()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn require(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{name} cannot be empty")));
    }
    Ok(())
}

fn require_fields(list: &[String], name: &str) -> Result<()> {
    if list.is_empty() || list.iter().any(|field| field.trim().is_empty()) {
        return Err(Error::Config(format!(
            "{name} must list at least one field and no blank entries"
        )));
    }
    Ok(())
}

impl MigrationSettings {
    /// Load settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid.
    pub fn validate(&self) -> Result<()> {
        let options = &self.options;
        if options.batch_size == 0 || options.batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                options.batch_size
            )));
        }
        if options.workers == 0 {
            return Err(Error::Config(
                "workers must be greater than 0".to_string(),
            ));
        }

        require(&self.attachment.output_file, "attachment.output_file")?;
        require(&self.attachment.output_dir, "attachment.output_dir")?;
        require_fields(&self.attachment.query_fields, "attachment.query_fields")?;

        let cv = &self.content_version;
        require(&cv.link_output_file, "content_version.link_output_file")?;
        require(&cv.output_file, "content_version.output_file")?;
        require(&cv.output_dir, "content_version.output_dir")?;
        require_fields(&cv.link_query_fields, "content_version.link_query_fields")?;
        require_fields(&cv.query_fields, "content_version.query_fields")?;
        if !cv.link_query_fields.iter().any(|f| f == "ContentDocumentId") {
            return Err(Error::Config(
                "content_version.link_query_fields must include ContentDocumentId".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = MigrationSettings::default();
        assert_eq!(settings.options.batch_size, 100);
        assert_eq!(settings.options.workers, 4);
        assert_eq!(settings.options.log_level, "info");
        assert_eq!(settings.attachment.output_file, "Attachment.csv");
        assert!(settings.attachment.query_fields.contains(&"Body".to_string()));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_yaml_parse_partial() {
        let yaml = r#"
attachment:
  output_dir: files
options:
  batch_size: 50
"#;
        let settings: MigrationSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.attachment.output_dir, "files");
        assert_eq!(settings.attachment.output_file, "Attachment.csv");
        assert_eq!(settings.options.batch_size, 50);
        assert_eq!(settings.options.workers, 4);
        assert_eq!(settings.content_version, ContentVersionSettings::default());
    }

    #[test]
    fn test_settings_validate_batch_size() {
        let mut settings = MigrationSettings::default();
        settings.options.batch_size = 0;
        assert!(settings.validate().is_err());

        settings.options.batch_size = MAX_BATCH_SIZE + 1;
        assert!(settings.validate().is_err());

        settings.options.batch_size = MAX_BATCH_SIZE;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validate_workers_and_fields() {
        let mut settings = MigrationSettings::default();
        settings.options.workers = 0;
        assert!(settings.validate().is_err());

        let mut settings = MigrationSettings::default();
        settings.content_version.query_fields.clear();
        assert!(settings.validate().is_err());

        let mut settings = MigrationSettings::default();
        settings.attachment.output_file = " ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_credentials_yaml_parse() {
        let yaml = r#"
instance_url: https://acme.my.example.com/
access_token: 00Dxx!token
username: admin@acme.example
"#;
        let credentials: Credentials = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(credentials.api_version, "v59.0");
        assert!(credentials.validate().is_ok());

        let session = credentials.session();
        assert_eq!(session.instance_url, "https://acme.my.example.com");
        assert!(!format!("{credentials:?}").contains("00Dxx"));
    }

    #[test]
    fn test_credentials_validate() {
        let mut credentials: Credentials =
            serde_yaml::from_str("instance_url: ftp://acme\naccess_token: t\n").unwrap();
        assert!(credentials.validate().is_err());

        credentials.instance_url = "https://acme".to_string();
        credentials.access_token = String::new();
        assert!(credentials.validate().is_err());
    }
}
