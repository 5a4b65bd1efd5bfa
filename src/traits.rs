use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Registry returned status {0}")]
    Status(u16),
    #[error("No latest tag for package: {0}")]
    MissingLatest(String),
    #[error("Lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("Unknown error: {0}")]
    Unknown(String),
}

#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Returns the registry this source queries (e.g., "https://registry.npmjs.org").
    fn registry_id(&self) -> &str;

    /// Looks up the latest published version of `package`.
    async fn latest_version(&self, package: &str) -> Result<String, LookupError>;
}
