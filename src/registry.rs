//! npm registry client for latest-version lookups.

use crate::traits::{LookupError, VersionSource};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Public npm registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Request timeout for registry calls (in seconds).
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Abbreviated packument; still carries `dist-tags`.
const ABBREVIATED_ACCEPT: &str = "application/vnd.npm.install-v1+json";

/// Reads `dist-tags.latest` from package metadata served by an npm registry.
pub struct NpmRegistry {
    client: Client,
    base_url: String,
}

impl NpmRegistry {
    pub fn new(base_url: &str) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("audit-harvester/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(base_url, client))
    }

    /// Uses a caller-configured client (proxy, TLS roots, timeouts).
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn package_url(&self, package: &str) -> String {
        format!("{}/{}", self.base_url, encoded_package_path(package))
    }
}

/// Scoped names keep the `@` but escape the slash: `@scope%2Fname`.
pub fn encoded_package_path(package: &str) -> String {
    if package.starts_with('@') {
        package.replace('/', "%2F")
    } else {
        package.to_string()
    }
}

/// Extracts `dist-tags.latest` from a packument.
pub fn latest_tag(metadata: &Value) -> Option<&str> {
    metadata
        .get("dist-tags")
        .and_then(|tags| tags.get("latest"))
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl VersionSource for NpmRegistry {
    fn registry_id(&self) -> &str {
        &self.base_url
    }

    async fn latest_version(&self, package: &str) -> Result<String, LookupError> {
        let response = self
            .client
            .get(self.package_url(package))
            .header(reqwest::header::ACCEPT, ABBREVIATED_ACCEPT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LookupError::Status(response.status().as_u16()));
        }

        let metadata: Value = response.json().await?;
        latest_tag(&metadata)
            .map(str::to_string)
            .ok_or_else(|| LookupError::MissingLatest(package.to_string()))
    }
}
