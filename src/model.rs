use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name given to a tree root that carries no `name` field.
pub const ROOT_NAME: &str = "root";

/// Separator used when a parent chain is rendered for display.
pub const CHAIN_SEPARATOR: &str = " -> ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub package: String,
    pub severity: String, // "low", "moderate", "high", "critical" or empty
    pub advisory_url: String,
}

/// Severity and advisory link for one vulnerable package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityDetail {
    pub severity: String,
    pub advisory_url: String,
}

impl From<&VulnerabilityRecord> for VulnerabilityDetail {
    fn from(record: &VulnerabilityRecord) -> Self {
        Self {
            severity: record.severity.clone(),
            advisory_url: record.advisory_url.clone(),
        }
    }
}

/// One node of an `npm ls --all --json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyTreeNode {
    pub name: String,
    pub version: String,
    /// Children in the order the source document lists them.
    pub dependencies: Vec<DependencyTreeNode>,
}

impl DependencyTreeNode {
    /// Builds the root of a tree from a parsed document.
    ///
    /// Never fails: a non-object document yields an empty root, and missing
    /// or mistyped fields fall back to empty values.
    pub fn from_document(doc: &Value) -> Self {
        let name = doc
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or(ROOT_NAME);
        Self::from_value(name, doc)
    }

    /// Builds a node named `name` from its JSON body.
    pub fn from_value(name: &str, value: &Value) -> Self {
        let version = value
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let dependencies = value
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|deps| {
                deps.iter()
                    .map(|(child, body)| Self::from_value(child, body))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.to_string(),
            version,
            dependencies,
        }
    }

    pub fn leaf(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: DependencyTreeNode) -> Self {
        self.dependencies.push(child);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub package: String,
    pub version: String,
    /// Ancestor names below the synthetic root, ending with `package`.
    pub parent_chain: Vec<String>,
    pub severity: String,
    pub advisory_url: String,
}

impl DiscoveryRecord {
    /// Key under which discoveries of the same installed version collapse.
    pub fn dedup_key(&self) -> String {
        format!("{}@{}", self.package, self.version)
    }

    pub fn display_chain(&self) -> String {
        self.parent_chain.join(CHAIN_SEPARATOR)
    }

    /// First element of the chain, if any.
    pub fn top_level_parent(&self) -> Option<&str> {
        self.parent_chain.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRow {
    #[serde(flatten)]
    pub discovery: DiscoveryRecord,
    /// Empty until the registry enricher fills it, and on lookup failure.
    #[serde(default)]
    pub latest_version: String,
}

impl From<DiscoveryRecord> for CanonicalRow {
    fn from(discovery: DiscoveryRecord) -> Self {
        Self {
            discovery,
            latest_version: String::new(),
        }
    }
}

impl std::ops::Deref for CanonicalRow {
    type Target = DiscoveryRecord;

    fn deref(&self) -> &Self::Target {
        &self.discovery
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeGroup {
    pub parent: String,
    pub packages: Vec<String>,
}
