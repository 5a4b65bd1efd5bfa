//! Schema normalization for `npm audit --json` reports.
//!
//! Three shapes are understood and may coexist in one document:
//! - npm v6 `advisories`: advisory ID → advisory object with `module_name`
//! - npm v7+ `vulnerabilities`: package name → detail object with `via`
//! - a bare array of objects carrying `module_name` or `package`
//!
//! Sections are processed in that order and all of them are read; when a
//! package shows up more than once the [`MergePolicy`] decides which detail
//! is kept.

use crate::harvest::traits::HarvestStage;
use crate::model::{VulnerabilityDetail, VulnerabilityRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Rule applied when a report lists the same package more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// The first record seen for a package is kept unchanged.
    #[default]
    FirstSeen,

    /// A later record replaces the kept one only if its severity ranks
    /// strictly higher. An empty advisory URL on the kept record is filled
    /// from later records.
    HighestSeverity,
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first-seen" | "first" => Ok(Self::FirstSeen),
            "highest-severity" | "highest" => Ok(Self::HighestSeverity),
            other => Err(format!(
                "unknown merge policy '{}' (expected first-seen or highest-severity)",
                other
            )),
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstSeen => f.write_str("first-seen"),
            Self::HighestSeverity => f.write_str("highest-severity"),
        }
    }
}

/// Ranks npm severity labels. Unknown and empty labels rank lowest.
pub fn severity_rank(severity: &str) -> i8 {
    match severity.to_ascii_lowercase().as_str() {
        "critical" => 4,
        "high" => 3,
        "moderate" | "medium" => 2,
        "low" => 1,
        "info" => 0,
        _ => -1,
    }
}

/// Canonical vulnerable set plus per-package details, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VulnerabilityIndex {
    records: Vec<VulnerabilityRecord>,
    positions: HashMap<String, usize>,
}

impl VulnerabilityIndex {
    pub fn contains(&self, package: &str) -> bool {
        self.positions.contains_key(package)
    }

    pub fn detail(&self, package: &str) -> Option<VulnerabilityDetail> {
        self.record(package).map(VulnerabilityDetail::from)
    }

    pub fn record(&self, package: &str) -> Option<&VulnerabilityRecord> {
        self.positions.get(package).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[VulnerabilityRecord] {
        &self.records
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.package.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn insert(&mut self, record: VulnerabilityRecord, policy: MergePolicy) {
        let Some(&i) = self.positions.get(&record.package) else {
            self.positions.insert(record.package.clone(), self.records.len());
            self.records.push(record);
            return;
        };

        let kept = &mut self.records[i];
        match policy {
            MergePolicy::FirstSeen => {}
            MergePolicy::HighestSeverity => {
                if severity_rank(&record.severity) > severity_rank(&kept.severity) {
                    let fallback_url = std::mem::take(&mut kept.advisory_url);
                    *kept = record;
                    if kept.advisory_url.is_empty() {
                        kept.advisory_url = fallback_url;
                    }
                } else if kept.advisory_url.is_empty() {
                    kept.advisory_url = record.advisory_url;
                }
            }
        }
    }
}

/// Converts any supported report shape into a [`VulnerabilityIndex`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaNormalizer {
    policy: MergePolicy,
}

impl SchemaNormalizer {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn normalize(&self, report: &Value) -> VulnerabilityIndex {
        let mut index = VulnerabilityIndex::default();

        if let Some(advisories) = report.get("advisories").and_then(Value::as_object) {
            debug!(count = advisories.len(), "Reading advisories section");
            for advisory in advisories.values() {
                if let Some(record) = advisory_record(advisory) {
                    index.insert(record, self.policy);
                }
            }
        }

        match report.get("vulnerabilities") {
            Some(Value::Object(vulnerabilities)) => {
                debug!(count = vulnerabilities.len(), "Reading vulnerabilities section");
                for (package, detail) in vulnerabilities {
                    if let Some(record) = vulnerability_record(package, detail) {
                        index.insert(record, self.policy);
                    }
                }
            }
            Some(Value::Array(items)) => {
                for item in items {
                    if let Some(record) = list_record(item) {
                        index.insert(record, self.policy);
                    }
                }
            }
            _ => {}
        }

        if let Some(items) = report.as_array() {
            debug!(count = items.len(), "Reading bare advisory list");
            for item in items {
                if let Some(record) = list_record(item) {
                    index.insert(record, self.policy);
                }
            }
        }

        index
    }
}

impl<'a> HarvestStage<'a> for SchemaNormalizer {
    type Input = &'a Value;
    type Output = VulnerabilityIndex;

    fn execute(&self, input: Self::Input) -> Self::Output {
        self.normalize(input)
    }

    fn stage_name(&self) -> &'static str {
        "normalize"
    }
}

fn str_field<'v>(value: &'v Value, key: &str) -> &'v str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn advisory_record(advisory: &Value) -> Option<VulnerabilityRecord> {
    let package = str_field(advisory, "module_name");
    if package.is_empty() {
        return None;
    }

    let mut advisory_url = str_field(advisory, "url").to_string();
    if advisory_url.is_empty() {
        advisory_url = advisory
            .get("cves")
            .and_then(Value::as_array)
            .and_then(|cves| cves.first())
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }

    Some(VulnerabilityRecord {
        package: package.to_string(),
        severity: str_field(advisory, "severity").to_string(),
        advisory_url,
    })
}

fn vulnerability_record(package: &str, detail: &Value) -> Option<VulnerabilityRecord> {
    if package.is_empty() {
        return None;
    }

    // `via` mixes plain package names with advisory objects.
    let advisory_url = detail
        .get("via")
        .and_then(Value::as_array)
        .and_then(|via| {
            via.iter()
                .filter_map(|entry| entry.get("url").and_then(Value::as_str))
                .find(|url| !url.is_empty())
        })
        .unwrap_or_default()
        .to_string();

    Some(VulnerabilityRecord {
        package: package.to_string(),
        severity: str_field(detail, "severity").to_string(),
        advisory_url,
    })
}

fn list_record(item: &Value) -> Option<VulnerabilityRecord> {
    let package = [str_field(item, "module_name"), str_field(item, "package")]
        .into_iter()
        .find(|name| !name.is_empty())?;

    Some(VulnerabilityRecord {
        package: package.to_string(),
        severity: str_field(item, "severity").to_string(),
        advisory_url: str_field(item, "url").to_string(),
    })
}
