//! Per-package remediation analysis over canonical rows.

use crate::model::CanonicalRow;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageAnalysis {
    pub package: String,
    /// Distinct top-level parents, in first-seen order.
    pub parents: Vec<String>,
    pub oldest_version: String,
    /// Parent of the row carrying `oldest_version`.
    pub oldest_parent: String,
}

/// Semver order when both sides parse, plain string order otherwise.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

pub fn analyze(rows: &[CanonicalRow]) -> Vec<PackageAnalysis> {
    let mut analyses: Vec<PackageAnalysis> = Vec::new();

    for row in rows {
        let parent = row.top_level_parent().unwrap_or_default();

        let Some(entry) = analyses.iter_mut().find(|a| a.package == row.package) else {
            analyses.push(PackageAnalysis {
                package: row.package.clone(),
                parents: if parent.is_empty() {
                    Vec::new()
                } else {
                    vec![parent.to_string()]
                },
                oldest_version: row.version.clone(),
                oldest_parent: parent.to_string(),
            });
            continue;
        };

        if !parent.is_empty() && !entry.parents.iter().any(|p| p == parent) {
            entry.parents.push(parent.to_string());
        }
        if compare_versions(&row.version, &entry.oldest_version) == Ordering::Less {
            entry.oldest_version = row.version.clone();
            entry.oldest_parent = parent.to_string();
        }
    }

    analyses
}

/// Renders the analysis as plain text, one block per package.
pub fn render_analysis(analyses: &[PackageAnalysis]) -> String {
    if analyses.is_empty() {
        return "No vulnerabilities detected.".to_string();
    }

    let mut out = String::new();
    for (i, analysis) in analyses.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let _ = write!(out, "Vulnerable package: {}", analysis.package);
        match analysis.parents.as_slice() {
            [] => {}
            [only] => {
                let _ = write!(out, "\n- Parent: {}", only);
            }
            many => {
                let _ = write!(out, "\n- Found in multiple parents: {}", many.join(", "));
            }
        }
        let _ = write!(
            out,
            "\n- Oldest version among parents: {} ({})",
            analysis.oldest_parent, analysis.oldest_version
        );
        let _ = write!(
            out,
            "\n- Upgrade recommendation: Check npmjs.com for the latest safe version of {} and upgrade the parent(s) if possible.",
            analysis.package
        );
    }
    out
}
