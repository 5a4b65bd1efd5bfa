//! Resolution pipeline executor.
//!
//! This module provides the [`HarvestPipeline`] coordinator that runs the
//! engine stages (Normalize → Walk → Dedup → Reduce) followed by optional
//! registry enrichment:
//! - The engine stages are pure and run on a blocking task
//! - Enrichment fans out via [`EnrichmentExecutor`] and never fails the run
//! - Timing and counts are collected into [`HarvestStats`] and logged via `tracing`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::executor::EnrichmentExecutor;
use crate::harvest::dedup::Deduplicator;
use crate::harvest::input::{read_json, TreeSource};
use crate::harvest::normalize::{MergePolicy, SchemaNormalizer, VulnerabilityIndex};
use crate::harvest::reduce::UpgradeReducer;
use crate::harvest::traits::{HarvestStage, LoadError};
use crate::harvest::walk::TreeWalker;
use crate::model::{CanonicalRow, DependencyTreeNode, UpgradeGroup};
use crate::traits::VersionSource;

// ============================================================================
// Pipeline Types
// ============================================================================

/// Output of the pure engine stages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    /// Normalized vulnerable set and details
    #[serde(skip)]
    pub index: VulnerabilityIndex,

    /// One row per vulnerable `package@version` found in the tree
    pub rows: Vec<CanonicalRow>,

    /// Top-level upgrade recommendations
    pub upgrades: Vec<UpgradeGroup>,
}

/// Complete harvest result with rows, groups and statistics.
#[derive(Debug)]
pub struct HarvestResult {
    pub resolution: Resolution,

    /// Whether `latest_version` was looked up for the rows
    pub enriched: bool,

    pub stats: HarvestStats,
}

/// Statistics about one harvest run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct HarvestStats {
    /// Distinct vulnerable package names in the report
    pub vulnerable_packages: usize,

    /// Raw discoveries before deduplication
    pub discoveries: usize,

    /// Rows after deduplication
    pub rows: usize,

    /// Upgrade groups produced
    pub upgrade_groups: usize,

    /// Registry lookups issued and how many of them yielded nothing
    pub lookups_attempted: usize,
    pub lookups_failed: usize,

    /// Time spent reading inputs (microseconds)
    pub load_duration_us: u64,

    /// Time spent in the pure engine stages (microseconds)
    pub resolve_duration_us: u64,

    /// Time spent on registry lookups (microseconds)
    pub enrich_duration_us: u64,

    /// Total time of the run (microseconds)
    pub total_duration_us: u64,
}

/// Inputs to one run.
#[derive(Debug, Clone)]
pub struct HarvestInputs {
    pub report: PathBuf,
    pub tree: TreeSource,
}

/// Registry lookups attached to a pipeline.
#[derive(Clone)]
pub struct Enrichment {
    pub executor: Arc<EnrichmentExecutor>,
    pub source: Arc<dyn VersionSource>,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that can occur during pipeline execution.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The audit report could not be loaded
    #[error("Audit report: {0}")]
    Report(#[source] LoadError),

    /// The dependency tree could not be loaded
    #[error("Dependency tree: {0}")]
    Tree(#[source] LoadError),

    /// The blocking resolution task failed to complete
    #[error("Resolution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// True when the audit report file itself is missing.
    pub fn is_missing_report(&self) -> bool {
        matches!(self, Self::Report(LoadError::NotFound { .. }))
    }
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Resolution pipeline with optional registry enrichment.
///
/// # Example
///
/// ```ignore
/// use audit_harvester::harvest::{HarvestInputs, HarvestPipeline, TreeSource};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = HarvestPipeline::new();
///     let result = pipeline
///         .execute(&HarvestInputs {
///             report: "npm-audit.json".into(),
///             tree: TreeSource::File("tree.json".into()),
///         })
///         .await?;
///     println!("{} vulnerable rows", result.resolution.rows.len());
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct HarvestPipeline {
    normalizer: SchemaNormalizer,
    walker: TreeWalker,
    deduplicator: Deduplicator,
    reducer: UpgradeReducer,
    enrichment: Option<Enrichment>,
}

impl HarvestPipeline {
    /// Creates a pipeline with the first-seen merge policy and no enrichment.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.normalizer = SchemaNormalizer::new(policy);
        self
    }

    /// Enables latest-version lookups for every canonical row.
    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    /// Runs the pure stages over already-parsed documents.
    pub fn resolve(&self, report: &Value, tree: &Value) -> (Resolution, HarvestStats) {
        self.resolve_index(self.normalizer.execute(report), tree)
    }

    /// Runs walk, dedup and reduce against an already normalized report.
    pub fn resolve_index(
        &self,
        index: VulnerabilityIndex,
        tree: &Value,
    ) -> (Resolution, HarvestStats) {
        let mut stats = HarvestStats::default();
        stats.vulnerable_packages = index.len();
        if index.is_empty() {
            info!("No vulnerable packages found in audit report");
        }

        let root = DependencyTreeNode::from_document(tree);
        let discoveries = self.walker.execute((&root, &index));
        stats.discoveries = discoveries.len();

        let rows = self.deduplicator.execute(discoveries);
        stats.rows = rows.len();

        let upgrades = self.reducer.execute(&rows);
        stats.upgrade_groups = upgrades.len();

        info!(
            vulnerable = stats.vulnerable_packages,
            discoveries = stats.discoveries,
            rows = stats.rows,
            groups = stats.upgrade_groups,
            "Resolution completed"
        );

        (
            Resolution {
                index,
                rows,
                upgrades,
            },
            stats,
        )
    }

    /// Loads both documents, resolves them and enriches the rows.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only when an input cannot be loaded. Lookup
    /// failures leave the affected rows with an empty `latest_version`.
    #[instrument(skip(self))]
    pub async fn execute(&self, inputs: &HarvestInputs) -> Result<HarvestResult, PipelineError> {
        let start = Instant::now();

        // ====================================================================
        // Stage 1: Load
        // ====================================================================

        info!(report = %inputs.report.display(), "Loading inputs");
        let report = read_json(&inputs.report).await.map_err(PipelineError::Report)?;

        let index = self.normalizer.execute(&report);

        // Nothing can match an empty vulnerable set, so the tree is not needed.
        let tree = if index.is_empty() {
            info!("Audit report lists no vulnerable packages, skipping dependency tree");
            Value::Null
        } else {
            inputs.tree.load().await.map_err(PipelineError::Tree)?
        };
        let load_duration_us = start.elapsed().as_micros() as u64;

        // ====================================================================
        // Stage 2: Resolve
        // ====================================================================

        let resolve_start = Instant::now();
        let pipeline = self.clone();
        let (mut resolution, mut stats) =
            tokio::task::spawn_blocking(move || pipeline.resolve_index(index, &tree)).await?;
        stats.load_duration_us = load_duration_us;
        stats.resolve_duration_us = resolve_start.elapsed().as_micros() as u64;

        // ====================================================================
        // Stage 3: Enrich (optional)
        // ====================================================================

        let enriched = match &self.enrichment {
            Some(enrichment) if !resolution.rows.is_empty() => {
                let enrich_start = Instant::now();
                let packages: Vec<String> =
                    resolution.rows.iter().map(|r| r.package.clone()).collect();

                let report = enrichment
                    .executor
                    .enrich(Arc::clone(&enrichment.source), &packages)
                    .await;
                report.apply(&mut resolution.rows);

                stats.lookups_attempted = report.attempted;
                stats.lookups_failed = report.failed;
                stats.enrich_duration_us = enrich_start.elapsed().as_micros() as u64;
                true
            }
            Some(_) => true,
            None => false,
        };

        stats.total_duration_us = start.elapsed().as_micros() as u64;
        info!(
            total_us = stats.total_duration_us,
            lookups = stats.lookups_attempted,
            lookups_failed = stats.lookups_failed,
            "Harvest completed"
        );

        Ok(HarvestResult {
            resolution,
            enriched,
            stats,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LookupError;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedSource;

    #[async_trait]
    impl VersionSource for FixedSource {
        fn registry_id(&self) -> &str {
            "fixed"
        }

        async fn latest_version(&self, package: &str) -> Result<String, LookupError> {
            match package {
                "lodash" => Ok("4.17.21".to_string()),
                _ => Err(LookupError::Status(404)),
            }
        }
    }

    fn report() -> Value {
        json!({
            "vulnerabilities": {
                "lodash": { "severity": "high", "via": [{ "url": "https://x/1" }] },
                "minimist": { "severity": "low", "via": [] }
            }
        })
    }

    fn tree() -> Value {
        json!({
            "name": "app",
            "dependencies": {
                "a": { "version": "1.0.0", "dependencies": { "lodash": { "version": "4.17.0" } } },
                "b": {
                    "version": "1.0.0",
                    "dependencies": {
                        "lodash": { "version": "4.17.0" },
                        "minimist": { "version": "0.0.8" }
                    }
                }
            }
        })
    }

    fn write_inputs(dir: &std::path::Path) -> HarvestInputs {
        let report_path = dir.join("npm-audit.json");
        let tree_path = dir.join("tree.json");
        std::fs::write(&report_path, report().to_string()).unwrap();
        std::fs::write(&tree_path, tree().to_string()).unwrap();
        HarvestInputs {
            report: report_path,
            tree: TreeSource::File(tree_path),
        }
    }

    #[test]
    fn test_resolve_collapses_and_groups() {
        let (resolution, stats) = HarvestPipeline::new().resolve(&report(), &tree());

        assert_eq!(stats.vulnerable_packages, 2);
        assert_eq!(stats.discoveries, 3);
        assert_eq!(stats.rows, 2);

        assert_eq!(resolution.rows[0].display_chain(), "a -> lodash");
        assert_eq!(resolution.rows[1].display_chain(), "b -> minimist");
        assert_eq!(resolution.upgrades.len(), 2);
        assert_eq!(resolution.upgrades[0].parent, "a");
        assert_eq!(resolution.upgrades[1].packages, vec!["minimist".to_string()]);
    }

    #[tokio::test]
    async fn test_execute_without_enrichment() {
        let dir = tempfile::tempdir().unwrap();
        let result = HarvestPipeline::new()
            .execute(&write_inputs(dir.path()))
            .await
            .unwrap();

        assert!(!result.enriched);
        assert_eq!(result.resolution.rows.len(), 2);
        assert!(result.resolution.rows.iter().all(|r| r.latest_version.is_empty()));
        assert_eq!(result.stats.lookups_attempted, 0);
    }

    #[tokio::test]
    async fn test_execute_with_enrichment_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = HarvestPipeline::new().with_enrichment(Enrichment {
            executor: Arc::new(EnrichmentExecutor::new(4)),
            source: Arc::new(FixedSource),
        });

        let result = pipeline.execute(&write_inputs(dir.path())).await.unwrap();

        assert!(result.enriched);
        let rows = &result.resolution.rows;
        assert_eq!(rows[0].latest_version, "4.17.21");
        assert_eq!(rows[1].latest_version, "");
        assert_eq!(result.stats.lookups_attempted, 2);
        assert_eq!(result.stats.lookups_failed, 1);
    }

    #[test]
    fn test_resolve_index_matches_resolve() {
        let pipeline = HarvestPipeline::new();
        let index = SchemaNormalizer::default().normalize(&report());

        let (from_index, stats) = pipeline.resolve_index(index.clone(), &tree());
        let (from_report, _) = pipeline.resolve(&report(), &tree());

        assert_eq!(stats.vulnerable_packages, 2);
        assert_eq!(from_index.index, index);
        assert_eq!(from_index.rows, from_report.rows);
        assert_eq!(from_index.upgrades, from_report.upgrades);
    }

    #[tokio::test]
    async fn test_execute_skips_tree_for_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("npm-audit.json");
        std::fs::write(&report_path, r#"{ "auditReportVersion": 2, "vulnerabilities": {} }"#)
            .unwrap();
        let inputs = HarvestInputs {
            report: report_path,
            tree: TreeSource::File(dir.path().join("absent-tree.json")),
        };

        let result = HarvestPipeline::new().execute(&inputs).await.unwrap();
        assert!(result.resolution.index.is_empty());
        assert!(result.resolution.rows.is_empty());
        assert_eq!(result.stats.vulnerable_packages, 0);
    }

    #[tokio::test]
    async fn test_missing_report_is_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = HarvestInputs {
            report: dir.path().join("npm-audit.json"),
            tree: TreeSource::File(dir.path().join("tree.json")),
        };

        let err = HarvestPipeline::new().execute(&inputs).await.unwrap_err();
        assert!(err.is_missing_report());
    }
}
