//! Harvest module - vulnerability-to-dependency-tree resolution engine.
//!
//! This module provides the stages of the engine and the pipeline that runs them:
//! - **Normalize**: report schemas → [`VulnerabilityIndex`] via [`SchemaNormalizer`]
//! - **Walk**: dependency tree → discovery records via [`TreeWalker`]
//! - **Dedup**: one canonical row per `package@version` via [`Deduplicator`]
//! - **Reduce**: rows → top-level upgrade groups via [`UpgradeReducer`]
//! - **Pipeline**: async loader and enrichment coordinator via [`pipeline::HarvestPipeline`]

pub mod analysis;
pub mod dedup;
pub mod input;
pub mod normalize;
pub mod pipeline;
pub mod reduce;
pub mod traits;
pub mod walk;

// Re-export commonly used types
pub use analysis::{analyze, render_analysis, PackageAnalysis};
pub use dedup::Deduplicator;
pub use input::TreeSource;
pub use normalize::{severity_rank, MergePolicy, SchemaNormalizer, VulnerabilityIndex};
pub use reduce::UpgradeReducer;
pub use traits::{HarvestStage, LoadError};
pub use walk::TreeWalker;

pub use pipeline::{
    Enrichment, HarvestInputs, HarvestPipeline, HarvestResult, HarvestStats, PipelineError,
    Resolution,
};
