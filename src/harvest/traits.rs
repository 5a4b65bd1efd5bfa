//! Core traits and error types for the resolution pipeline.
//!
//! Every stage of the engine (normalize, walk, dedup, reduce) implements
//! [`HarvestStage`]. Stages are pure: they never fail on malformed input and
//! perform no I/O, so the trait has no error type. Failures exist only at the
//! input boundary, described by [`LoadError`].

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Pipeline Trait
// ============================================================================

/// Generic pipeline stage that transforms Input → Output.
///
/// The lifetime lets stages borrow their input (the parsed report, the tree)
/// instead of taking ownership of documents they only read.
///
/// # Determinism
///
/// Given identical input, `execute` must produce identical output. The
/// traversal order of the tree walker and the first-seen rules of the
/// deduplicator and reducer all depend on this.
///
/// # Examples
///
/// ```ignore
/// struct Counter;
///
/// impl<'a> HarvestStage<'a> for Counter {
///     type Input = &'a [DiscoveryRecord];
///     type Output = usize;
///
///     fn execute(&self, input: Self::Input) -> Self::Output {
///         input.len()
///     }
///
///     fn stage_name(&self) -> &'static str {
///         "counter"
///     }
/// }
/// ```
pub trait HarvestStage<'a>: Send + Sync {
    /// Input type consumed by this stage
    type Input: 'a;

    /// Output type produced by this stage
    type Output;

    /// Runs the stage. Malformed input degrades to an empty or partial
    /// result, never to a panic or error.
    fn execute(&self, input: Self::Input) -> Self::Output;

    /// Returns a human-readable name for this stage.
    ///
    /// Used for logging and timing statistics.
    fn stage_name(&self) -> &'static str;
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while reading the two input documents.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Input file does not exist
    #[error("Input not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Input file exists but could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input is not valid JSON
    #[error("Failed to parse {} as JSON: {source}", path.display())]
    JsonParsing {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// `npm ls` could not be run or printed no usable tree
    #[error("npm ls failed: {0}")]
    NpmLs(String),
}
