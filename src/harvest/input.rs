//! Reading the audit report and dependency tree documents.

use crate::harvest::traits::LoadError;
use serde_json::Value;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

/// Where the dependency tree comes from.
#[derive(Debug, Clone)]
pub enum TreeSource {
    /// A saved `npm ls --all --json` document
    File(PathBuf),

    /// Run `npm ls --all --json` in this project directory
    NpmLs { project_dir: PathBuf },
}

/// Reads and parses a JSON document.
pub async fn read_json(path: &Path) -> Result<Value, LoadError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LoadError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes).map_err(|source| LoadError::JsonParsing {
        path: path.to_path_buf(),
        source,
    })
}

/// Runs `npm ls --all --json` and parses its stdout.
///
/// npm exits non-zero for unmet peer dependencies and similar warnings while
/// still printing the full tree, so the exit status is only logged.
pub async fn run_npm_ls(project_dir: &Path) -> Result<Value, LoadError> {
    npm_ls_with(OsStr::new("npm"), project_dir).await
}

async fn npm_ls_with(program: &OsStr, project_dir: &Path) -> Result<Value, LoadError> {
    info!(dir = %project_dir.display(), "Running npm ls --all --json");

    let output = Command::new(program)
        .args(["ls", "--all", "--json"])
        .current_dir(project_dir)
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| LoadError::NpmLs(format!("failed to spawn npm: {}", e)))?;

    if !output.status.success() {
        warn!(status = %output.status, "npm ls exited unsuccessfully, using its output anyway");
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| LoadError::NpmLs(format!("output is not a JSON tree: {}", e)))
}

impl TreeSource {
    pub async fn load(&self) -> Result<Value, LoadError> {
        match self {
            Self::File(path) => read_json(path).await,
            Self::NpmLs { project_dir } => run_npm_ls(project_dir).await,
        }
    }
}
