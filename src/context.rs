// src/context.rs

//! Per-run context
//!
//! Created once when the pipeline starts and handed by reference to every
//! component. Holds the artifacts directory layout and the configuration.

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// File name of the result record inside the artifacts directory
pub const RESULT_FILE_NAME: &str = "virt-customize.json";

/// File name of the run log inside the artifacts directory
pub const LOG_FILE_NAME: &str = "virt-customize.log";

/// Paths and configuration for a single pipeline run
#[derive(Debug, Clone)]
pub struct RunContext {
    artifacts: PathBuf,
    config: PipelineConfig,
}

impl RunContext {
    /// Create a context rooted at `artifacts`, creating the directory if needed
    ///
    /// The path is made absolute so it stays valid for subprocesses that run
    /// with a different working directory.
    pub fn new(artifacts: impl AsRef<Path>, config: PipelineConfig) -> Result<Self> {
        let artifacts = artifacts.as_ref();
        std::fs::create_dir_all(artifacts).map_err(|e| {
            Error::IoError(format!(
                "Failed to create artifacts directory {}: {e}",
                artifacts.display()
            ))
        })?;
        let artifacts = std::path::absolute(artifacts)?;

        Ok(Self { artifacts, config })
    }

    /// Artifacts directory
    pub fn artifacts(&self) -> &Path {
        &self.artifacts
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Where the JSON result record is written
    pub fn result_file(&self) -> PathBuf {
        self.artifacts.join(RESULT_FILE_NAME)
    }

    /// Where the run log is written
    pub fn log_file(&self) -> PathBuf {
        self.artifacts.join(LOG_FILE_NAME)
    }

    /// Parent directory of all materialized task repositories
    pub fn task_repos_dir(&self) -> PathBuf {
        self.artifacts.join("task_repos")
    }

    /// Local directory for one task repository
    pub fn task_repo_dir(&self, task_id: u64) -> PathBuf {
        self.task_repos_dir().join(task_id.to_string())
    }
}
