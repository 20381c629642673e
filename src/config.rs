// src/config.rs

//! Pipeline configuration
//!
//! All endpoints, guest sizing and retry tuning live here. Defaults match the
//! Fedora CI infrastructure; a TOML file can override any field.
//!
//! ```toml
//! koji_params = "--profile stg"
//! guest_memory_mb = 8192
//! retry_delay_secs = 5
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable carrying extra koji CLI arguments
pub const KOJI_PARAMS_ENV: &str = "KOJI_PARAMS";

/// Configuration shared by every pipeline component
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Base URL of the Jenkins jobs publishing Fedora qcow2 images
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// Koji hub used for task lookups
    #[serde(default = "default_koji_hub")]
    pub koji_hub: String,

    /// Extra arguments passed to every koji invocation
    #[serde(default)]
    pub koji_params: String,

    /// Base URL of koji's per-tag build repositories
    #[serde(default = "default_official_repo_base")]
    pub official_repo_base: String,

    /// fedora-release spec file used to discover the rawhide dist version
    #[serde(default = "default_rawhide_spec_url")]
    pub rawhide_spec_url: String,

    /// Directory inside the guest where task repositories are copied
    #[serde(default = "default_guest_repo_root")]
    pub guest_repo_root: String,

    /// Memory given to the libguestfs appliance
    #[serde(default = "default_guest_memory_mb")]
    pub guest_memory_mb: u32,

    /// Attempts for retried operations (task download, conflict query)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed pause between attempts
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// curl --retry count for the image download
    #[serde(default = "default_download_retries")]
    pub download_retries: u32,

    /// curl --connect-timeout for the image download
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_image_base_url() -> String {
    "https://jenkins-continuous-infra.apps.ci.centos.org/job".to_string()
}

fn default_koji_hub() -> String {
    "https://koji.fedoraproject.org/kojihub".to_string()
}

fn default_official_repo_base() -> String {
    "https://kojipkgs.fedoraproject.org/repos".to_string()
}

fn default_rawhide_spec_url() -> String {
    "https://src.fedoraproject.org/rpms/fedora-release/raw/master/f/fedora-release.spec"
        .to_string()
}

fn default_guest_repo_root() -> String {
    "/opt/task_repos".to_string()
}

fn default_guest_memory_mb() -> u32 {
    4096
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_download_retries() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_base_url: default_image_base_url(),
            koji_hub: default_koji_hub(),
            koji_params: String::new(),
            official_repo_base: default_official_repo_base(),
            rawhide_spec_url: default_rawhide_spec_url(),
            guest_repo_root: default_guest_repo_root(),
            guest_memory_mb: default_guest_memory_mb(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            download_retries: default_download_retries(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `KOJI_PARAMS` from the environment when it is set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(params) = std::env::var(KOJI_PARAMS_ENV) {
            self.koji_params = params;
        }
        self
    }

    /// Set extra koji arguments
    pub fn with_koji_params(mut self, params: impl Into<String>) -> Self {
        self.koji_params = params.into();
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, attempts: u32, delay_secs: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay_secs = delay_secs;
        self
    }

    /// Set the guest staging root
    pub fn with_guest_repo_root(mut self, root: impl Into<String>) -> Self {
        self.guest_repo_root = root.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.guest_memory_mb == 0 {
            return Err(Error::ConfigError(
                "guest_memory_mb must be greater than zero".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(Error::ConfigError(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if !self.guest_repo_root.starts_with('/') {
            return Err(Error::ConfigError(format!(
                "guest_repo_root must be absolute: {}",
                self.guest_repo_root
            )));
        }
        Ok(())
    }

    /// Delay between retried attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// koji_params split into individual arguments
    pub fn koji_args(&self) -> Vec<String> {
        self.koji_params
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}
