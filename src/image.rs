// src/image.rs

//! Base image acquisition and verification
//!
//! Downloads the latest published qcow2 for a release into the artifacts
//! directory and checks it with `qemu-img check`. An image that is already
//! present is reused without touching the network.

use crate::config::PipelineConfig;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::process::{log_output, CommandRunner, HostCommand};
use crate::release::Release;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Cap on the total time curl spends retrying
const RETRY_MAX_TIME_SECS: u32 = 60;

/// A base disk image on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseImage {
    pub release: Release,
    pub path: PathBuf,
    /// Set once `qemu-img check` has passed
    pub verified: bool,
}

/// Downloads and verifies base images
pub struct ImageAcquirer<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a PipelineConfig,
}

impl<'a> ImageAcquirer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a PipelineConfig) -> Self {
        Self { runner, config }
    }

    /// Make sure the release image is present locally and structurally valid
    pub fn resolve_and_fetch(&self, ctx: &RunContext, release: Release) -> Result<BaseImage> {
        let path = self.fetch(ctx, release)?;
        self.verify(&path)?;

        Ok(BaseImage {
            release,
            path,
            verified: true,
        })
    }

    /// Download the image unless it already exists; returns its path
    pub fn fetch(&self, ctx: &RunContext, release: Release) -> Result<PathBuf> {
        let url = release.image_url(&self.config.image_base_url);
        let path = ctx.artifacts().join(release.image_file_name());

        if path.is_file() {
            info!("{} already exists, no need to download.", path.display());
            return Ok(path);
        }

        info!("Downloading {}", url);
        debug!("qcow2 will be saved to {}", path.display());

        let cmd = self.download_command(&url).current_dir(ctx.artifacts());
        let output = match self.runner.run(&cmd) {
            Ok(output) => output,
            Err(e) => {
                remove_partial(&path);
                return Err(Error::DownloadError(format!("{}: {}", url, e)));
            }
        };

        if !output.success() {
            log_output(&output);
            remove_partial(&path);
            return Err(Error::DownloadError(format!(
                "{}: {}",
                url,
                output.failure_reason()
            )));
        }
        log_output(&output);

        debug!("qcow2 is available on {}", path.display());
        Ok(path)
    }

    /// Resumable curl download into the working directory
    pub fn download_command(&self, url: &str) -> HostCommand {
        HostCommand::new("curl")
            .arg("--fail")
            .args(["--connect-timeout".to_string(), self.config.connect_timeout_secs.to_string()])
            .args(["--retry".to_string(), self.config.download_retries.to_string()])
            .args(["--retry-delay", "0"])
            .args(["--retry-max-time".to_string(), RETRY_MAX_TIME_SECS.to_string()])
            .args(["-C", "-", "-L", "-O"])
            .arg(url)
    }

    /// Run `qemu-img check` on the image
    pub fn verify(&self, image: &Path) -> Result<()> {
        if !image.is_file() {
            return Err(Error::CorruptImageError {
                path: image.to_path_buf(),
                reason: "file doesn't exist".to_string(),
            });
        }

        info!("Verifying {}", image.display());
        let output = self
            .runner
            .run(&HostCommand::new("qemu-img").arg("check").arg(image.display().to_string()))?;
        log_output(&output);

        if output.success() {
            Ok(())
        } else {
            error!("qemu-img check failed on {}", image.display());
            Err(Error::CorruptImageError {
                path: image.to_path_buf(),
                reason: output.failure_reason(),
            })
        }
    }
}

/// Remove a partially downloaded image so the next run doesn't reuse it
fn remove_partial(path: &Path) {
    if !path.is_file() {
        return;
    }
    debug!("removing partial qcow2 {}", path.display());
    if let Err(e) = std::fs::remove_file(path) {
        warn!(
            "Failed to remove partial qcow2 {}, it will be reused by the next run: {}",
            path.display(),
            e
        );
    }
}
