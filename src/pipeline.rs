// src/pipeline.rs

//! End-to-end image preparation
//!
//! ```text
//! task repos ──> base image ──> session ──> release repos ──> staging
//!                                                               │
//!                       Ready <── relabel <── upgrade <── install
//! ```
//!
//! Any error stops the run. Whatever happens, a [`ResultRecord`] is written
//! to the artifacts directory.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::finisher;
use crate::guest::{GuestExecutor, ImageSession};
use crate::image::ImageAcquirer;
use crate::installer;
use crate::koji::{KojiClient, TaskRepository};
use crate::process::CommandRunner;
use crate::release::{RawhideLookup, Release};
use crate::stager::{prepare_release_repos, Stager};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// What to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub release: Release,
    /// Tasks that are staged and, with `install_rpms`, installed
    pub task_ids: Vec<u64>,
    /// Tasks that are only staged
    pub additional_task_ids: Vec<u64>,
    /// Customize a copy at this path instead of the cached base image
    pub output: Option<PathBuf>,
    pub install_rpms: bool,
    pub sys_update: bool,
}

impl PipelineOptions {
    pub fn new(release: Release) -> Self {
        Self {
            release,
            task_ids: Vec::new(),
            additional_task_ids: Vec::new(),
            output: None,
            install_rpms: false,
            sys_update: true,
        }
    }

    /// Every task to materialize and stage, without duplicates
    pub fn staged_task_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = Vec::new();
        for id in self.task_ids.iter().chain(&self.additional_task_ids) {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

/// Outcome of a run, serialized to `virt-customize.json`
///
/// Fields are declared in alphabetical order so the JSON keys come out
/// sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub image: Option<PathBuf>,
    pub log: PathBuf,
    pub status: i32,
}

impl ResultRecord {
    pub fn success(image: PathBuf, log: PathBuf) -> Self {
        Self {
            error_reason: None,
            image: Some(image),
            log,
            status: 0,
        }
    }

    pub fn failure(reason: impl Into<String>, log: PathBuf) -> Self {
        Self {
            error_reason: Some(reason.into()),
            image: None,
            log,
            status: 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Pretty JSON with a four space indent
    pub fn to_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        String::from_utf8(buf).map_err(|e| Error::ParseError(e.to_string()))
    }

    /// Write the record to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?).map_err(|e| {
            Error::IoError(format!("Failed to write result file {}: {e}", path.display()))
        })
    }
}

/// Whether `a` and `b` resolve to the same existing file
///
/// Copying a file onto itself truncates it, so this has to hold before any
/// copy of the base image.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Runs the whole preparation for one image
pub struct Pipeline<'a> {
    ctx: &'a RunContext,
    runner: &'a dyn CommandRunner,
    lookup: &'a dyn RawhideLookup,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        ctx: &'a RunContext,
        runner: &'a dyn CommandRunner,
        lookup: &'a dyn RawhideLookup,
    ) -> Self {
        Self {
            ctx,
            runner,
            lookup,
        }
    }

    /// Materialize every requested task repository
    pub fn acquire_task_repos(&self, options: &PipelineOptions) -> Result<Vec<TaskRepository>> {
        let koji = KojiClient::new(self.runner, self.ctx.config());
        options
            .staged_task_ids()
            .into_iter()
            .map(|task_id| koji.materialize(self.ctx, task_id))
            .collect()
    }

    /// Fetch and verify the base image, copying it to the output path if set
    pub fn acquire_image(&self, options: &PipelineOptions) -> Result<PathBuf> {
        let acquirer = ImageAcquirer::new(self.runner, self.ctx.config());
        let base = acquirer.resolve_and_fetch(self.ctx, options.release)?;

        let Some(ref output) = options.output else {
            return Ok(base.path);
        };
        if is_same_file(&base.path, output) {
            info!("{} is the base image, customizing in place", output.display());
            return Ok(base.path);
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!("Copying {} to {}", base.path.display(), output.display());
        std::fs::copy(&base.path, output).map_err(|e| {
            Error::IoError(format!(
                "Failed to copy {} to {}: {e}",
                base.path.display(),
                output.display()
            ))
        })?;
        Ok(output.clone())
    }

    /// Run every stage; `launch` opens the session on the working image
    pub fn run<E, L>(&self, options: &PipelineOptions, launch: L) -> Result<PathBuf>
    where
        E: GuestExecutor,
        L: FnOnce(&Path, u32) -> Result<ImageSession<E>>,
    {
        let task_repos = self.acquire_task_repos(options)?;
        let image = self.acquire_image(options)?;

        let mut session = launch(&image, self.ctx.config().guest_memory_mb)?;
        session.mount_all()?;
        prepare_release_repos(&mut session, options.release)?;

        Stager::new(self.ctx, self.lookup).stage(&mut session, &task_repos, options.release)?;

        if options.install_rpms && !options.task_ids.is_empty() {
            let installable: Vec<TaskRepository> = task_repos
                .iter()
                .filter(|repo| options.task_ids.contains(&repo.task_id))
                .cloned()
                .collect();
            let plan = installer::install(&mut session, &installable, self.ctx.config())?;
            debug!("Installed {} packages", plan.packages().len());
        }

        finisher::finish(&mut session, options.sys_update)?;
        session.shutdown()?;

        info!("{} is Ready", image.display());
        Ok(image)
    }

    /// Run and always write the result record
    pub fn run_and_record<E, L>(&self, options: &PipelineOptions, launch: L) -> ResultRecord
    where
        E: GuestExecutor,
        L: FnOnce(&Path, u32) -> Result<ImageSession<E>>,
    {
        let log = self.ctx.log_file();
        let record = match self.run(options, launch) {
            Ok(image) => ResultRecord::success(image, log),
            Err(e) => {
                error!("{}", e);
                ResultRecord::failure(e.to_string(), log)
            }
        };

        if let Err(e) = record.write(&self.ctx.result_file()) {
            error!("{}", e);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_record_success_json() {
        let record = ResultRecord::success(
            PathBuf::from("/art/Fedora-Rawhide.qcow2"),
            PathBuf::from("/art/virt-customize.log"),
        );
        assert_eq!(
            record.to_json().unwrap(),
            "{\n    \"image\": \"/art/Fedora-Rawhide.qcow2\",\n    \"log\": \"/art/virt-customize.log\",\n    \"status\": 0\n}"
        );
    }

    #[test]
    fn test_result_record_failure_json() {
        let record = ResultRecord::failure("boom", PathBuf::from("/art/virt-customize.log"));
        assert!(!record.is_success());
        assert_eq!(
            record.to_json().unwrap(),
            "{\n    \"error_reason\": \"boom\",\n    \"image\": null,\n    \"log\": \"/art/virt-customize.log\",\n    \"status\": 1\n}"
        );
    }

    #[test]
    fn test_staged_task_ids() {
        let mut options = PipelineOptions::new(Release::Rawhide);
        options.task_ids = vec![3, 1];
        options.additional_task_ids = vec![1, 7];
        assert_eq!(options.staged_task_ids(), vec![3, 1, 7]);
    }
}
