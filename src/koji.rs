// src/koji.rs

//! Koji task repositories
//!
//! Turns a koji task id into a local, createrepo-indexed directory of rpms.
//! Scratch builds are fetched with `koji download-task`; finished builds with
//! `koji download-build --debuginfo --task-id`. Both are restricted to the
//! x86_64, src and noarch architectures.
//!
//! A task directory that already exists is reused as is. If it exists but was
//! never indexed (a previous run died after the download), only the index is
//! rebuilt.

use crate::config::PipelineConfig;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::process::{log_output, CommandRunner, HostCommand};
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Architectures fetched for every task
pub const TASK_ARCHES: &[&str] = &["x86_64", "src", "noarch"];

/// Task metadata as returned by `getTaskInfo` with `request=True`
#[derive(Debug, Clone, Deserialize)]
pub struct TaskInfo {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub request: Vec<serde_json::Value>,
}

impl TaskInfo {
    /// Parse the JSON printed by `koji call --json-output getTaskInfo`
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::ParseError(format!("Invalid koji task info: {e}")))
    }

    /// Whether the task is a scratch build
    ///
    /// The build options are the third element of the request; a task is a
    /// scratch build only when they carry `"scratch": true`.
    pub fn is_scratch(&self) -> bool {
        self.request
            .get(2)
            .and_then(|opts| opts.get("scratch"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// A local rpm repository built from a koji task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRepository {
    pub task_id: u64,
    pub path: PathBuf,
    /// `None` when an existing directory was reused without asking koji
    pub scratch: Option<bool>,
}

impl TaskRepository {
    /// Repository id used both for the directory name and dnf repo name
    pub fn name(&self) -> String {
        self.task_id.to_string()
    }

    /// Names of the rpm files currently in the repository
    pub fn packages(&self) -> Result<Vec<String>> {
        let mut rpms = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.ends_with(".rpm") {
                rpms.push(name);
            }
        }
        rpms.sort();
        Ok(rpms)
    }
}

/// Whether createrepo has already indexed `dir`
fn is_indexed(dir: &Path) -> bool {
    dir.join("repodata").join("repomd.xml").is_file()
}

/// Talks to koji through its command line client
pub struct KojiClient<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a PipelineConfig,
}

impl<'a> KojiClient<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a PipelineConfig) -> Self {
        Self { runner, config }
    }

    fn koji(&self) -> HostCommand {
        HostCommand::new("koji").args(self.config.koji_args())
    }

    /// Fetch task metadata
    pub fn task_info(&self, task_id: u64) -> Result<TaskInfo> {
        let cmd = self
            .koji()
            .args(["--server", self.config.koji_hub.as_str()])
            .args(["call", "--json-output", "getTaskInfo"])
            .arg(task_id.to_string())
            .arg("request=True");

        let output = self.runner.run(&cmd)?;
        if !output.success() {
            return Err(Error::FetchError {
                task_id,
                reason: format!("getTaskInfo failed: {}", output.failure_reason()),
            });
        }
        TaskInfo::from_json(&output.stdout)
    }

    /// Command that downloads the rpms of a task into the current directory
    pub fn download_command(&self, task_id: u64, scratch: bool) -> HostCommand {
        let subcommand: &[&str] = if scratch {
            &["download-task"]
        } else {
            &["download-build", "--debuginfo"]
        };

        let mut cmd = self.koji().args(subcommand.iter().copied());
        for arch in TASK_ARCHES {
            cmd = cmd.arg(format!("--arch={}", arch));
        }
        if !scratch {
            cmd = cmd.arg("--task-id");
        }
        cmd.arg(task_id.to_string())
    }

    /// Download and index the rpms of `task_id` under the artifacts directory
    pub fn materialize(&self, ctx: &RunContext, task_id: u64) -> Result<TaskRepository> {
        let path = ctx.task_repo_dir(task_id);

        if path.is_dir() {
            info!(
                "{} already exists, assume rpms are already downloaded. Skipping...",
                path.display()
            );
            if !is_indexed(&path) {
                create_repo(self.runner, &path)?;
            }
            return Ok(TaskRepository {
                task_id,
                path,
                scratch: None,
            });
        }

        let scratch = self.task_info(task_id)?.is_scratch();
        std::fs::create_dir_all(&path).map_err(|e| Error::FetchError {
            task_id,
            reason: format!("Failed to create {}: {e}", path.display()),
        })?;

        let cmd = self.download_command(task_id, scratch).current_dir(&path);
        info!("Downloading rpms from {}", task_id);
        debug!("Running {}", cmd);

        let policy = RetryPolicy::new(self.config.retry_attempts, self.config.retry_delay());
        policy.run(
            &format!("Download of task {}", task_id),
            |e| matches!(e, Error::FetchError { .. }),
            |_| {
                let output = self.runner.run(&cmd)?;
                log_output(&output);
                if output.success() {
                    Ok(())
                } else {
                    Err(Error::FetchError {
                        task_id,
                        reason: output.failure_reason(),
                    })
                }
            },
        )?;

        create_repo(self.runner, &path)?;

        let repo = TaskRepository {
            task_id,
            path,
            scratch: Some(scratch),
        };
        info!("Downloaded {} rpms from {}", repo.packages()?.len(), task_id);
        Ok(repo)
    }
}

/// Run `createrepo .` inside `dir`
pub fn create_repo(runner: &dyn CommandRunner, dir: &Path) -> Result<()> {
    debug!("Creating repo for {}", dir.display());
    let output = runner.run(&HostCommand::new("createrepo").arg(".").current_dir(dir))?;
    log_output(&output);

    if output.success() {
        Ok(())
    } else {
        Err(Error::RepoIndexError {
            path: dir.to_path_buf(),
            reason: output.failure_reason(),
        })
    }
}
