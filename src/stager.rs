// src/stager.rs

//! Repository staging
//!
//! Makes packages reachable from inside the guest: a "latest koji builds"
//! repository for the release, plus one local repository per task copied
//! under the guest staging root. Every repo file is written to the artifacts
//! directory first and then copied into `/etc/yum.repos.d`.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::guest::{GuestExecutor, ImageSession};
use crate::koji::TaskRepository;
use crate::release::{RawhideLookup, Release};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Guest directory holding dnf repo definitions
pub const GUEST_REPOS_DIR: &str = "/etc/yum.repos.d";

/// A dnf repository definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDefinition {
    /// Section id, also used as the display name
    pub id: String,
    pub base_url: String,
    pub priority: Option<i32>,
    pub enabled: bool,
    pub gpgcheck: bool,
}

impl RepoDefinition {
    /// Repository tracking the latest koji builds of a dist tag
    pub fn latest_builds(repo_base: &str, dist_tag: &str) -> Self {
        Self {
            id: format!("koji-{}-build", dist_tag),
            base_url: format!(
                "{}/{}-build/latest/x86_64/",
                repo_base.trim_end_matches('/'),
                dist_tag
            ),
            priority: None,
            enabled: true,
            gpgcheck: false,
        }
    }

    /// Local repository staged in the guest at `<guest_root>/<name>`
    pub fn task(guest_root: &str, name: &str) -> Self {
        Self {
            id: format!("test-{}", name),
            base_url: format!("file://{}/{}", guest_root.trim_end_matches('/'), name),
            priority: Some(0),
            enabled: true,
            gpgcheck: false,
        }
    }

    /// File name of the `.repo` file
    pub fn file_name(&self) -> String {
        format!("{}.repo", self.id)
    }

    /// Write the definition into `dir`, returning the file path
    pub fn write_to(&self, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let path = dir.join(file_name);
        std::fs::write(&path, self.to_string())
            .map_err(|e| Error::IoError(format!("Failed to write {}: {e}", path.display())))?;
        Ok(path)
    }
}

impl fmt::Display for RepoDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.id)?;
        writeln!(f, "name={}", self.id)?;
        writeln!(f, "baseurl={}", self.base_url)?;
        if let Some(priority) = self.priority {
            writeln!(f, "priority={}", priority)?;
        }
        writeln!(f, "enabled={}", u8::from(self.enabled))?;
        writeln!(f, "gpgcheck={}", u8::from(self.gpgcheck))
    }
}

/// Adjust the image's stock repositories for the release
///
/// Rawhide images get GPG checking disabled everywhere; stable releases get
/// updates-testing enabled so the newest candidates are visible.
pub fn prepare_release_repos<E: GuestExecutor>(
    session: &mut ImageSession<E>,
    release: Release,
) -> Result<()> {
    let cmd = if release.is_rawhide() {
        "sed -i s/gpgcheck=.*/gpgcheck=0/ /etc/yum.repos.d/*.repo"
    } else {
        "dnf config-manager --set-enable updates-testing updates-testing-debuginfo"
    };
    session
        .run(cmd)
        .map(drop)
        .inspect_err(|e| error!("{}", e))
}

/// Stages the latest-builds repository and the task repositories
pub struct Stager<'a> {
    ctx: &'a RunContext,
    lookup: &'a dyn RawhideLookup,
}

impl<'a> Stager<'a> {
    pub fn new(ctx: &'a RunContext, lookup: &'a dyn RawhideLookup) -> Self {
        Self { ctx, lookup }
    }

    /// Stage everything; returns the definitions written into the guest
    pub fn stage<E: GuestExecutor>(
        &self,
        session: &mut ImageSession<E>,
        task_repos: &[TaskRepository],
        release: Release,
    ) -> Result<Vec<RepoDefinition>> {
        let mut definitions = vec![self.add_latest_repo(session, release)?];
        definitions.extend(self.copy_task_repos(session, task_repos)?);
        Ok(definitions)
    }

    /// Enable the repository with the latest koji builds for the release
    pub fn add_latest_repo<E: GuestExecutor>(
        &self,
        session: &mut ImageSession<E>,
        release: Release,
    ) -> Result<RepoDefinition> {
        let dist_tag = release.dist_tag(self.lookup)?;
        let definition =
            RepoDefinition::latest_builds(&self.ctx.config().official_repo_base, &dist_tag);

        let repo_file = definition.write_to(self.ctx.artifacts(), "koji-latest.repo")?;
        session.copy_in(&repo_file, GUEST_REPOS_DIR)?;

        debug!("file {} copied to {}", repo_file.display(), GUEST_REPOS_DIR);
        Ok(definition)
    }

    /// Copy task repositories into the guest, with a repo file for each
    pub fn copy_task_repos<E: GuestExecutor>(
        &self,
        session: &mut ImageSession<E>,
        task_repos: &[TaskRepository],
    ) -> Result<Vec<RepoDefinition>> {
        if task_repos.is_empty() {
            debug!("no task repos provided, skipping...");
            return Ok(Vec::new());
        }

        let guest_root = self.ctx.config().guest_repo_root.as_str();
        session.mkdir_p(guest_root)?;
        info!("Copying task repos to qcow2");

        let mut definitions = Vec::with_capacity(task_repos.len());
        for repo in task_repos {
            session.copy_in(&repo.path, guest_root)?;
            debug!("repo {} copied to {}", repo.name(), guest_root);

            let definition = RepoDefinition::task(guest_root, &repo.name());
            let repo_file = definition.write_to(self.ctx.artifacts(), &definition.file_name())?;
            session.copy_in(&repo_file, GUEST_REPOS_DIR)?;
            debug!("file {} copied to {}", repo_file.display(), GUEST_REPOS_DIR);

            definitions.push(definition);
        }
        Ok(definitions)
    }
}
