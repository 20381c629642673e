// src/installer.rs

//! Conflict-aware installation of task packages
//!
//! Picks the packages from the staged task repositories that can be
//! installed together without a conflict, then installs them in a single dnf
//! transaction.
//!
//! # Algorithm
//!
//! ```text
//! 1. candidates   repoquery --all over the task repos
//!                 drop src arch, drop -debuginfo/-debugsource, dedupe, sort
//! 2. baseline     repoquery --conflict over every installed package
//!                 each capability -> task repo providers = forbidden set
//! 3. screening    for each candidate in order:
//!                   forbidden                         -> reject
//!                   a provider of its conflicts is
//!                   already accepted                  -> reject
//!                   it provides something an accepted
//!                   package conflicts with            -> reject
//!                   otherwise                         -> accept
//! 4. install      dnf install -y --best --allowerasing --nogpgcheck <accepted>
//! ```
//!
//! Screening is first-accepted-wins: a later candidate never evicts an
//! earlier one, so the result depends on the (sorted) processing order.

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::guest::{GuestExecutor, ImageSession};
use crate::koji::TaskRepository;
use crate::retry::RetryPolicy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Debug packages are never installed
static DEBUG_PACKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-debug(info|source)$").expect("static regex"));

/// Conflicts declared by every package installed in the image
const INSTALLED_CONFLICTS_CMD: &str = "dnf repoquery -q --conflict `rpm -qa --qf '%{NAME} '`";

/// Quote `s` for a POSIX shell
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Non-empty trimmed lines of command output
fn output_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// An `(arch, name)` pair offered by the task repositories
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PackageCandidate {
    pub arch: String,
    pub name: String,
}

impl PackageCandidate {
    /// Parse one `%{ARCH}:%{NAME}` line
    pub fn parse(line: &str) -> Option<Self> {
        let (arch, name) = line.trim().split_once(':')?;
        if name.is_empty() {
            return None;
        }
        Some(Self {
            arch: arch.to_string(),
            name: name.to_string(),
        })
    }

    /// Whether the candidate may be installed at all
    pub fn is_installable(&self) -> bool {
        self.arch != "src" && !DEBUG_PACKAGE_RE.is_match(&self.name)
    }
}

/// Turn raw repoquery output into the sorted, deduplicated candidate names
pub fn filter_candidates(raw: &str) -> Vec<String> {
    let names: BTreeSet<String> = output_lines(raw)
        .filter_map(PackageCandidate::parse)
        .filter(PackageCandidate::is_installable)
        .map(|candidate| candidate.name)
        .collect();
    names.into_iter().collect()
}

/// dnf options restricting a query to the staged task repositories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoScope {
    args: String,
}

impl RepoScope {
    /// Scope covering `repos`, staged under `guest_root`
    pub fn new(guest_root: &str, repos: &[TaskRepository]) -> Self {
        let guest_root = guest_root.trim_end_matches('/');
        let mut args = String::from("--disablerepo=*");
        for repo in repos {
            let name = repo.name();
            args.push_str(&format!(
                " --enablerepo={0} --repofrompath={0},{1}/{0}",
                name, guest_root
            ));
        }
        Self { args }
    }

    pub fn as_str(&self) -> &str {
        &self.args
    }
}

/// What a package conflicts with, resolved to concrete task repo packages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictSet {
    pub package: String,
    /// Capability -> names providing it in the task repositories
    pub capabilities: BTreeMap<String, BTreeSet<String>>,
}

impl ConflictSet {
    /// Every package providing any conflicting capability
    pub fn providers(&self) -> BTreeSet<&str> {
        self.capabilities
            .values()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// First capability provided by `name`, if any
    pub fn capability_provided_by(&self, name: &str) -> Option<&str> {
        self.capabilities
            .iter()
            .find(|(_, providers)| providers.contains(name))
            .map(|(cap, _)| cap.as_str())
    }
}

/// Why a candidate was left out of the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Provides a capability an installed package conflicts with
    ConflictsWithInstalled,
    /// Conflicts with `capability`, provided by the accepted `with`
    ConflictsWithAccepted { with: String, capability: String },
    /// The accepted `with` conflicts with `capability`, which this provides
    ConflictedByAccepted { with: String, capability: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConflictsWithInstalled => write!(f, "conflicts with an installed package"),
            Self::ConflictsWithAccepted { with, capability } => {
                write!(f, "conflicts with {} ({} to be installed)", capability, with)
            }
            Self::ConflictedByAccepted { with, capability } => {
                write!(f, "provides {} which {} (to be installed) conflicts with", capability, with)
            }
        }
    }
}

/// Ordered, duplicate-free list of packages to install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    packages: Vec<String>,
    rejected: Vec<(String, Rejection)>,
}

impl InstallPlan {
    /// Accepted packages in processing order
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Rejected packages with the reason
    pub fn rejected(&self) -> &[(String, Rejection)] {
        &self.rejected
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Space separated package list for dnf
    pub fn to_args(&self) -> String {
        self.packages.join(" ")
    }
}

/// Incremental first-accepted-wins screening
#[derive(Debug, Default)]
pub struct Screening {
    plan: InstallPlan,
    /// Conflict sets of accepted packages
    accepted: Vec<ConflictSet>,
}

impl Screening {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide on `conflicts.package` given the packages accepted so far
    pub fn consider(&mut self, conflicts: ConflictSet) -> std::result::Result<(), Rejection> {
        let name = conflicts.package.clone();

        if let Some(rejection) = self.check(&conflicts) {
            self.plan.rejected.push((name, rejection.clone()));
            return Err(rejection);
        }

        self.plan.packages.push(name);
        self.accepted.push(conflicts);
        Ok(())
    }

    /// Record a rejection decided outside the pairwise check
    pub fn reject(&mut self, name: &str, rejection: Rejection) {
        self.plan.rejected.push((name.to_string(), rejection));
    }

    fn check(&self, conflicts: &ConflictSet) -> Option<Rejection> {
        for (capability, providers) in &conflicts.capabilities {
            if let Some(with) = self.plan.packages.iter().find(|p| providers.contains(*p)) {
                return Some(Rejection::ConflictsWithAccepted {
                    with: with.clone(),
                    capability: capability.clone(),
                });
            }
        }

        self.accepted.iter().find_map(|accepted| {
            accepted
                .capability_provided_by(&conflicts.package)
                .map(|capability| Rejection::ConflictedByAccepted {
                    with: accepted.package.clone(),
                    capability: capability.to_string(),
                })
        })
    }

    pub fn finish(self) -> InstallPlan {
        self.plan
    }
}

/// Runs the conflict queries and the install inside a session
pub struct Installer<'s, E: GuestExecutor> {
    session: &'s mut ImageSession<E>,
    scope: RepoScope,
    retry: RetryPolicy,
}

impl<'s, E: GuestExecutor> Installer<'s, E> {
    pub fn new(
        session: &'s mut ImageSession<E>,
        task_repos: &[TaskRepository],
        config: &PipelineConfig,
    ) -> Self {
        Self {
            session,
            scope: RepoScope::new(&config.guest_repo_root, task_repos),
            retry: RetryPolicy::new(config.retry_attempts, config.retry_delay()),
        }
    }

    /// Installable package names from the task repositories, sorted
    pub fn enumerate_candidates(&mut self) -> Result<Vec<String>> {
        let cmd = format!(
            "dnf repoquery -q {} --all --qf=\"%{{ARCH}}:%{{NAME}}\"",
            self.scope.as_str()
        );
        debug!("Querying rpms provided by task repos");
        let raw = self.session.run(&cmd)?;

        let candidates = filter_candidates(&raw);
        if candidates.is_empty() {
            return Err(Error::NoCandidatesError);
        }
        Ok(candidates)
    }

    /// Capabilities that installed packages conflict with
    pub fn installed_conflict_capabilities(&mut self) -> Result<Vec<String>> {
        debug!("Getting conflict of already installed packages");
        let session = &mut *self.session;
        let raw = self
            .retry
            .run(
                "Conflict query of installed packages",
                Error::is_guest_command,
                |_| session.run(INSTALLED_CONFLICTS_CMD),
            )
            .map_err(|e| Error::QueryError(e.to_string()))?;

        Ok(output_lines(&raw).map(str::to_string).collect())
    }

    /// Task repository packages providing `capability`
    pub fn providers(&mut self, capability: &str) -> Result<BTreeSet<String>> {
        let cmd = format!(
            "dnf repoquery -q --qf \"%{{NAME}}\" {} --whatprovides {}",
            self.scope.as_str(),
            shell_quote(capability)
        );
        let raw = self.session.run(&cmd)?;
        Ok(output_lines(&raw).map(str::to_string).collect())
    }

    /// Task repository packages an installed package conflicts with
    pub fn forbidden_by_installed(&mut self) -> Result<BTreeSet<String>> {
        let mut forbidden = BTreeSet::new();
        for capability in self.installed_conflict_capabilities()? {
            let providers = self.providers(&capability).map_err(|e| {
                Error::QueryError(format!(
                    "Failed to get packages from task repos providing {}: {}",
                    capability, e
                ))
            })?;
            forbidden.extend(providers);
        }
        Ok(forbidden)
    }

    /// Conflicts of one candidate, resolved to task repository providers
    pub fn conflict_set(&mut self, package: &str) -> Result<ConflictSet> {
        debug!("Querying what conflicts with {} from task repos", package);
        let cmd = format!(
            "dnf repoquery -q {} --conflict {}",
            self.scope.as_str(),
            shell_quote(package)
        );
        let raw = self.session.run(&cmd)?;

        let mut conflicts = ConflictSet {
            package: package.to_string(),
            capabilities: BTreeMap::new(),
        };
        for capability in output_lines(&raw) {
            debug!("Checking if any package from task repos provides conflict {}", capability);
            let providers = self.providers(capability)?;
            conflicts.capabilities.insert(capability.to_string(), providers);
        }
        let providers = conflicts.providers();
        if !providers.is_empty() {
            debug!(
                "{} conflicts with task repo packages: {}",
                package,
                providers.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
        Ok(conflicts)
    }

    /// Compute the install plan
    pub fn plan(&mut self) -> Result<InstallPlan> {
        let candidates = self.enumerate_candidates()?;
        let forbidden = self.forbidden_by_installed()?;

        let mut screening = Screening::new();
        for candidate in &candidates {
            if forbidden.contains(candidate) {
                info!(
                    "will not install {} as it {}.",
                    candidate,
                    Rejection::ConflictsWithInstalled
                );
                screening.reject(candidate, Rejection::ConflictsWithInstalled);
                continue;
            }

            let conflicts = self.conflict_set(candidate)?;
            if let Err(rejection) = screening.consider(conflicts) {
                info!("will not install {} as it {}.", candidate, rejection);
            }
        }

        let plan = screening.finish();
        if plan.is_empty() {
            return Err(Error::EmptyPlanError);
        }
        Ok(plan)
    }

    /// Install every package of `plan` in one transaction
    ///
    /// The task repositories are enabled explicitly; the image's own
    /// repositories stay enabled so dependencies can still be resolved.
    pub fn install_plan(&mut self, plan: &InstallPlan) -> Result<()> {
        let packages = plan.to_args();
        let enable: Vec<String> = self
            .scope
            .as_str()
            .split_whitespace()
            .filter(|arg| !arg.starts_with("--disablerepo"))
            .map(str::to_string)
            .collect();
        let cmd = format!(
            "dnf install -y --best --allowerasing --nogpgcheck {} {}",
            enable.join(" "),
            packages
        );

        info!("Installing {}", packages);
        debug!("Installing rpms using {}", cmd);
        let output = self.session.run(&cmd).map_err(|e| Error::InstallError {
            packages: packages.clone(),
            message: e.to_string(),
        })?;
        debug!("{}", output);
        Ok(())
    }
}

/// Compute a conflict-free plan from `task_repos` and install it
pub fn install<E: GuestExecutor>(
    session: &mut ImageSession<E>,
    task_repos: &[TaskRepository],
    config: &PipelineConfig,
) -> Result<InstallPlan> {
    let names: Vec<String> = task_repos.iter().map(TaskRepository::name).collect();
    info!("Going to install rpms from {}", names.join(", "));

    let mut installer = Installer::new(session, task_repos, config);
    let plan = installer.plan()?;
    installer.install_plan(&plan)?;
    Ok(plan)
}
