// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::Path;
use tempfile::TempDir;
use virt_prep::process::{CommandOutput, CommandRunner, HostCommand};
use virt_prep::{PipelineConfig, RawhideLookup, Result, RunContext, ScriptedGuest};

/// SELinux config as shipped in Fedora cloud images
pub const SELINUX_CONFIG: &str = "\
SELINUX=enforcing
SELINUXTYPE=targeted
";

/// Host runner that fakes curl, qemu-img, koji and createrepo
///
/// Downloads create files in the command's working directory so the
/// pipeline sees the same layout a real run leaves behind.
#[derive(Default)]
pub struct FakeHost {
    commands: RefCell<Vec<String>>,
    failing: Vec<String>,
    flaky: RefCell<Vec<(String, u32)>>,
    scratch: bool,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every koji task as a scratch build
    pub fn scratch(mut self) -> Self {
        self.scratch = true;
        self
    }

    /// Fail every command whose command line contains `pattern`
    pub fn fail(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_string());
        self
    }

    /// Fail the first `times` commands containing `pattern`
    pub fn flaky(self, pattern: &str, times: u32) -> Self {
        self.flaky.borrow_mut().push((pattern.to_string(), times));
        self
    }

    /// Every command line run so far
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    /// Number of commands containing `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.commands
            .borrow()
            .iter()
            .filter(|cmd| cmd.contains(pattern))
            .count()
    }

    fn should_fail(&self, line: &str) -> bool {
        if self.failing.iter().any(|p| line.contains(p.as_str())) {
            return true;
        }
        let mut flaky = self.flaky.borrow_mut();
        match flaky
            .iter_mut()
            .find(|(p, left)| *left > 0 && line.contains(p.as_str()))
        {
            Some((_, left)) => {
                *left -= 1;
                true
            }
            None => false,
        }
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, cmd: &HostCommand) -> Result<CommandOutput> {
        let line = cmd.to_string();
        self.commands.borrow_mut().push(line.clone());

        if self.should_fail(&line) {
            return Ok(CommandOutput::failed(1, format!("{} failed", cmd.program)));
        }

        let cwd = cmd.cwd.as_deref().unwrap_or(Path::new("."));
        match cmd.program.as_str() {
            "curl" => {
                let url = cmd.args.last().map(String::as_str).unwrap_or_default();
                let name = url.rsplit('/').next().unwrap_or("image.qcow2");
                std::fs::write(cwd.join(name), b"QFI\xfb")?;
            }
            "koji" if line.contains("getTaskInfo") => {
                return Ok(CommandOutput::ok(format!(
                    r#"{{"id": 1, "method": "build", "request": ["git+https://src.fedoraproject.org/rpms/foo", "rawhide", {{"scratch": {}}}]}}"#,
                    self.scratch
                )));
            }
            "koji" => {
                std::fs::write(cwd.join("foo-1.0-1.fc40.x86_64.rpm"), b"")?;
                std::fs::write(cwd.join("foo-1.0-1.fc40.src.rpm"), b"")?;
            }
            "createrepo" => {
                std::fs::create_dir_all(cwd.join("repodata"))?;
                std::fs::write(cwd.join("repodata").join("repomd.xml"), b"<repomd/>")?;
            }
            _ => {}
        }
        Ok(CommandOutput::ok(""))
    }
}

/// Rawhide lookup answering with a fixed version
pub struct StaticRawhide(pub &'static str);

impl RawhideLookup for StaticRawhide {
    fn dist_version(&self) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Configuration with retries that don't sleep
pub fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_koji_params("")
        .with_retry(5, 0)
}

/// A run context in a fresh temporary artifacts directory
///
/// Returns (TempDir, RunContext) - keep the TempDir alive to prevent cleanup.
pub fn test_context() -> (TempDir, RunContext) {
    let temp = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(temp.path().join("artifacts"), test_config()).unwrap();
    (temp, ctx)
}

/// A guest with a targeted SELinux policy and nothing installed that conflicts
pub fn fedora_guest() -> ScriptedGuest {
    ScriptedGuest::new().on("cat /etc/selinux/config", SELINUX_CONFIG)
}
