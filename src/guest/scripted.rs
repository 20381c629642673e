// src/guest/scripted.rs

//! In-memory guest used by tests
//!
//! Shell commands are answered by the first rule whose pattern is a
//! substring of the command; unmatched commands succeed with empty output.
//! Clones share the same journal, so a test can keep a handle while the
//! pipeline owns the session.

use super::GuestExecutor;
use crate::error::{Error, Result};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Clone)]
struct ShellRule {
    pattern: String,
    stdout: String,
    /// Fail this many matches before answering
    failures_left: u32,
    /// Always fail with this message
    error: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<ShellRule>,
    roots: Vec<String>,
    mountpoints: Vec<(String, String)>,
    failing_mounts: Vec<String>,
    failing_copies: Vec<String>,
    relabel_error: Option<String>,
    journal: Vec<String>,
    launched: bool,
    shut_down: bool,
}

/// Scripted [`GuestExecutor`] test double
#[derive(Debug, Clone)]
pub struct ScriptedGuest {
    state: Rc<RefCell<State>>,
}

impl Default for ScriptedGuest {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGuest {
    /// A guest with one OS whose root filesystem is `/dev/sda1`
    pub fn new() -> Self {
        let state = State {
            roots: vec!["/dev/sda1".to_string()],
            mountpoints: vec![("/".to_string(), "/dev/sda1".to_string())],
            ..Default::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Answer commands containing `pattern` with `stdout`
    pub fn on(self, pattern: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.push_rule(pattern.into(), stdout.into(), 0, None)
    }

    /// Fail commands containing `pattern`
    pub fn on_fail(self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.push_rule(pattern.into(), String::new(), 0, Some(message.into()))
    }

    /// Fail the first `failures` matches, then answer with `stdout`
    pub fn on_flaky(
        self,
        pattern: impl Into<String>,
        failures: u32,
        stdout: impl Into<String>,
    ) -> Self {
        self.push_rule(pattern.into(), stdout.into(), failures, None)
    }

    fn push_rule(
        self,
        pattern: String,
        stdout: String,
        failures_left: u32,
        error: Option<String>,
    ) -> Self {
        self.state.borrow_mut().rules.push(ShellRule {
            pattern,
            stdout,
            failures_left,
            error,
        });
        self
    }

    /// Report no operating systems during inspection
    pub fn without_os(self) -> Self {
        self.state.borrow_mut().roots.clear();
        self
    }

    /// Add a mount point to the first root
    pub fn with_mountpoint(self, mount_point: &str, device: &str) -> Self {
        self.state
            .borrow_mut()
            .mountpoints
            .push((mount_point.to_string(), device.to_string()));
        self
    }

    /// Make mounting `mount_point` fail
    pub fn fail_mount(self, mount_point: &str) -> Self {
        self.state.borrow_mut().failing_mounts.push(mount_point.to_string());
        self
    }

    /// Make copy-in fail for host paths containing `pattern`
    pub fn fail_copy(self, pattern: &str) -> Self {
        self.state.borrow_mut().failing_copies.push(pattern.to_string());
        self
    }

    /// Make relabeling fail
    pub fn fail_relabel(self, message: &str) -> Self {
        self.state.borrow_mut().relabel_error = Some(message.to_string());
        self
    }

    /// Every operation performed so far, in order
    pub fn journal(&self) -> Vec<String> {
        self.state.borrow().journal.clone()
    }

    /// Shell commands run so far
    pub fn shell_commands(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter_map(|entry| entry.strip_prefix("sh ").map(str::to_string))
            .collect()
    }

    /// Number of shell commands containing `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.shell_commands()
            .iter()
            .filter(|cmd| cmd.contains(pattern))
            .count()
    }

    pub fn was_launched(&self) -> bool {
        self.state.borrow().launched
    }

    pub fn was_shut_down(&self) -> bool {
        self.state.borrow().shut_down
    }

    fn record(&self, entry: String) {
        self.state.borrow_mut().journal.push(entry);
    }

    fn fail(command: String, message: &str) -> Error {
        Error::GuestCommandError {
            command,
            message: message.to_string(),
        }
    }
}

impl GuestExecutor for ScriptedGuest {
    fn launch(&mut self, memory_mb: u32) -> Result<()> {
        self.record(format!("launch {}", memory_mb));
        self.state.borrow_mut().launched = true;
        Ok(())
    }

    fn inspect_os(&mut self) -> Result<Vec<String>> {
        self.record("inspect-os".to_string());
        Ok(self.state.borrow().roots.clone())
    }

    fn mountpoints(&mut self, root: &str) -> Result<Vec<(String, String)>> {
        self.record(format!("inspect-get-mountpoints {}", root));
        Ok(self.state.borrow().mountpoints.clone())
    }

    fn mount(&mut self, device: &str, mount_point: &str) -> Result<()> {
        let entry = format!("mount {} {}", device, mount_point);
        self.record(entry.clone());
        if self.state.borrow().failing_mounts.iter().any(|m| m == mount_point) {
            return Err(Self::fail(entry, "mount failed"));
        }
        Ok(())
    }

    fn sh(&mut self, command: &str) -> Result<String> {
        self.record(format!("sh {}", command));

        let mut state = self.state.borrow_mut();
        let Some(rule) = state.rules.iter_mut().find(|r| command.contains(&r.pattern)) else {
            return Ok(String::new());
        };

        if let Some(ref message) = rule.error {
            return Err(Self::fail(command.to_string(), message));
        }
        if rule.failures_left > 0 {
            rule.failures_left -= 1;
            return Err(Self::fail(command.to_string(), "transient failure"));
        }
        Ok(rule.stdout.clone())
    }

    fn mkdir_p(&mut self, path: &str) -> Result<()> {
        self.record(format!("mkdir-p {}", path));
        Ok(())
    }

    fn copy_in(&mut self, local: &Path, remote_dir: &str) -> Result<()> {
        let entry = format!("copy-in {} {}", local.display(), remote_dir);
        self.record(entry.clone());
        let local = local.display().to_string();
        if self.state.borrow().failing_copies.iter().any(|p| local.contains(p)) {
            return Err(Self::fail(entry, "copy-in failed"));
        }
        Ok(())
    }

    fn selinux_relabel(&mut self, specfile: &str, path: &str) -> Result<()> {
        let entry = format!("selinux-relabel {} {}", specfile, path);
        self.record(entry.clone());
        match self.state.borrow().relabel_error {
            Some(ref message) => Err(Self::fail(entry, message)),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        self.record("shutdown".to_string());
        self.state.borrow_mut().shut_down = true;
        Ok(())
    }
}
