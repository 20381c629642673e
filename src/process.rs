// src/process.rs

//! Host-side subprocess execution
//!
//! Every host tool the pipeline shells out to (curl, qemu-img, koji,
//! createrepo) goes through [`CommandRunner`], so acquisition logic can be
//! exercised against a recording runner in tests.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Host tools the pipeline needs on PATH
pub const REQUIRED_TOOLS: &[&str] = &["curl", "qemu-img", "koji", "createrepo", "guestfish"];

/// A command to run on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl HostCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run inside `dir`
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Short description of a failure for error messages
    pub fn failure_reason(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        }
    }
}

/// Runs host commands
pub trait CommandRunner {
    /// Run `cmd` to completion, capturing its output
    ///
    /// A non-zero exit is NOT an error here; callers inspect
    /// [`CommandOutput::success`] and map failures to their own error kind.
    /// `Err` is reserved for commands that could not be spawned at all.
    fn run(&self, cmd: &HostCommand) -> Result<CommandOutput>;
}

/// Runs commands with `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &HostCommand) -> Result<CommandOutput> {
        debug!("Running {}", cmd);

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(ref cwd) = cmd.cwd {
            command.current_dir(cwd);
        }

        let output = command
            .output()
            .map_err(|e| Error::IoError(format!("Failed to execute {}: {}", cmd.program, e)))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Log whatever a command printed at debug level
pub fn log_output(output: &CommandOutput) {
    if !output.stderr.trim().is_empty() {
        debug!("{}", output.stderr.trim_end());
    }
    if !output.stdout.trim().is_empty() {
        debug!("{}", output.stdout.trim_end());
    }
}

/// Check that every tool in `tools` is on PATH
pub fn require_tools(tools: &[&str]) -> Result<()> {
    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|tool| which::which(tool).is_err())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::ToolNotFound(missing.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_command_display() {
        let cmd = HostCommand::new("qemu-img").args(["check", "/tmp/f.qcow2"]);
        assert_eq!(cmd.to_string(), "qemu-img check /tmp/f.qcow2");
        assert!(cmd.cwd.is_none());
    }

    #[test]
    fn test_failure_reason() {
        assert_eq!(CommandOutput::failed(2, "").failure_reason(), "exit status 2");
        assert_eq!(
            CommandOutput::failed(1, "no such task\n").failure_reason(),
            "exit status 1: no such task"
        );
        let killed = CommandOutput {
            code: None,
            ..Default::default()
        };
        assert_eq!(killed.failure_reason(), "terminated by signal");
        assert!(!killed.success());
    }

    #[test]
    fn test_system_runner_captures_output() {
        let temp = tempfile::tempdir().unwrap();
        let output = SystemRunner
            .run(&HostCommand::new("sh").args(["-c", "pwd; echo oops >&2; exit 3"]).current_dir(temp.path()))
            .unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stderr.trim(), "oops");
        assert!(output.stdout.trim().ends_with(
            temp.path().file_name().unwrap().to_str().unwrap()
        ));
    }

    #[test]
    fn test_system_runner_spawn_failure() {
        let result = SystemRunner.run(&HostCommand::new("definitely-not-a-real-tool-xyz"));
        assert!(matches!(result, Err(Error::IoError(_))));
    }

    #[test]
    fn test_require_tools_reports_missing() {
        let err = require_tools(&["sh", "definitely-not-a-real-tool-xyz"]).unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-real-tool-xyz"));
        assert!(require_tools(&["sh"]).is_ok());
    }
}
