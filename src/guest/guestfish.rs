// src/guest/guestfish.rs

//! libguestfs backend
//!
//! Starts `guestfish --listen` on the image and sends each operation as a
//! separate `guestfish --remote=<pid>` invocation, so a single appliance
//! serves the whole run.

use super::GuestExecutor;
use crate::error::{Error, Result};
use crate::process::{CommandRunner, HostCommand, SystemRunner};
use std::path::Path;
use tracing::debug;

/// Extract the listener pid from `GUESTFISH_PID=1234; export GUESTFISH_PID`
pub fn parse_listen_pid(output: &str) -> Option<u32> {
    output
        .split(|c: char| c == ';' || c.is_whitespace())
        .find_map(|word| word.strip_prefix("GUESTFISH_PID="))
        .and_then(|pid| pid.parse().ok())
}

/// Parse `inspect-get-mountpoints` output (`/boot: /dev/sda1` per line)
pub fn parse_mountpoints(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| line.split_once(": "))
        .map(|(mount_point, device)| (mount_point.trim().to_string(), device.trim().to_string()))
        .filter(|(mount_point, device)| !mount_point.is_empty() && !device.is_empty())
        .collect()
}

/// A running guestfish listener attached to one image
pub struct Guestfish<R: CommandRunner = SystemRunner> {
    runner: R,
    pid: u32,
    running: bool,
}

impl Guestfish<SystemRunner> {
    /// Attach `image` read-write and start a listener
    pub fn start(image: &Path) -> Result<Self> {
        Self::start_with(SystemRunner, image)
    }
}

impl<R: CommandRunner> Guestfish<R> {
    pub fn start_with(runner: R, image: &Path) -> Result<Self> {
        let cmd = HostCommand::new("guestfish")
            .args(["--listen", "--rw", "--format=qcow2", "-a"])
            .arg(image.display().to_string());

        let output = runner.run(&cmd)?;
        if !output.success() {
            return Err(Error::GuestCommandError {
                command: cmd.to_string(),
                message: output.failure_reason(),
            });
        }

        let pid = parse_listen_pid(&output.stdout).ok_or_else(|| {
            Error::ParseError(format!(
                "guestfish --listen printed no GUESTFISH_PID: {}",
                output.stdout.trim()
            ))
        })?;
        debug!("guestfish listening as pid {}", pid);

        Ok(Self {
            runner,
            pid,
            running: true,
        })
    }

    /// Listener pid
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Send one command to the listener and return its stdout
    fn remote<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cmd = HostCommand::new("guestfish")
            .arg(format!("--remote={}", self.pid))
            .arg("--")
            .args(args);

        let output = self.runner.run(&cmd)?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(Error::GuestCommandError {
                command: cmd.args[2..].join(" "),
                message: output.failure_reason(),
            })
        }
    }
}

impl<R: CommandRunner> GuestExecutor for Guestfish<R> {
    fn launch(&mut self, memory_mb: u32) -> Result<()> {
        self.remote(["set-memsize".to_string(), memory_mb.to_string()])?;
        self.remote(["set-network", "true"])?;
        self.remote(["launch"])?;
        Ok(())
    }

    fn inspect_os(&mut self) -> Result<Vec<String>> {
        Ok(self
            .remote(["inspect-os"])?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn mountpoints(&mut self, root: &str) -> Result<Vec<(String, String)>> {
        Ok(parse_mountpoints(&self.remote(["inspect-get-mountpoints", root])?))
    }

    fn mount(&mut self, device: &str, mount_point: &str) -> Result<()> {
        self.remote(["mount", device, mount_point]).map(drop)
    }

    fn sh(&mut self, command: &str) -> Result<String> {
        self.remote(["sh", command])
    }

    fn mkdir_p(&mut self, path: &str) -> Result<()> {
        self.remote(["mkdir-p", path]).map(drop)
    }

    fn copy_in(&mut self, local: &Path, remote_dir: &str) -> Result<()> {
        self.remote(["copy-in".to_string(), local.display().to_string(), remote_dir.to_string()])
            .map(drop)
    }

    fn selinux_relabel(&mut self, specfile: &str, path: &str) -> Result<()> {
        self.remote(["selinux-relabel", specfile, path]).map(drop)
    }

    fn shutdown(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        // the listener must exit even if the appliance didn't stop cleanly,
        // or it keeps the image attached
        let shutdown = self.remote(["shutdown"]).map(drop);
        let exit = self.remote(["exit"]).map(drop);
        shutdown.and(exit)
    }
}
