// src/guest/mod.rs

//! Guest image access
//!
//! Everything that happens inside the disk image goes through a
//! [`GuestExecutor`]. The real backend drives libguestfs through a
//! `guestfish --listen` remote; [`ScriptedGuest`] answers from canned rules
//! so the installer and stager can be tested without an image.
//!
//! [`ImageSession`] owns one executor for the lifetime of a run and shuts it
//! down when dropped.

mod guestfish;
mod scripted;
mod session;

pub use guestfish::{parse_listen_pid, parse_mountpoints, Guestfish};
pub use scripted::ScriptedGuest;
pub use session::ImageSession;

use crate::error::Result;
use std::path::Path;

/// Low-level operations on a disk image
///
/// Errors are reported as [`crate::Error::GuestCommandError`]; callers that
/// need a more specific kind map them.
pub trait GuestExecutor {
    /// Start the appliance with `memory_mb` of RAM and networking enabled
    fn launch(&mut self, memory_mb: u32) -> Result<()>;

    /// Root devices of every operating system found in the image
    fn inspect_os(&mut self) -> Result<Vec<String>>;

    /// `(mount_point, device)` pairs for an operating system root
    fn mountpoints(&mut self, root: &str) -> Result<Vec<(String, String)>>;

    fn mount(&mut self, device: &str, mount_point: &str) -> Result<()>;

    /// Run a shell command in the guest and return its stdout
    fn sh(&mut self, command: &str) -> Result<String>;

    fn mkdir_p(&mut self, path: &str) -> Result<()>;

    /// Recursively copy a host file or directory into `remote_dir`
    fn copy_in(&mut self, local: &Path, remote_dir: &str) -> Result<()>;

    /// Relabel `path` using the given file_contexts database
    fn selinux_relabel(&mut self, specfile: &str, path: &str) -> Result<()>;

    /// Sync and stop the appliance
    fn shutdown(&mut self) -> Result<()>;
}
