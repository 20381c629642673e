// src/error.rs

//! Error types for the image customization pipeline
//!
//! Every failure the pipeline can hit maps to one variant here. Only the
//! download steps and the installed-package conflict query are retried;
//! everything else propagates straight to the pipeline boundary where it
//! becomes the failure result record.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing an image
#[derive(Error, Debug)]
pub enum Error {
    /// Release name is neither `rawhide` nor `f<N>`
    #[error("Unsupported release {0}")]
    UnsupportedReleaseError(String),

    /// Base image could not be downloaded
    #[error("Couldn't download qcow2: {0}")]
    DownloadError(String),

    /// `qemu-img check` rejected the image
    #[error("{} is corrupted: {reason}", path.display())]
    CorruptImageError { path: PathBuf, reason: String },

    /// Koji artifact download failed
    #[error("Couldn't download rpms of task {task_id}: {reason}")]
    FetchError { task_id: u64, reason: String },

    /// createrepo failed on a task directory
    #[error("Couldn't create repo at {}: {reason}", path.display())]
    RepoIndexError { path: PathBuf, reason: String },

    /// A guest filesystem could not be mounted
    #[error("Couldn't mount {device} to {mount_point}: {reason}")]
    MountError {
        device: String,
        mount_point: String,
        reason: String,
    },

    /// Inspection found no operating system in the image
    #[error("Couldn't find devices to mount")]
    NoOSFoundError,

    /// A command inside the guest failed
    #[error("Guest command `{command}` failed: {message}")]
    GuestCommandError { command: String, message: String },

    /// Copying a file or directory into the guest failed
    #[error("Couldn't copy {source_path} to {destination}: {message}")]
    StageCopyError {
        source_path: String,
        destination: String,
        message: String,
    },

    /// The rawhide dist version could not be discovered
    #[error("Couldn't discover the Fedora dist number of rawhide: {0}")]
    UnresolvedRawhideError(String),

    /// The staged repositories offer nothing installable
    #[error("Couldn't find any package to install")]
    NoCandidatesError,

    /// Conflict query against installed packages kept failing
    #[error("Could not query conflict of installed packages: {0}")]
    QueryError(String),

    /// Every candidate was rejected during conflict screening
    #[error("There is no suitable rpm to be installed")]
    EmptyPlanError,

    /// The dnf install transaction failed
    #[error("Couldn't install {packages}: {message}")]
    InstallError { packages: String, message: String },

    /// The system upgrade transaction failed
    #[error("Couldn't upgrade system: {0}")]
    UpgradeError(String),

    /// SELINUXTYPE missing from the guest's selinux config
    #[error("Could not parse SElinux policy type: {0}")]
    PolicyTypeError(String),

    /// Relabeling the guest filesystem failed
    #[error("Couldn't relabel selinux contexts: {0}")]
    RelabelError(String),

    /// Required host tool is missing from PATH
    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed output from an external tool
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Host filesystem or process error
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

impl Error {
    /// Whether this error came from a guest command failing at runtime
    ///
    /// Used by the retry combinator for the installed-package conflict query.
    pub fn is_guest_command(&self) -> bool {
        matches!(self, Error::GuestCommandError { .. })
    }
}
