// src/lib.rs

//! virt-prep: Fedora disk image preparation
//!
//! Takes the published cloud image of a Fedora release and a set of koji
//! tasks, and produces an image with the tasks' packages installed, ready to
//! boot and run tests.
//!
//! # Architecture
//!
//! - Acquisition: task rpms become local createrepo repositories; the base
//!   image is downloaded once and checked with `qemu-img`
//! - Session: one libguestfs appliance per run owns every guest command
//! - Staging: repositories are copied into the image along with dnf repo files
//! - Installation: a conflict-free subset of the task packages is installed
//! - Finishing: optional upgrade, then an SELinux relabel

pub mod config;
pub mod context;
mod error;
pub mod finisher;
pub mod guest;
pub mod image;
pub mod installer;
pub mod koji;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod release;
pub mod retry;
pub mod stager;

pub use config::PipelineConfig;
pub use context::RunContext;
pub use error::{Error, Result};
pub use guest::{GuestExecutor, ImageSession, ScriptedGuest};
pub use image::{BaseImage, ImageAcquirer};
pub use installer::{ConflictSet, InstallPlan, PackageCandidate};
pub use koji::{KojiClient, TaskRepository};
pub use pipeline::{Pipeline, PipelineOptions, ResultRecord};
pub use release::{RawhideLookup, Release};
pub use retry::RetryPolicy;
pub use stager::{RepoDefinition, Stager};
