// src/cli/mod.rs
//! CLI definitions for virt-prep
//!
//! This module contains the command-line interface definition using clap.
//! The command implementation is in the `commands` module.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "virt-prep")]
#[command(author = "Fedora CI Contributors")]
#[command(version)]
#[command(about = "Prepare a qcow2 image for a Fedora release with task rpms installed", long_about = None)]
pub struct Cli {
    /// Fedora release, e.g. rawhide or f33
    #[arg(short, long)]
    pub release: String,

    /// Koji task whose rpms are staged and installed
    #[arg(short = 't', long = "task-id")]
    pub task_ids: Vec<u64>,

    /// Koji task staged as a repository only
    #[arg(long = "additional-task-id")]
    pub additional_task_ids: Vec<u64>,

    /// Directory for logs, images and repositories
    #[arg(short, long, default_value = "./")]
    pub artifacts: PathBuf,

    /// Write the customized image here instead of in place
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Install rpms from --task-id repositories
    #[arg(long)]
    pub install_rpms: bool,

    /// Skip the full system upgrade
    #[arg(long)]
    pub no_sys_update: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
