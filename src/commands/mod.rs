// src/commands/mod.rs
//! Command handlers for the virt-prep CLI

mod customize;

pub use customize::cmd_customize;
