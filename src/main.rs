// src/main.rs

use clap::Parser;
use std::process::ExitCode;

mod cli;
mod commands;

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match commands::cmd_customize(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
