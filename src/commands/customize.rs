// src/commands/customize.rs

//! Customize command - prepare a release image end to end

use crate::cli::Cli;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use virt_prep::context::{LOG_FILE_NAME, RESULT_FILE_NAME};
use virt_prep::guest::ImageSession;
use virt_prep::process::{require_tools, SystemRunner, REQUIRED_TOOLS};
use virt_prep::release::HttpRawhideLookup;
use virt_prep::{
    logging, Pipeline, PipelineConfig, PipelineOptions, Release, ResultRecord, RunContext,
};

/// Load the configuration file if given, then apply environment overrides
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Build pipeline options from the command line
fn pipeline_options(cli: &Cli) -> Result<PipelineOptions> {
    let release: Release = cli.release.parse()?;
    Ok(PipelineOptions {
        release,
        task_ids: cli.task_ids.clone(),
        additional_task_ids: cli.additional_task_ids.clone(),
        output: cli.output.clone(),
        install_rpms: cli.install_rpms,
        sys_update: !cli.no_sys_update,
    })
}

/// Write the failure record for an error hit before the pipeline started
fn record_setup_failure(artifacts: &Path, log_file: PathBuf, err: &anyhow::Error) -> Result<()> {
    ResultRecord::failure(format!("{:#}", err), log_file)
        .write(&artifacts.join(RESULT_FILE_NAME))?;
    Ok(())
}

/// Run the preparation; returns whether the image is ready
///
/// A result record is written to the artifacts directory even when setup
/// fails before the pipeline starts.
pub fn cmd_customize(cli: &Cli) -> Result<bool> {
    std::fs::create_dir_all(&cli.artifacts)
        .with_context(|| format!("Failed to create {}", cli.artifacts.display()))?;
    let artifacts = std::path::absolute(&cli.artifacts)?;
    let log_file = artifacts.join(LOG_FILE_NAME);

    if let Err(e) = logging::init(cli.verbose, Some(&log_file)) {
        eprintln!("Error: {}", e);
        record_setup_failure(&artifacts, log_file, &e.into())?;
        return Ok(false);
    }
    debug!("Artifacts directory is {}", artifacts.display());

    let setup = || -> Result<(RunContext, PipelineOptions, HttpRawhideLookup)> {
        let config = load_config(cli.config.as_deref())?;
        let options = pipeline_options(cli)?;
        require_tools(REQUIRED_TOOLS)?;
        let lookup = HttpRawhideLookup::new(&config)?;
        let ctx = RunContext::new(&artifacts, config)?;
        Ok((ctx, options, lookup))
    };

    let (ctx, options, lookup) = match setup() {
        Ok(setup) => setup,
        Err(e) => {
            error!("{:#}", e);
            record_setup_failure(&artifacts, log_file, &e)?;
            return Ok(false);
        }
    };

    info!("Preparing {} image", options.release);
    let runner = SystemRunner;
    let record = Pipeline::new(&ctx, &runner, &lookup)
        .run_and_record(&options, |image, memory_mb| ImageSession::launch(image, memory_mb));

    debug!("Result written to {}", ctx.result_file().display());
    Ok(record.is_success())
}
