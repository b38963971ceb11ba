//! Command handlers
//!
//! Each handler returns the process exit code: 0 on success, 1 when the
//! command ran but failed (validation, I/O, incomplete outputs) and 2 when the
//! configuration itself is unusable.

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::assembly::{self, Environment};
use crate::cli::commands::{ConfigArgs, OutputsArgs, SynthArgs, ValidateArgs};
use crate::cli::output::{OutputFormat, OutputFormatter};
use crate::config::StackConfig;
use crate::outputs::DeployedOutputs;
use crate::stack::StackDefinition;
use crate::validation::Validator;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;

fn load_config() -> Result<StackConfig, i32> {
    let config = StackConfig::from_env().map_err(|e| {
        error!("{}", e);
        EXIT_CONFIG_ERROR
    })?;
    config.validate().map_err(|e| {
        error!("{}", e);
        EXIT_CONFIG_ERROR
    })?;
    debug!(config = ?config, "Loaded configuration");
    Ok(config)
}

fn report(result: Result<()>) -> i32 {
    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    }
}

pub fn handle_synth(args: &SynthArgs, quiet: bool) -> i32 {
    let config = match load_config() {
        Ok(config) => config,
        Err(code) => return code,
    };
    report(synth(&config, args, quiet))
}

fn synth(config: &StackConfig, args: &SynthArgs, quiet: bool) -> Result<()> {
    let stack = StackDefinition::new(config).context("Failed to declare stack")?;
    let environment = Environment::from_config(config);
    let assembly =
        assembly::synthesize(&stack, &environment).context("Failed to synthesize stack")?;

    if args.no_validate {
        warn!("Skipping template validation");
    } else {
        Validator::new()
            .validate(&assembly.template)
            .context("Synthesized template failed validation")?;
    }

    if args.stdout {
        let formatter = OutputFormatter::new(args.format.into());
        print!("{}", formatter.format_template(&assembly.template)?);
        return Ok(());
    }

    let summary = assembly.write_to(&args.output).with_context(|| {
        format!(
            "Failed to write cloud assembly to {}",
            args.output.display()
        )
    })?;
    if !quiet {
        println!(
            "{}",
            OutputFormatter::new(OutputFormat::Human).format_synth_summary(&summary)?
        );
    }
    Ok(())
}

pub fn handle_validate(args: &ValidateArgs) -> i32 {
    let config = match load_config() {
        Ok(config) => config,
        Err(code) => return code,
    };
    if config.db_ingress_is_open_world() {
        warn!(
            peer = %config.db_ingress_cidr,
            "Database ingress allows every IPv4 address"
        );
    }

    match validate(&config, args) {
        Ok(true) => {
            info!("Template is valid");
            EXIT_SUCCESS
        }
        Ok(false) => EXIT_FAILURE,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    }
}

/// Prints the per-rule report; `Ok(false)` when any rule failed
fn validate(config: &StackConfig, args: &ValidateArgs) -> Result<bool> {
    let template = StackDefinition::new(config)
        .context("Failed to declare stack")?
        .synthesize()
        .context("Failed to synthesize stack")?;
    let outcomes = Validator::new().report(&template);
    println!(
        "{}",
        OutputFormatter::new(args.format.into()).format_validation(&outcomes)?
    );
    Ok(outcomes.iter().all(|o| o.passed))
}

pub fn handle_outputs(args: &OutputsArgs) -> i32 {
    let stack_name = match &args.stack_name {
        Some(name) => name.clone(),
        None => match load_config() {
            Ok(config) => config.stack_name,
            Err(code) => return code,
        },
    };

    report(show_outputs(args, &stack_name))
}

fn show_outputs(args: &OutputsArgs, stack_name: &str) -> Result<()> {
    let outputs = DeployedOutputs::from_file(&args.file, stack_name)?;
    println!(
        "{}",
        OutputFormatter::new(args.format.into()).format_outputs(&outputs)?
    );
    outputs.ensure_complete()
}

pub fn handle_config(args: &ConfigArgs) -> i32 {
    let config = match StackConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    let code = report(
        OutputFormatter::new(args.format.into())
            .format_config(&config)
            .map(|rendered| println!("{}", rendered)),
    );

    // Shown even when invalid, so the offending value is visible
    if let Err(e) = config.validate() {
        error!("{}", e);
        return EXIT_CONFIG_ERROR;
    }
    code
}
