use cdk_works::cli::commands::{CliArgs, Commands};
use cdk_works::cli::handlers::{handle_config, handle_outputs, handle_synth, handle_validate};
use cdk_works::util::logging::{init_logging, parse_level, LoggingConfig};
use cdk_works::VERSION;

use clap::Parser;
use tracing::{debug, Level};

fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("cdk-works v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Synth(synth_args) => handle_synth(synth_args, args.quiet),
        Commands::Validate(validate_args) => handle_validate(validate_args),
        Commands::Outputs(outputs_args) => handle_outputs(outputs_args),
        Commands::Config(config_args) => handle_config(config_args),
    };

    std::process::exit(exit_code);
}

/// Command-line flags take precedence over `CDK_WORKS_LOG_LEVEL`
fn init_logging_from_args(args: &CliArgs) {
    let mut config = LoggingConfig::from_env();
    if let Some(level_str) = &args.log_level {
        config.level = parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    init_logging(config);
}
