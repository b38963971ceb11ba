use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::assembly::DEFAULT_OUTPUT_DIR;

/// Synthesizes the VPC + Aurora MySQL stack into a CloudFormation cloud assembly
#[derive(Parser, Debug)]
#[command(
    name = "cdk-works",
    about = "Synthesizes the VPC + Aurora MySQL stack into a CloudFormation cloud assembly",
    version,
    author,
    long_about = "cdk-works declares a VPC with public and private subnets plus an Aurora \
                  MySQL cluster and renders them as a CloudFormation template. Deployment \
                  is left to an external engine that reads the cloud assembly. Stack \
                  settings come from CDK_WORKS_* and CDK_DEFAULT_* environment variables."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Synthesize the stack into a cloud assembly",
        long_about = "Builds the stack from the environment, validates the template and \
                      writes the template plus manifest.json into the output directory.\n\n\
                      Examples:\n  \
                      cdk-works synth\n  \
                      cdk-works synth --output build/cdk.out\n  \
                      cdk-works synth --stdout --format yaml"
    )]
    Synth(SynthArgs),

    #[command(
        about = "Validate the synthesized template",
        long_about = "Synthesizes the stack in memory and runs every validation rule, \
                      reporting the outcome of each.\n\n\
                      Examples:\n  \
                      cdk-works validate\n  \
                      cdk-works validate --format json"
    )]
    Validate(ValidateArgs),

    #[command(
        about = "Check and display a deployed stack's outputs",
        long_about = "Reads the outputs file written by the deploying engine and checks that \
                      all six stack outputs are present and non-empty.\n\n\
                      Examples:\n  \
                      cdk-works outputs outputs.json\n  \
                      cdk-works outputs outputs.json --stack-name Staging --format json"
    )]
    Outputs(OutputsArgs),

    #[command(about = "Show the resolved stack configuration")]
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct SynthArgs {
    #[arg(
        short = 'o',
        long,
        value_name = "DIR",
        default_value = DEFAULT_OUTPUT_DIR,
        help = "Cloud assembly output directory"
    )]
    pub output: PathBuf,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "json",
        help = "Template format when printing with --stdout"
    )]
    pub format: TemplateFormatArg,

    #[arg(long, help = "Print the template to stdout instead of writing the assembly")]
    pub stdout: bool,

    #[arg(long, help = "Skip template validation")]
    pub no_validate: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct OutputsArgs {
    #[arg(value_name = "FILE", help = "Outputs file written by the deploying engine")]
    pub file: PathBuf,

    #[arg(
        short = 's',
        long,
        value_name = "NAME",
        help = "Stack to read (defaults to the configured stack name)"
    )]
    pub stack_name: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormatArg {
    Json,
    Yaml,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

impl From<TemplateFormatArg> for super::output::OutputFormat {
    fn from(arg: TemplateFormatArg) -> Self {
        match arg {
            TemplateFormatArg::Json => super::output::OutputFormat::Json,
            TemplateFormatArg::Yaml => super::output::OutputFormat::Yaml,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_synth_args() {
        let args = CliArgs::parse_from(["cdk-works", "synth"]);
        match args.command {
            Commands::Synth(synth) => {
                assert_eq!(synth.output, PathBuf::from("cdk.out"));
                assert_eq!(synth.format, TemplateFormatArg::Json);
                assert!(!synth.stdout);
                assert!(!synth.no_validate);
            }
            _ => panic!("Expected Synth command"),
        }
    }

    #[test]
    fn test_synth_stdout_yaml() {
        let args = CliArgs::parse_from(["cdk-works", "synth", "--stdout", "-f", "yaml"]);
        match args.command {
            Commands::Synth(synth) => {
                assert!(synth.stdout);
                assert_eq!(synth.format, TemplateFormatArg::Yaml);
            }
            _ => panic!("Expected Synth command"),
        }
    }

    #[test]
    fn test_outputs_requires_file() {
        assert!(CliArgs::try_parse_from(["cdk-works", "outputs"]).is_err());

        let args = CliArgs::parse_from([
            "cdk-works",
            "outputs",
            "out.json",
            "--stack-name",
            "Staging",
        ]);
        match args.command {
            Commands::Outputs(outputs) => {
                assert_eq!(outputs.file, PathBuf::from("out.json"));
                assert_eq!(outputs.stack_name.as_deref(), Some("Staging"));
                assert_eq!(outputs.format, OutputFormatArg::Human);
            }
            _ => panic!("Expected Outputs command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["cdk-works", "validate", "--verbose"]);
        assert!(args.verbose);
        assert!(!args.quiet);

        let args = CliArgs::parse_from(["cdk-works", "--log-level", "trace", "config"]);
        assert_eq!(args.log_level.as_deref(), Some("trace"));

        assert!(CliArgs::try_parse_from(["cdk-works", "config", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(CliArgs::try_parse_from(["cdk-works", "synth", "--format", "human"]).is_err());
        assert!(CliArgs::try_parse_from(["cdk-works", "validate", "--format", "xml"]).is_err());
    }
}
