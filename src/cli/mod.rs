pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, ConfigArgs, OutputsArgs, SynthArgs, ValidateArgs};
pub use output::{OutputFormat, OutputFormatter};
