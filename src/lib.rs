//! cdk-works - VPC and Aurora MySQL stack synthesizer
//!
//! This library declares a single infrastructure stack (a VPC with public and
//! private subnets plus an Aurora MySQL cluster) as typed Rust constructs and
//! synthesizes it into an AWS CloudFormation template. Deploying the template
//! is left to an external engine (CloudFormation or the CDK CLI), which reads
//! the cloud assembly written by [`assembly::CloudAssembly`].
//!
//! # Core Concepts
//!
//! - **Constructs**: typed declarations ([`infra::network::Vpc`],
//!   [`infra::security::SecurityGroup`], [`infra::database::DatabaseCluster`])
//!   that render themselves into template resources
//! - **Stack**: [`stack::StackDefinition`] wires the constructs together and
//!   declares the six stack outputs
//! - **Synthesis**: deterministic rendering into a [`template::Template`];
//!   identical inputs produce byte-identical JSON
//!
//! # Example Usage
//!
//! ```no_run
//! use cdk_works::{Environment, StackConfig, StackDefinition, Validator};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = StackConfig::from_env()?;
//! let stack = StackDefinition::new(&config)?;
//! let template = stack.synthesize()?;
//!
//! Validator::new().validate(&template)?;
//!
//! let assembly = cdk_works::assembly::synthesize(&stack, &Environment::from_config(&config))?;
//! assembly.write_to(std::path::Path::new("cdk.out"))?;
//! # Ok(())
//! # }
//! ```

pub mod assembly;
pub mod cli;
pub mod config;
pub mod error;
pub mod infra;
pub mod outputs;
pub mod stack;
pub mod template;
pub mod util;
pub mod validation;

pub use assembly::{CloudAssembly, Environment};
pub use config::{ConfigError, StackConfig};
pub use error::SynthError;
pub use outputs::{DeployedOutputs, OutputName};
pub use stack::StackDefinition;
pub use template::Template;
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};
pub use validation::Validator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
