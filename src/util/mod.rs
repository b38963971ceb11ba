//! Utility modules for cdk-works
//!
//! Currently only structured logging setup lives here.

pub mod logging;

pub use logging::{init_default, init_from_env, init_logging, LoggingConfig};
