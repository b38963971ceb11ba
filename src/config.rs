//! Configuration management for cdk-works
//!
//! Every policy choice baked into the stack (network layout, database ingress,
//! engine profile, backup and deletion settings) is a named configuration
//! value with the stack's historical default. Values are loaded from
//! environment variables; anything unset falls back to the default.
//!
//! # Environment Variables
//!
//! ## Deployment target
//! - `CDK_DEFAULT_ACCOUNT`: target AWS account id (12 digits) - optional
//! - `CDK_DEFAULT_REGION`: target AWS region (e.g. `ap-northeast-1`) - optional
//!
//! When either is missing the assembly is environment-agnostic and the
//! deploying engine resolves it from its own configuration.
//!
//! ## Stack settings
//! - `CDK_WORKS_STACK_NAME`: stack name - default: "CdkWorksStack"
//! - `CDK_WORKS_VPC_CIDR`: VPC CIDR block - default: "10.128.0.0/16"
//! - `CDK_WORKS_MAX_AZS`: availability zones to spread subnets over - default: "3"
//! - `CDK_WORKS_NAT_GATEWAYS`: NAT gateways - default: "0"
//! - `CDK_WORKS_SUBNET_MASK`: prefix length of every subnet - default: "24"
//! - `CDK_WORKS_DB_INGRESS_CIDR`: peer allowed to reach the database port -
//!   default: "0.0.0.0/0" (open to the internet)
//! - `CDK_WORKS_DB_PORT`: database port - default: "3306"
//! - `CDK_WORKS_ENGINE_PROFILE`: `mysql-v2` | `mysql-v3` - default: "mysql-v2"
//! - `CDK_WORKS_DB_INSTANCE_TYPE`: instance type - default: "db.t3.medium"
//! - `CDK_WORKS_DB_INSTANCES`: cluster instances - default: "1"
//! - `CDK_WORKS_BACKUP_RETENTION_DAYS`: backup retention - default: "7"
//! - `CDK_WORKS_DELETION_PROTECTION`: `true` | `false` - default: "true"
//! - `CDK_WORKS_CREDENTIALS`: `generated-secret` | `rds-managed` - default: "generated-secret"
//! - `CDK_WORKS_DB_USERNAME`: master username - default: "admin"
//! - `CDK_WORKS_LOG_LEVEL`: logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use cdk_works::StackConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StackConfig::from_env()?;
//! config.validate()?;
//! println!("{}", config);
//! # Ok(())
//! # }
//! ```

use crate::infra::cidr;
use crate::infra::database::{
    CredentialPolicy, InstanceType, DEFAULT_BACKUP_RETENTION_DAYS, DEFAULT_INSTANCES,
    DEFAULT_MASTER_USERNAME, DEFAULT_PORT,
};
use crate::infra::engine::EngineProfile;
use crate::infra::network::{
    DEFAULT_MAX_AZS, DEFAULT_NAT_GATEWAYS, DEFAULT_SUBNET_MASK, DEFAULT_VPC_CIDR,
};
use crate::infra::security::OPEN_WORLD_IPV4;
use crate::stack::DEFAULT_STACK_NAME;
use regex::Regex;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";

pub const ENV_ACCOUNT: &str = "CDK_DEFAULT_ACCOUNT";
pub const ENV_REGION: &str = "CDK_DEFAULT_REGION";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Main configuration structure for cdk-works
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    pub stack_name: String,
    pub account: Option<String>,
    pub region: Option<String>,
    pub vpc_cidr: String,
    pub max_azs: u8,
    pub nat_gateways: u8,
    pub subnet_mask: u8,
    /// Peer allowed on the database port; `0.0.0.0/0` opens it to the world
    pub db_ingress_cidr: String,
    pub db_port: u16,
    pub engine_profile: EngineProfile,
    pub db_instance_type: InstanceType,
    pub db_instances: u8,
    pub backup_retention_days: u16,
    pub deletion_protection: bool,
    pub credentials: CredentialPolicy,
    pub log_level: String,
}

impl Default for StackConfig {
    /// Built-in defaults, without reading the environment
    fn default() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            account: None,
            region: None,
            vpc_cidr: DEFAULT_VPC_CIDR.to_string(),
            max_azs: DEFAULT_MAX_AZS,
            nat_gateways: DEFAULT_NAT_GATEWAYS,
            subnet_mask: DEFAULT_SUBNET_MASK,
            db_ingress_cidr: OPEN_WORLD_IPV4.to_string(),
            db_port: DEFAULT_PORT,
            engine_profile: EngineProfile::default(),
            db_instance_type: InstanceType::default(),
            db_instances: DEFAULT_INSTANCES,
            backup_retention_days: DEFAULT_BACKUP_RETENTION_DAYS,
            deletion_protection: true,
            credentials: CredentialPolicy::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty_var(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::ParseError {
            field: key.to_string(),
            error: format!("'{}': {}", raw, e),
        }),
        None => Ok(default),
    }
}

fn parse_bool_var(key: &str, default: bool) -> Result<bool, ConfigError> {
    match non_empty_var(key).map(|v| v.to_lowercase()) {
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::ParseError {
                field: key.to_string(),
                error: format!("'{}' is not a boolean", v),
            }),
        },
        None => Ok(default),
    }
}

impl StackConfig {
    /// Loads configuration from environment variables with defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let username = non_empty_var("CDK_WORKS_DB_USERNAME")
            .unwrap_or_else(|| DEFAULT_MASTER_USERNAME.to_string());
        let credentials = match non_empty_var("CDK_WORKS_CREDENTIALS")
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            None | Some("generated-secret") => CredentialPolicy::GeneratedSecret { username },
            Some("rds-managed") => CredentialPolicy::RdsManaged { username },
            Some(other) => {
                return Err(ConfigError::ParseError {
                    field: "CDK_WORKS_CREDENTIALS".to_string(),
                    error: format!(
                        "'{}'. Valid options: generated-secret, rds-managed",
                        other
                    ),
                })
            }
        };

        Ok(Self {
            stack_name: non_empty_var("CDK_WORKS_STACK_NAME").unwrap_or(defaults.stack_name),
            account: non_empty_var(ENV_ACCOUNT),
            region: non_empty_var(ENV_REGION),
            vpc_cidr: non_empty_var("CDK_WORKS_VPC_CIDR").unwrap_or(defaults.vpc_cidr),
            max_azs: parse_var("CDK_WORKS_MAX_AZS", defaults.max_azs)?,
            nat_gateways: parse_var("CDK_WORKS_NAT_GATEWAYS", defaults.nat_gateways)?,
            subnet_mask: parse_var("CDK_WORKS_SUBNET_MASK", defaults.subnet_mask)?,
            db_ingress_cidr: non_empty_var("CDK_WORKS_DB_INGRESS_CIDR")
                .unwrap_or(defaults.db_ingress_cidr),
            db_port: parse_var("CDK_WORKS_DB_PORT", defaults.db_port)?,
            engine_profile: parse_var("CDK_WORKS_ENGINE_PROFILE", defaults.engine_profile)?,
            db_instance_type: parse_var("CDK_WORKS_DB_INSTANCE_TYPE", defaults.db_instance_type)?,
            db_instances: parse_var("CDK_WORKS_DB_INSTANCES", defaults.db_instances)?,
            backup_retention_days: parse_var(
                "CDK_WORKS_BACKUP_RETENTION_DAYS",
                defaults.backup_retention_days,
            )?,
            deletion_protection: parse_bool_var(
                "CDK_WORKS_DELETION_PROTECTION",
                defaults.deletion_protection,
            )?,
            credentials,
            log_level: non_empty_var("CDK_WORKS_LOG_LEVEL")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.log_level),
        })
    }

    /// Validates the configuration
    ///
    /// Checks identifier formats and value ranges. CIDR blocks and the
    /// network layout are checked again, in full, when constructs are built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stack_name = Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,127}$").expect("valid regex");
        if !stack_name.is_match(&self.stack_name) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid stack name '{}': must start with a letter and contain only letters, digits and hyphens (max 128)",
                self.stack_name
            )));
        }

        if let Some(account) = &self.account {
            let pattern = Regex::new(r"^\d{12}$").expect("valid regex");
            if !pattern.is_match(account) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid account id '{}' in {}: expected 12 digits",
                    account, ENV_ACCOUNT
                )));
            }
        }

        if let Some(region) = &self.region {
            let pattern = Regex::new(r"^[a-z]{2}(-gov)?-[a-z]+-\d$").expect("valid regex");
            if !pattern.is_match(region) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid region '{}' in {}: expected e.g. ap-northeast-1",
                    region, ENV_REGION
                )));
            }
        }

        for (field, block) in [
            ("vpc_cidr", &self.vpc_cidr),
            ("db_ingress_cidr", &self.db_ingress_cidr),
        ] {
            if let Err(e) = cidr::parse_network(block) {
                return Err(ConfigError::ValidationFailed(format!("{}: {}", field, e)));
            }
        }

        if self.max_azs == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_azs must be at least 1".to_string(),
            ));
        }
        if self.nat_gateways > self.max_azs {
            return Err(ConfigError::ValidationFailed(format!(
                "nat_gateways ({}) cannot exceed max_azs ({})",
                self.nat_gateways, self.max_azs
            )));
        }
        if !(16..=28).contains(&self.subnet_mask) {
            return Err(ConfigError::ValidationFailed(format!(
                "subnet_mask must be between 16 and 28, got {}",
                self.subnet_mask
            )));
        }
        if self.db_port == 0 {
            return Err(ConfigError::ValidationFailed(
                "db_port cannot be 0".to_string(),
            ));
        }
        if self.db_instances == 0 {
            return Err(ConfigError::ValidationFailed(
                "db_instances must be at least 1".to_string(),
            ));
        }
        if !(1..=35).contains(&self.backup_retention_days) {
            return Err(ConfigError::ValidationFailed(format!(
                "backup_retention_days must be between 1 and 35, got {}",
                self.backup_retention_days
            )));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn db_ingress_is_open_world(&self) -> bool {
        self.db_ingress_cidr.trim() == OPEN_WORLD_IPV4
    }

    /// Converts configuration to a display map for output formatting
    pub fn to_display_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();

        map.insert("stack_name".to_string(), self.stack_name.clone());
        map.insert(
            "account".to_string(),
            self.account.clone().unwrap_or_else(|| "(unresolved)".to_string()),
        );
        map.insert(
            "region".to_string(),
            self.region.clone().unwrap_or_else(|| "(unresolved)".to_string()),
        );
        map.insert("vpc_cidr".to_string(), self.vpc_cidr.clone());
        map.insert("max_azs".to_string(), self.max_azs.to_string());
        map.insert("nat_gateways".to_string(), self.nat_gateways.to_string());
        map.insert("subnet_mask".to_string(), self.subnet_mask.to_string());
        map.insert("db_ingress_cidr".to_string(), self.db_ingress_cidr.clone());
        map.insert("db_port".to_string(), self.db_port.to_string());
        map.insert("engine_profile".to_string(), self.engine_profile.to_string());
        map.insert(
            "db_instance_type".to_string(),
            self.db_instance_type.to_string(),
        );
        map.insert("db_instances".to_string(), self.db_instances.to_string());
        map.insert(
            "backup_retention_days".to_string(),
            self.backup_retention_days.to_string(),
        );
        map.insert(
            "deletion_protection".to_string(),
            self.deletion_protection.to_string(),
        );
        map.insert("credentials".to_string(), self.credentials.kind().to_string());
        map.insert(
            "db_username".to_string(),
            self.credentials.username().to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());

        map
    }
}

impl fmt::Display for StackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cdk-works Configuration:")?;
        writeln!(f, "  Stack: {}", self.stack_name)?;
        writeln!(
            f,
            "  Environment: {}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region")
        )?;
        writeln!(
            f,
            "  VPC: {} across {} AZs, /{} subnets, {} NAT gateways",
            self.vpc_cidr, self.max_azs, self.subnet_mask, self.nat_gateways
        )?;
        writeln!(
            f,
            "  Database: {} ({}), {} x {}, port {}",
            self.engine_profile,
            self.engine_profile.engine_version().full_version(),
            self.db_instances,
            self.db_instance_type,
            self.db_port
        )?;
        writeln!(f, "  Ingress: {}", self.db_ingress_cidr)?;
        writeln!(
            f,
            "  Backups: {} days, deletion protection {}",
            self.backup_retention_days,
            if self.deletion_protection { "on" } else { "off" }
        )?;
        writeln!(
            f,
            "  Credentials: {} (user {})",
            self.credentials.kind(),
            self.credentials.username()
        )?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
