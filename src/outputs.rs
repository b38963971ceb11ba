//! The stack's named outputs
//!
//! At synthesis time the six outputs are intrinsic-function values. After a
//! deployment the engine resolves them to plain strings and writes them to an
//! outputs file shaped like `{ "<StackName>": { "VpcId": "vpc-...", ... } }`.
//! [`DeployedOutputs`] reads that file back.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// `SecretName` value when the cluster has no stack-owned secret
pub const NO_SECRET_PLACEHOLDER: &str = "No secret found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OutputName {
    VpcId,
    PublicSubnets,
    PrivateSubnets,
    ClusterEndpoint,
    ClusterReadEndpoint,
    SecretName,
}

impl OutputName {
    pub const ALL: [OutputName; 6] = [
        OutputName::VpcId,
        OutputName::PublicSubnets,
        OutputName::PrivateSubnets,
        OutputName::ClusterEndpoint,
        OutputName::ClusterReadEndpoint,
        OutputName::SecretName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputName::VpcId => "VpcId",
            OutputName::PublicSubnets => "PublicSubnets",
            OutputName::PrivateSubnets => "PrivateSubnets",
            OutputName::ClusterEndpoint => "ClusterEndpoint",
            OutputName::ClusterReadEndpoint => "ClusterReadEndpoint",
            OutputName::SecretName => "SecretName",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OutputName::VpcId => "VPC ID",
            OutputName::PublicSubnets => "Public Subnet IDs",
            OutputName::PrivateSubnets => "Private Subnet IDs",
            OutputName::ClusterEndpoint => "Aurora Cluster Endpoint",
            OutputName::ClusterReadEndpoint => "Aurora Cluster Read Endpoint",
            OutputName::SecretName => "Secret Name for Database Credentials",
        }
    }
}

impl fmt::Display for OutputName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved outputs of one deployed stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedOutputs {
    pub stack_name: String,
    pub values: BTreeMap<String, String>,
}

impl DeployedOutputs {
    /// Parses an engine outputs document and picks `stack_name`'s entry.
    ///
    /// Non-string values (the engine only writes strings, but hand-edited
    /// files happen) are kept in their JSON form.
    pub fn from_json_str(json: &str, stack_name: &str) -> Result<Self> {
        let document: BTreeMap<String, BTreeMap<String, Value>> =
            serde_json::from_str(json).context("Failed to parse outputs file as JSON")?;

        let Some(outputs) = document.get(stack_name) else {
            let known: Vec<&str> = document.keys().map(String::as_str).collect();
            bail!(
                "Stack '{}' not found in outputs file (stacks present: {})",
                stack_name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            );
        };

        let values = outputs
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();

        Ok(Self {
            stack_name: stack_name.to_string(),
            values,
        })
    }

    pub fn from_file(path: &Path, stack_name: &str) -> Result<Self> {
        debug!(path = %path.display(), stack = stack_name, "Reading outputs file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read outputs file {}", path.display()))?;
        Self::from_json_str(&content, stack_name)
            .with_context(|| format!("Invalid outputs file {}", path.display()))
    }

    pub fn get(&self, name: OutputName) -> Option<&str> {
        self.values.get(name.as_str()).map(String::as_str)
    }

    /// Named outputs that are absent or blank
    pub fn missing(&self) -> Vec<OutputName> {
        OutputName::ALL
            .into_iter()
            .filter(|name| self.get(*name).map_or(true, |v| v.trim().is_empty()))
            .collect()
    }

    pub fn ensure_complete(&self) -> Result<()> {
        let missing = self.missing();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(OutputName::as_str).collect();
            bail!(
                "Stack '{}' is missing outputs: {}",
                self.stack_name,
                names.join(", ")
            );
        }
        Ok(())
    }

    /// Whether the stack owns a generated credentials secret
    pub fn has_secret(&self) -> bool {
        self.get(OutputName::SecretName)
            .is_some_and(|v| v != NO_SECRET_PLACEHOLDER)
    }

    /// Comma-joined subnet list split back into ids
    pub fn subnet_ids(&self, name: OutputName) -> Vec<&str> {
        self.get(name)
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYED: &str = r#"{
        "CdkWorksStack": {
            "VpcId": "vpc-0abc",
            "PublicSubnets": "subnet-1,subnet-2,subnet-3",
            "PrivateSubnets": "subnet-4,subnet-5,subnet-6",
            "ClusterEndpoint": "db.cluster-xyz.ap-northeast-1.rds.amazonaws.com",
            "ClusterReadEndpoint": "db.cluster-ro-xyz.ap-northeast-1.rds.amazonaws.com",
            "SecretName": "AuroraClusterSecret-AbCdEf"
        }
    }"#;

    #[test]
    fn test_output_names() {
        assert_eq!(OutputName::ALL.len(), 6);
        assert_eq!(OutputName::VpcId.as_str(), "VpcId");
        assert_eq!(
            OutputName::SecretName.description(),
            "Secret Name for Database Credentials"
        );
    }

    #[test]
    fn test_complete_outputs() {
        let outputs = DeployedOutputs::from_json_str(DEPLOYED, "CdkWorksStack").unwrap();
        assert!(outputs.missing().is_empty());
        outputs.ensure_complete().unwrap();
        assert!(outputs.has_secret());
        assert_eq!(
            outputs.subnet_ids(OutputName::PrivateSubnets),
            vec!["subnet-4", "subnet-5", "subnet-6"]
        );
    }

    #[test]
    fn test_missing_and_blank_outputs() {
        let json = r#"{ "S": { "VpcId": "vpc-1", "SecretName": "  " } }"#;
        let outputs = DeployedOutputs::from_json_str(json, "S").unwrap();
        let missing = outputs.missing();
        assert_eq!(missing.len(), 5);
        assert!(missing.contains(&OutputName::SecretName));
        let err = outputs.ensure_complete().unwrap_err().to_string();
        assert!(err.contains("ClusterEndpoint"));
    }

    #[test]
    fn test_placeholder_secret_counts_as_present() {
        let json = DEPLOYED.replace("AuroraClusterSecret-AbCdEf", NO_SECRET_PLACEHOLDER);
        let outputs = DeployedOutputs::from_json_str(&json, "CdkWorksStack").unwrap();
        outputs.ensure_complete().unwrap();
        assert!(!outputs.has_secret());
    }

    #[test]
    fn test_unknown_stack() {
        let err = DeployedOutputs::from_json_str(DEPLOYED, "Other")
            .unwrap_err()
            .to_string();
        assert!(err.contains("CdkWorksStack"));
    }

    #[test]
    fn test_non_string_values_kept() {
        let json = r#"{ "S": { "Port": 3306 } }"#;
        let outputs = DeployedOutputs::from_json_str(json, "S").unwrap();
        assert_eq!(outputs.values["Port"], "3306");
    }
}
