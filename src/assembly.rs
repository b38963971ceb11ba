//! Cloud assembly: the directory handed to the provisioning engine
//!
//! A synthesized assembly holds the stack template and a `manifest.json`
//! that names it and records the target environment:
//!
//! ```text
//! cdk.out/
//! ├── manifest.json
//! └── CdkWorksStack.template.json
//! ```

use crate::config::StackConfig;
use crate::error::SynthError;
use crate::stack::StackDefinition;
use crate::template::Template;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "36.0.0";
pub const STACK_ARTIFACT_TYPE: &str = "aws:cloudformation:stack";
pub const DEFAULT_OUTPUT_DIR: &str = "cdk.out";

const UNKNOWN_ACCOUNT: &str = "unknown-account";
const UNKNOWN_REGION: &str = "unknown-region";

/// Deployment target. Unset parts are left for the engine to resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Environment {
    pub fn new(account: Option<String>, region: Option<String>) -> Self {
        Self { account, region }
    }

    pub fn from_config(config: &StackConfig) -> Self {
        Self::new(config.account.clone(), config.region.clone())
    }

    pub fn is_agnostic(&self) -> bool {
        self.account.is_none() || self.region.is_none()
    }

    /// `aws://<account>/<region>`, with `unknown-*` for unset parts
    pub fn uri(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or(UNKNOWN_ACCOUNT),
            self.region.as_deref().unwrap_or(UNKNOWN_REGION)
        )
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProperties {
    pub template_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub environment: String,
    pub properties: ArtifactProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub artifacts: BTreeMap<String, Artifact>,
}

/// In-memory assembly for one stack
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    pub stack_name: String,
    pub environment: Environment,
    pub template: Template,
    pub manifest: Manifest,
}

/// What `write_to` produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthSummary {
    pub stack_name: String,
    pub environment: String,
    pub directory: PathBuf,
    pub template_file: PathBuf,
    pub manifest_file: PathBuf,
    pub resources: usize,
    pub outputs: usize,
    pub digest: String,
}

pub fn template_file_name(stack_name: &str) -> String {
    format!("{}.template.json", stack_name)
}

/// Synthesizes `stack` and wraps it in a manifest targeting `environment`
pub fn synthesize(
    stack: &StackDefinition,
    environment: &Environment,
) -> Result<CloudAssembly, SynthError> {
    let template = stack.synthesize()?;

    if environment.is_agnostic() {
        warn!(
            environment = %environment.uri(),
            "Environment is not fully specified; the deploying engine will resolve it"
        );
    }

    let mut artifacts = BTreeMap::new();
    artifacts.insert(
        stack.name().to_string(),
        Artifact {
            artifact_type: STACK_ARTIFACT_TYPE.to_string(),
            environment: environment.uri(),
            properties: ArtifactProperties {
                template_file: template_file_name(stack.name()),
                description: template.description.clone(),
            },
        },
    );

    Ok(CloudAssembly {
        stack_name: stack.name().to_string(),
        environment: environment.clone(),
        template,
        manifest: Manifest {
            version: MANIFEST_VERSION.to_string(),
            artifacts,
        },
    })
}

impl CloudAssembly {
    /// Writes the template and manifest into `dir`, creating it if needed.
    /// Existing files with the same names are overwritten.
    pub fn write_to(&self, dir: &Path) -> Result<SynthSummary, SynthError> {
        fs::create_dir_all(dir)?;

        let template_file = dir.join(template_file_name(&self.stack_name));
        fs::write(&template_file, self.template.to_json()?)?;

        let manifest_file = dir.join(MANIFEST_FILE);
        let mut manifest = serde_json::to_string_pretty(&self.manifest)?;
        manifest.push('\n');
        fs::write(&manifest_file, manifest)?;

        let summary = SynthSummary {
            stack_name: self.stack_name.clone(),
            environment: self.environment.uri(),
            directory: dir.to_path_buf(),
            template_file,
            manifest_file,
            resources: self.template.resources.len(),
            outputs: self.template.outputs.len(),
            digest: self.template.digest()?,
        };

        info!(
            directory = %dir.display(),
            digest = %summary.digest,
            "Wrote cloud assembly"
        );
        Ok(summary)
    }

    /// Reads a manifest previously written by [`CloudAssembly::write_to`]
    pub fn read_manifest(dir: &Path) -> Result<Manifest, SynthError> {
        let content = fs::read_to_string(dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn assembly(environment: Environment) -> CloudAssembly {
        let stack = StackDefinition::new(&StackConfig::default()).unwrap();
        synthesize(&stack, &environment).unwrap()
    }

    #[test]
    fn test_environment_uri() {
        assert_eq!(
            Environment::default().uri(),
            "aws://unknown-account/unknown-region"
        );
        let env = Environment::new(
            Some("123456789012".to_string()),
            Some("ap-northeast-1".to_string()),
        );
        assert_eq!(env.uri(), "aws://123456789012/ap-northeast-1");
        assert!(!env.is_agnostic());
    }

    #[test]
    fn test_manifest_shape() {
        let assembly = assembly(Environment::default());
        let artifact = &assembly.manifest.artifacts["CdkWorksStack"];
        assert_eq!(assembly.manifest.version, MANIFEST_VERSION);
        assert_eq!(artifact.artifact_type, "aws:cloudformation:stack");
        assert_eq!(artifact.properties.template_file, "CdkWorksStack.template.json");

        let json = serde_json::to_value(&assembly.manifest).unwrap();
        assert_eq!(
            json["artifacts"]["CdkWorksStack"]["properties"]["templateFile"],
            "CdkWorksStack.template.json"
        );
        assert_eq!(json["artifacts"]["CdkWorksStack"]["type"], STACK_ARTIFACT_TYPE);
    }

    #[test]
    fn test_write_to_directory() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("cdk.out");
        let assembly = assembly(Environment::default());
        let summary = assembly.write_to(&out).unwrap();

        assert!(summary.template_file.exists());
        assert!(summary.digest.starts_with("sha256:"));
        assert_eq!(summary.outputs, 6);

        let written = fs::read_to_string(&summary.template_file).unwrap();
        assert_eq!(Template::from_json(&written).unwrap(), assembly.template);
        assert_eq!(CloudAssembly::read_manifest(&out).unwrap(), assembly.manifest);
    }

    #[test]
    fn test_rewrite_is_identical() {
        let dir = TempDir::new().unwrap();
        let first = assembly(Environment::default()).write_to(dir.path()).unwrap();
        let bytes = fs::read(&first.template_file).unwrap();
        let second = assembly(Environment::default()).write_to(dir.path()).unwrap();
        assert_eq!(first.digest, second.digest);
        assert_eq!(bytes, fs::read(&second.template_file).unwrap());
    }
}
