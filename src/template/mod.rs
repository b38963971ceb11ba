//! CloudFormation template model
//!
//! This module defines the document that synthesis produces: a set of
//! resources keyed by logical id, plus named outputs. All maps are ordered
//! (`BTreeMap` and the default `serde_json::Map`), so serializing the same
//! template twice always yields the same bytes.

pub mod intrinsic;
pub mod logical_id;

use crate::error::SynthError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub use logical_id::ConstructPath;

/// Template format version understood by CloudFormation
pub const FORMAT_VERSION: &str = "2010-09-09";

/// A complete CloudFormation template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, Resource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

/// What the engine does with a resource when it leaves the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    Delete,
    Retain,
    Snapshot,
}

/// A single resource declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: Vec::new(),
            update_replace_policy: None,
            deletion_policy: None,
        }
    }

    pub fn property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        let id = logical_id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
            self.depends_on.sort();
        }
        self
    }

    /// Sets both the update-replace and deletion policy
    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.update_replace_policy = Some(policy);
        self.deletion_policy = Some(policy);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// A named stack output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Output {
    pub fn new(value: impl Into<Value>, description: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: Some(description.into()),
        }
    }
}

impl Template {
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Adds a resource; logical ids must be unique within the template
    pub fn add_resource(
        &mut self,
        logical_id: impl Into<String>,
        resource: Resource,
    ) -> Result<(), SynthError> {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return Err(SynthError::DuplicateLogicalId(logical_id));
        }
        self.resources.insert(logical_id, resource);
        Ok(())
    }

    pub fn add_output(&mut self, name: impl Into<String>, output: Output) -> Result<(), SynthError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(SynthError::DuplicateLogicalId(name));
        }
        self.outputs.insert(name, output);
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Iterates resources of one CloudFormation type, in logical id order
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).count()
    }

    /// Pretty JSON with a trailing newline
    pub fn to_json(&self) -> Result<String, SynthError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        use anyhow::Context;
        serde_yaml::to_string(self).context("Failed to serialize template to YAML")
    }

    pub fn from_json(json: &str) -> Result<Self, SynthError> {
        Ok(serde_json::from_str(json)?)
    }

    /// "sha256:<hex>" over the JSON rendering
    pub fn digest(&self) -> Result<String, SynthError> {
        let json = self.to_json()?;
        let hash = Sha256::digest(json.as_bytes());
        Ok(format!("sha256:{}", hex::encode(hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_resource_rejects_duplicates() {
        let mut template = Template::new(None);
        template
            .add_resource("Vpc", Resource::new("AWS::EC2::VPC"))
            .unwrap();
        let err = template
            .add_resource("Vpc", Resource::new("AWS::EC2::VPC"))
            .unwrap_err();
        assert!(matches!(err, SynthError::DuplicateLogicalId(id) if id == "Vpc"));
    }

    #[test]
    fn test_serialized_shape() {
        let mut template = Template::new(Some("demo".to_string()));
        template
            .add_resource(
                "Db",
                Resource::new("AWS::RDS::DBCluster")
                    .property("Port", 3306)
                    .depends_on("Net")
                    .removal_policy(RemovalPolicy::Snapshot),
            )
            .unwrap();
        template
            .add_output("DbPort", Output::new("3306", "port"))
            .unwrap();

        let value: Value = serde_json::from_str(&template.to_json().unwrap()).unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(value["Description"], "demo");
        assert_eq!(value["Resources"]["Db"]["Type"], "AWS::RDS::DBCluster");
        assert_eq!(value["Resources"]["Db"]["Properties"]["Port"], 3306);
        assert_eq!(value["Resources"]["Db"]["DependsOn"], json!(["Net"]));
        assert_eq!(value["Resources"]["Db"]["DeletionPolicy"], "Snapshot");
        assert_eq!(value["Resources"]["Db"]["UpdateReplacePolicy"], "Snapshot");
        assert_eq!(value["Outputs"]["DbPort"]["Description"], "port");
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let mut template = Template::new(None);
        template
            .add_resource("Igw", Resource::new("AWS::EC2::InternetGateway"))
            .unwrap();
        let json = template.to_json().unwrap();
        assert!(!json.contains("Outputs"));
        assert!(!json.contains("Properties"));
        assert!(!json.contains("Description"));
    }

    #[test]
    fn test_json_round_trip_preserves_template() {
        let mut template = Template::new(Some("x".to_string()));
        template
            .add_resource(
                "Sg",
                Resource::new("AWS::EC2::SecurityGroup").property("GroupDescription", "sg"),
            )
            .unwrap();
        let parsed = Template::from_json(&template.to_json().unwrap()).unwrap();
        assert_eq!(parsed, template);
    }

    #[test]
    fn test_digest_is_stable() {
        let build = || {
            let mut t = Template::new(None);
            t.add_resource("B", Resource::new("T").property("z", 1).property("a", 2))
                .unwrap();
            t.add_resource("A", Resource::new("T")).unwrap();
            t
        };
        let first = build().digest().unwrap();
        assert!(first.starts_with("sha256:"));
        assert_eq!(first, build().digest().unwrap());
    }

    #[test]
    fn test_resources_of_type() {
        let mut template = Template::new(None);
        template
            .add_resource("S1", Resource::new("AWS::EC2::Subnet"))
            .unwrap();
        template
            .add_resource("S2", Resource::new("AWS::EC2::Subnet"))
            .unwrap();
        template
            .add_resource("V", Resource::new("AWS::EC2::VPC"))
            .unwrap();
        assert_eq!(template.count_of_type("AWS::EC2::Subnet"), 2);
        let ids: Vec<_> = template
            .resources_of_type("AWS::EC2::Subnet")
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(ids, vec!["S1", "S2"]);
    }
}
