//! Aurora MySQL engine versions and cluster parameter groups
//!
//! An [`EngineProfile`] pairs an engine version with the one parameter
//! group built for its family, so only the group that is actually attached
//! to the cluster ever gets declared.

use super::Construct;
use crate::error::SynthError;
use crate::template::intrinsic::reference;
use crate::template::{ConstructPath, Resource, Template};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const ENGINE_NAME: &str = "aurora-mysql";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuroraMysqlEngineVersion {
    #[serde(rename = "2.11.1")]
    V2_11_1,
    #[serde(rename = "2.11.2")]
    V2_11_2,
    #[serde(rename = "3.04.2")]
    V3_04_2,
}

impl AuroraMysqlEngineVersion {
    pub fn aurora_version(&self) -> &'static str {
        match self {
            Self::V2_11_1 => "2.11.1",
            Self::V2_11_2 => "2.11.2",
            Self::V3_04_2 => "3.04.2",
        }
    }

    /// MySQL compatibility version
    pub fn mysql_version(&self) -> &'static str {
        match self {
            Self::V2_11_1 | Self::V2_11_2 => "5.7",
            Self::V3_04_2 => "8.0",
        }
    }

    /// Value of the cluster's `EngineVersion` property
    pub fn full_version(&self) -> String {
        format!("{}.mysql_aurora.{}", self.mysql_version(), self.aurora_version())
    }

    pub fn parameter_group_family(&self) -> String {
        format!("{}{}", ENGINE_NAME, self.mysql_version())
    }
}

impl fmt::Display for AuroraMysqlEngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", ENGINE_NAME, self.full_version())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterGroupProps {
    pub family: String,
    pub description: String,
    pub parameters: BTreeMap<String, String>,
}

impl ParameterGroupProps {
    /// Group derived from an engine version, with the default description
    pub fn for_engine(engine: AuroraMysqlEngineVersion, parameters: &[(&str, &str)]) -> Self {
        let family = engine.parameter_group_family();
        Self {
            description: format!("Cluster parameter group for {}", family),
            family,
            parameters: to_map(parameters),
        }
    }

    /// Group declared against an explicit family string
    pub fn raw(family: &str, description: &str, parameters: &[(&str, &str)]) -> Self {
        Self {
            family: family.to_string(),
            description: description.to_string(),
            parameters: to_map(parameters),
        }
    }
}

fn to_map(parameters: &[(&str, &str)]) -> BTreeMap<String, String> {
    parameters
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ParameterGroup {
    path: ConstructPath,
    logical_id: String,
    props: ParameterGroupProps,
}

impl ParameterGroup {
    pub fn new(
        scope: &ConstructPath,
        id: &str,
        props: ParameterGroupProps,
    ) -> Result<Self, SynthError> {
        if !props.family.starts_with(ENGINE_NAME) {
            return Err(SynthError::props(
                "ParameterGroup",
                format!("unsupported family '{}'", props.family),
            ));
        }
        let path = scope.child(id)?;
        Ok(Self {
            logical_id: path.logical_id(),
            path,
            props,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Deploy-time group name
    pub fn group_name(&self) -> Value {
        reference(&self.logical_id)
    }

    pub fn family(&self) -> &str {
        &self.props.family
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.props.parameters
    }

    pub fn ensure_compatible(&self, engine: AuroraMysqlEngineVersion) -> Result<(), SynthError> {
        let engine_family = engine.parameter_group_family();
        if self.props.family != engine_family {
            return Err(SynthError::IncompatibleParameterGroup {
                group_family: self.props.family.clone(),
                engine_version: engine.full_version(),
                engine_family,
            });
        }
        Ok(())
    }
}

impl Construct for ParameterGroup {
    fn node_id(&self) -> &str {
        self.path.id()
    }

    fn synthesize(&self, template: &mut Template) -> Result<(), SynthError> {
        let parameters: Map<String, Value> = self
            .props
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect();

        template.add_resource(
            &self.logical_id,
            Resource::new("AWS::RDS::DBClusterParameterGroup")
                .property("Description", self.props.description.clone())
                .property("Family", self.props.family.clone())
                .property("Parameters", parameters),
        )
    }
}

/// Engine version plus the parameter group variant built for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineProfile {
    /// Aurora MySQL 2.11.2 with the managed 5.7 group (binlog only)
    #[default]
    MysqlV2,
    /// Aurora MySQL 3.04.2 with the utf8mb4 / Asia/Tokyo 8.0 group
    MysqlV3,
}

impl EngineProfile {
    pub fn engine_version(&self) -> AuroraMysqlEngineVersion {
        match self {
            EngineProfile::MysqlV2 => AuroraMysqlEngineVersion::V2_11_2,
            EngineProfile::MysqlV3 => AuroraMysqlEngineVersion::V3_04_2,
        }
    }

    /// Construct id of the variant's parameter group
    pub fn parameter_group_id(&self) -> &'static str {
        match self {
            EngineProfile::MysqlV2 => "ClusterParameterGroupV2",
            EngineProfile::MysqlV3 => "AuroraClusterParameterGroupV3",
        }
    }

    pub fn parameter_group_props(&self) -> ParameterGroupProps {
        match self {
            EngineProfile::MysqlV2 => ParameterGroupProps::for_engine(
                AuroraMysqlEngineVersion::V2_11_1,
                &[("binlog_format", "MIXED")],
            ),
            EngineProfile::MysqlV3 => ParameterGroupProps::raw(
                "aurora-mysql8.0",
                "Custom parameter group for Aurora MySQL 3.x",
                &[
                    ("binlog_format", "MIXED"),
                    ("character_set_server", "utf8mb4"),
                    ("character_set_client", "utf8mb4"),
                    ("character_set_database", "utf8mb4"),
                    ("character_set_connection", "utf8mb4"),
                    ("collation_server", "utf8mb4_bin"),
                    ("time_zone", "Asia/Tokyo"),
                ],
            ),
        }
    }

    pub fn parameter_group(&self, scope: &ConstructPath) -> Result<ParameterGroup, SynthError> {
        ParameterGroup::new(scope, self.parameter_group_id(), self.parameter_group_props())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineProfile::MysqlV2 => "mysql-v2",
            EngineProfile::MysqlV3 => "mysql-v3",
        }
    }
}

impl fmt::Display for EngineProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EngineProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql-v2" | "v2" => Ok(EngineProfile::MysqlV2),
            "mysql-v3" | "v3" => Ok(EngineProfile::MysqlV3),
            other => Err(format!(
                "Invalid engine profile: {}. Valid options: mysql-v2, mysql-v3",
                other
            )),
        }
    }
}
