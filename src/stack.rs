//! The VPC + Aurora MySQL stack
//!
//! [`StackDefinition`] is the one place where constructs are wired together:
//! the VPC, the database security group, the parameter group selected by the
//! engine profile and the cluster itself. Building it has no side effects;
//! [`StackDefinition::synthesize`] renders everything plus the six outputs
//! into a fresh [`Template`].

use crate::config::StackConfig;
use crate::error::SynthError;
use crate::infra::database::{DatabaseCluster, DatabaseClusterProps};
use crate::infra::engine::{EngineProfile, ParameterGroup};
use crate::infra::network::{Subnet, SubnetConfiguration, SubnetType, Vpc, VpcProps};
use crate::infra::security::{Peer, Port, SecurityGroup, SecurityGroupProps};
use crate::infra::Construct;
use crate::outputs::{OutputName, NO_SECRET_PLACEHOLDER};
use crate::template::intrinsic::join;
use crate::template::{ConstructPath, Output, Template};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const DEFAULT_STACK_NAME: &str = "CdkWorksStack";
pub const STACK_DESCRIPTION: &str = "My Webapp Infrastructure Stack (VPC and Aurora)";

const VPC_ID: &str = "TestVPC";
const SECURITY_GROUP_ID: &str = "DatabaseSecurityGroup";
const CLUSTER_ID: &str = "AuroraCluster";

#[derive(Debug, Clone)]
pub struct StackDefinition {
    name: String,
    engine_profile: EngineProfile,
    vpc: Vpc,
    security_group: SecurityGroup,
    parameter_group: ParameterGroup,
    cluster: DatabaseCluster,
}

impl StackDefinition {
    /// Declares every construct of the stack from `config`.
    ///
    /// Fails on malformed CIDRs, CIDR exhaustion, an engine/parameter group
    /// mismatch or out-of-range construct properties.
    pub fn new(config: &StackConfig) -> Result<Self, SynthError> {
        let scope = ConstructPath::root(config.stack_name.clone());

        let vpc = Vpc::new(
            &scope,
            VPC_ID,
            VpcProps {
                cidr: config.vpc_cidr.clone(),
                max_azs: config.max_azs,
                nat_gateways: config.nat_gateways,
                subnet_configuration: vec![
                    SubnetConfiguration::new("Public", SubnetType::Public, config.subnet_mask),
                    SubnetConfiguration::new(
                        "Private",
                        SubnetType::PrivateWithEgress,
                        config.subnet_mask,
                    ),
                ],
            },
        )?;

        let mut security_group = SecurityGroup::new(
            &scope,
            SECURITY_GROUP_ID,
            SecurityGroupProps {
                vpc_id: vpc.vpc_id(),
                description: "Security group for Aurora database".to_string(),
                allow_all_outbound: true,
            },
        )?;
        let peer = Peer::ipv4(&config.db_ingress_cidr)?;
        if peer.is_open_world() {
            warn!(
                peer = %peer.cidr(),
                port = config.db_port,
                "Database port is open to every IPv4 address; set CDK_WORKS_DB_INGRESS_CIDR to restrict it"
            );
        }
        security_group.add_ingress_rule(peer, Port::tcp(config.db_port), "Allow MySQL access")?;

        let engine_profile = config.engine_profile;
        let parameter_group = engine_profile.parameter_group(&scope)?;

        let cluster = DatabaseCluster::new(
            &scope,
            CLUSTER_ID,
            DatabaseClusterProps {
                instance_type: config.db_instance_type,
                instances: config.db_instances,
                port: config.db_port,
                credentials: config.credentials.clone(),
                backup_retention_days: config.backup_retention_days,
                deletion_protection: config.deletion_protection,
                ..DatabaseClusterProps::new(engine_profile.engine_version())
            },
            &vpc,
            &[&security_group],
            &parameter_group,
        )?;

        debug!(
            stack = %config.stack_name,
            profile = %engine_profile,
            subnets = vpc.subnets().len(),
            "Declared stack"
        );

        Ok(Self {
            name: config.stack_name.clone(),
            engine_profile,
            vpc,
            security_group,
            parameter_group,
            cluster,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &'static str {
        STACK_DESCRIPTION
    }

    pub fn engine_profile(&self) -> EngineProfile {
        self.engine_profile
    }

    pub fn vpc(&self) -> &Vpc {
        &self.vpc
    }

    pub fn cluster(&self) -> &DatabaseCluster {
        &self.cluster
    }

    pub fn security_group(&self) -> &SecurityGroup {
        &self.security_group
    }

    pub fn parameter_group(&self) -> &ParameterGroup {
        &self.parameter_group
    }

    /// Synthesis-time value of each named output, in declaration order
    pub fn outputs(&self) -> Vec<(OutputName, Value)> {
        let subnet_list = |subnets: Vec<&Subnet>| {
            join(",", subnets.iter().map(|s| s.subnet_id()).collect())
        };

        OutputName::ALL
            .into_iter()
            .map(|name| {
                let value = match name {
                    OutputName::VpcId => self.vpc.vpc_id(),
                    OutputName::PublicSubnets => subnet_list(self.vpc.public_subnets()),
                    OutputName::PrivateSubnets => subnet_list(self.vpc.private_subnets()),
                    OutputName::ClusterEndpoint => self.cluster.cluster_endpoint(),
                    OutputName::ClusterReadEndpoint => self.cluster.cluster_read_endpoint(),
                    OutputName::SecretName => match self.cluster.secret() {
                        Some(secret) => secret.secret_name(),
                        None => Value::from(NO_SECRET_PLACEHOLDER),
                    },
                };
                (name, value)
            })
            .collect()
    }

    /// Renders the stack into a new template. Deterministic: the same
    /// definition always yields the same document.
    pub fn synthesize(&self) -> Result<Template, SynthError> {
        let mut template = Template::new(Some(STACK_DESCRIPTION.to_string()));

        let constructs: [&dyn Construct; 4] = [
            &self.vpc,
            &self.security_group,
            &self.parameter_group,
            &self.cluster,
        ];
        for construct in constructs {
            debug!(construct = construct.node_id(), "Synthesizing construct");
            construct.synthesize(&mut template)?;
        }

        for (name, value) in self.outputs() {
            template.add_output(name.as_str(), Output::new(value, name.description()))?;
        }

        info!(
            stack = %self.name,
            resources = template.resources.len(),
            outputs = template.outputs.len(),
            "Synthesized stack"
        );
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::database::CredentialPolicy;
    use crate::template::intrinsic::as_reference;

    fn default_stack() -> StackDefinition {
        StackDefinition::new(&StackConfig::default()).unwrap()
    }

    #[test]
    fn test_default_stack_accessors() {
        let stack = default_stack();
        assert_eq!(stack.name(), DEFAULT_STACK_NAME);
        assert_eq!(stack.vpc().subnets().len(), 6);
        assert_eq!(stack.vpc().nat_gateway_count(), 0);
        assert_eq!(stack.cluster().instance_count(), 1);
        assert_eq!(stack.security_group().ingress_rules().len(), 1);
        assert_eq!(stack.engine_profile(), EngineProfile::MysqlV2);
        assert_eq!(stack.parameter_group().family(), "aurora-mysql5.7");
    }

    #[test]
    fn test_template_description_and_outputs() {
        let template = default_stack().synthesize().unwrap();
        assert_eq!(template.description.as_deref(), Some(STACK_DESCRIPTION));
        assert_eq!(template.outputs.len(), 6);
        for name in OutputName::ALL {
            let output = &template.outputs[name.as_str()];
            assert!(!output.value.is_null());
            assert_eq!(output.description.as_deref(), Some(name.description()));
        }
    }

    #[test]
    fn test_subnet_outputs_join_subnet_refs() {
        let stack = default_stack();
        let template = stack.synthesize().unwrap();
        let joined = &template.outputs["PublicSubnets"].value["Fn::Join"];
        assert_eq!(joined[0], ",");
        let ids: Vec<&str> = joined[1]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(as_reference)
            .collect();
        let expected: Vec<&str> = stack
            .vpc()
            .public_subnets()
            .iter()
            .map(|s| s.logical_id())
            .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_secret_name_placeholder_without_secret() {
        let config = StackConfig {
            credentials: CredentialPolicy::RdsManaged {
                username: "admin".to_string(),
            },
            ..StackConfig::default()
        };
        let template = StackDefinition::new(&config).unwrap().synthesize().unwrap();
        assert_eq!(template.outputs["SecretName"].value, NO_SECRET_PLACEHOLDER);
    }

    #[test]
    fn test_ingress_peer_is_configurable() {
        let config = StackConfig {
            db_ingress_cidr: "10.128.0.0/16".to_string(),
            ..StackConfig::default()
        };
        let stack = StackDefinition::new(&config).unwrap();
        let rule = &stack.security_group().ingress_rules()[0];
        assert!(!rule.peer.is_open_world());
        assert_eq!(rule.peer.cidr(), "10.128.0.0/16");
    }

    #[test]
    fn test_bad_cidr_is_synth_error() {
        let config = StackConfig {
            vpc_cidr: "10.128.0.0/33".to_string(),
            ..StackConfig::default()
        };
        assert!(matches!(
            StackDefinition::new(&config),
            Err(SynthError::InvalidCidr { .. })
        ));
    }
}
