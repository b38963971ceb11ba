use crate::infra::cidr;
use crate::infra::engine::ENGINE_NAME;
use crate::outputs::OutputName;
use crate::template::intrinsic::{as_get_att, as_reference, referenced_ids};
use crate::template::{Resource, Template};
use anyhow::{bail, Result};
use serde_json::Value;

const VPC_TYPE: &str = "AWS::EC2::VPC";
const SUBNET_TYPE: &str = "AWS::EC2::Subnet";
const SECURITY_GROUP_TYPE: &str = "AWS::EC2::SecurityGroup";
const CLUSTER_TYPE: &str = "AWS::RDS::DBCluster";
const INSTANCE_TYPE: &str = "AWS::RDS::DBInstance";
const SUBNET_GROUP_TYPE: &str = "AWS::RDS::DBSubnetGroup";
const PARAMETER_GROUP_TYPE: &str = "AWS::RDS::DBClusterParameterGroup";
const DYNAMIC_REFERENCE_PREFIX: &str = "{{resolve:secretsmanager:";

pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, template: &Template) -> Result<()>;
}

/// Resolves a `Ref` property to the resource it names
fn referenced<'a>(
    template: &'a Template,
    value: Option<&'a Value>,
) -> Option<(&'a str, &'a Resource)> {
    let id = as_reference(value?)?;
    template.resource(id).map(|r| (id, r))
}

fn string_list(value: Option<&Value>) -> Vec<&Value> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default()
}

/// All six outputs are declared with a non-empty value
pub struct RequiredOutputsRule;

impl ValidationRule for RequiredOutputsRule {
    fn name(&self) -> &'static str {
        "RequiredOutputs"
    }

    fn validate(&self, template: &Template) -> Result<()> {
        for name in OutputName::ALL {
            let Some(output) = template.outputs.get(name.as_str()) else {
                bail!("Output {} is not declared", name);
            };
            let empty = match &output.value {
                Value::Null => true,
                Value::String(s) => s.trim().is_empty(),
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => match map.get("Fn::Join") {
                    Some(join) => string_list(join.get(1)).is_empty(),
                    None => map.is_empty(),
                },
                _ => false,
            };
            if empty {
                bail!("Output {} has an empty value", name);
            }
        }
        Ok(())
    }
}

/// Subnet CIDRs are valid, inside their VPC and pairwise disjoint
pub struct SubnetLayoutRule;

impl ValidationRule for SubnetLayoutRule {
    fn name(&self) -> &'static str {
        "SubnetLayout"
    }

    fn validate(&self, template: &Template) -> Result<()> {
        let mut seen = Vec::new();
        for (id, subnet) in template.resources_of_type(SUBNET_TYPE) {
            let Some(block) = subnet.get("CidrBlock").and_then(Value::as_str) else {
                bail!("Subnet {} has no literal CidrBlock", id);
            };
            let network = cidr::parse_network(block)?;

            match referenced(template, subnet.get("VpcId")) {
                Some((vpc_id, vpc)) if vpc.resource_type == VPC_TYPE => {
                    let vpc_block = vpc.get("CidrBlock").and_then(Value::as_str).unwrap_or("");
                    let vpc_network = cidr::parse_network(vpc_block)?;
                    if !cidr::contains(&vpc_network, &network) {
                        bail!(
                            "Subnet {} ({}) lies outside VPC {} ({})",
                            id,
                            network,
                            vpc_id,
                            vpc_network
                        );
                    }
                }
                _ => bail!("Subnet {} does not reference a VPC in this template", id),
            }

            for (other_id, other) in &seen {
                if cidr::overlaps(&network, other) {
                    bail!("Subnets {} and {} overlap ({} / {})", other_id, id, other, network);
                }
            }
            seen.push((id.clone(), network));
        }
        Ok(())
    }
}

/// Exactly one cluster parameter group is declared and every cluster uses it
pub struct SingleParameterGroupRule;

impl ValidationRule for SingleParameterGroupRule {
    fn name(&self) -> &'static str {
        "SingleParameterGroup"
    }

    fn validate(&self, template: &Template) -> Result<()> {
        let groups: Vec<&String> = template
            .resources_of_type(PARAMETER_GROUP_TYPE)
            .map(|(id, _)| id)
            .collect();
        let group = match groups.as_slice() {
            [group] => group.as_str(),
            [] => bail!("No cluster parameter group is declared"),
            many => bail!(
                "{} cluster parameter groups are declared ({}); only one may exist",
                many.len(),
                many.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ),
        };

        for (id, cluster) in template.resources_of_type(CLUSTER_TYPE) {
            match cluster.get("DBClusterParameterGroupName").and_then(as_reference) {
                Some(attached) if attached == group => {}
                Some(attached) => bail!(
                    "Cluster {} uses parameter group {} instead of {}",
                    id,
                    attached,
                    group
                ),
                None => bail!("Cluster {} has no parameter group attached", id),
            }
        }
        Ok(())
    }
}

/// Attached parameter group family matches the cluster's engine version
pub struct ParameterGroupFamilyRule;

impl ValidationRule for ParameterGroupFamilyRule {
    fn name(&self) -> &'static str {
        "ParameterGroupFamily"
    }

    fn validate(&self, template: &Template) -> Result<()> {
        for (id, cluster) in template.resources_of_type(CLUSTER_TYPE) {
            let Some((group_id, group)) =
                referenced(template, cluster.get("DBClusterParameterGroupName"))
            else {
                continue;
            };
            let version = cluster
                .get("EngineVersion")
                .and_then(Value::as_str)
                .unwrap_or("");
            let Some((mysql, _)) = version.split_once(".mysql_aurora.") else {
                bail!("Cluster {} has unrecognized engine version '{}'", id, version);
            };
            let expected = format!("{}{}", ENGINE_NAME, mysql);
            let family = group.get("Family").and_then(Value::as_str).unwrap_or("");
            if family != expected {
                bail!(
                    "Parameter group {} has family '{}' but cluster {} runs {} (family '{}')",
                    group_id,
                    family,
                    id,
                    version,
                    expected
                );
            }
        }
        Ok(())
    }
}

/// Some security group of each cluster admits traffic on the cluster port
pub struct ClusterIngressRule;

impl ClusterIngressRule {
    fn admits(rule: &Value, port: u64) -> bool {
        let protocol = rule.get("IpProtocol").and_then(Value::as_str).unwrap_or("");
        if protocol == "-1" {
            return true;
        }
        let from = rule.get("FromPort").and_then(Value::as_u64);
        let to = rule.get("ToPort").and_then(Value::as_u64);
        protocol == "tcp" && matches!((from, to), (Some(f), Some(t)) if f <= port && port <= t)
    }
}

impl ValidationRule for ClusterIngressRule {
    fn name(&self) -> &'static str {
        "ClusterIngress"
    }

    fn validate(&self, template: &Template) -> Result<()> {
        for (id, cluster) in template.resources_of_type(CLUSTER_TYPE) {
            let Some(port) = cluster.get("Port").and_then(Value::as_u64) else {
                bail!("Cluster {} has no Port", id);
            };
            let reachable = string_list(cluster.get("VpcSecurityGroupIds"))
                .into_iter()
                .filter_map(|v| as_get_att(v).map(|(sg, _)| sg))
                .filter_map(|sg| template.resource(sg))
                .filter(|sg| sg.resource_type == SECURITY_GROUP_TYPE)
                .flat_map(|sg| string_list(sg.get("SecurityGroupIngress")))
                .any(|rule| Self::admits(rule, port));
            if !reachable {
                bail!("No security group of cluster {} admits port {}", id, port);
            }
        }
        Ok(())
    }
}

/// Clusters sit in non-public subnets and every instance belongs to a
/// declared cluster
pub struct ClusterPlacementRule;

impl ValidationRule for ClusterPlacementRule {
    fn name(&self) -> &'static str {
        "ClusterPlacement"
    }

    fn validate(&self, template: &Template) -> Result<()> {
        for (id, cluster) in template.resources_of_type(CLUSTER_TYPE) {
            let Some((group_id, group)) = referenced(template, cluster.get("DBSubnetGroupName"))
                .filter(|(_, g)| g.resource_type == SUBNET_GROUP_TYPE)
            else {
                bail!("Cluster {} does not reference a DB subnet group", id);
            };
            let subnets = string_list(group.get("SubnetIds"));
            if subnets.len() < 2 {
                bail!("Subnet group {} spans fewer than 2 subnets", group_id);
            }
            for subnet in subnets {
                let Some((subnet_id, resource)) = referenced(template, Some(subnet)) else {
                    bail!("Subnet group {} lists an unknown subnet", group_id);
                };
                if resource.get("MapPublicIpOnLaunch") == Some(&Value::Bool(true)) {
                    bail!("Cluster {} is placed in public subnet {}", id, subnet_id);
                }
            }
        }

        for (id, instance) in template.resources_of_type(INSTANCE_TYPE) {
            match referenced(template, instance.get("DBClusterIdentifier")) {
                Some((_, cluster)) if cluster.resource_type == CLUSTER_TYPE => {}
                _ => bail!("Instance {} does not belong to a cluster in this template", id),
            }
            if instance.get("PubliclyAccessible") == Some(&Value::Bool(true)) {
                bail!("Instance {} is publicly accessible", id);
            }
        }
        Ok(())
    }
}

/// Master passwords only ever appear as Secrets Manager dynamic references
pub struct NoPlaintextCredentialsRule;

impl NoPlaintextCredentialsRule {
    fn is_dynamic_reference(value: &Value) -> bool {
        match value {
            Value::String(s) => s.starts_with(DYNAMIC_REFERENCE_PREFIX),
            Value::Object(map) => string_list(map.get("Fn::Join").and_then(|j| j.get(1)))
                .first()
                .and_then(|v| v.as_str())
                .is_some_and(|s| s.starts_with(DYNAMIC_REFERENCE_PREFIX)),
            _ => false,
        }
    }
}

impl ValidationRule for NoPlaintextCredentialsRule {
    fn name(&self) -> &'static str {
        "NoPlaintextCredentials"
    }

    fn validate(&self, template: &Template) -> Result<()> {
        for (id, cluster) in template.resources_of_type(CLUSTER_TYPE) {
            let managed = cluster.get("ManageMasterUserPassword") == Some(&Value::Bool(true));
            match cluster.get("MasterUserPassword") {
                Some(password) if Self::is_dynamic_reference(password) => {}
                Some(_) => bail!("Cluster {} carries a literal master password", id),
                None if managed => {}
                None => bail!("Cluster {} has no master password source", id),
            }
        }
        Ok(())
    }
}

/// Every `Ref` and `Fn::GetAtt` target exists in the template
pub struct ReferenceIntegrityRule;

impl ValidationRule for ReferenceIntegrityRule {
    fn name(&self) -> &'static str {
        "ReferenceIntegrity"
    }

    fn validate(&self, template: &Template) -> Result<()> {
        for (id, resource) in &template.resources {
            let properties = Value::Object(resource.properties.clone());
            for target in referenced_ids(&properties) {
                if template.resource(&target).is_none() {
                    bail!("Resource {} references unknown {}", id, target);
                }
            }
            for target in &resource.depends_on {
                if template.resource(target).is_none() {
                    bail!("Resource {} depends on unknown {}", id, target);
                }
            }
        }
        for (name, output) in &template.outputs {
            for target in referenced_ids(&output.value) {
                if template.resource(&target).is_none() {
                    bail!("Output {} references unknown {}", name, target);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::stack::StackDefinition;
    use crate::template::intrinsic::reference;
    use crate::template::Output;
    use serde_json::json;

    fn template() -> Template {
        StackDefinition::new(&StackConfig::default())
            .unwrap()
            .synthesize()
            .unwrap()
    }

    fn cluster_id(template: &Template) -> String {
        template
            .resources_of_type(CLUSTER_TYPE)
            .next()
            .map(|(id, _)| id.clone())
            .unwrap()
    }

    fn set_cluster_property(template: &mut Template, key: &str, value: Value) {
        let id = cluster_id(template);
        if let Some(cluster) = template.resources.get_mut(&id) {
            cluster.properties.insert(key.to_string(), value);
        }
    }

    #[test]
    fn test_default_template_passes_every_rule() {
        let template = template();
        let rules: Vec<Box<dyn ValidationRule>> = vec![
            Box::new(RequiredOutputsRule),
            Box::new(SubnetLayoutRule),
            Box::new(SingleParameterGroupRule),
            Box::new(ParameterGroupFamilyRule),
            Box::new(ClusterIngressRule),
            Box::new(ClusterPlacementRule),
            Box::new(NoPlaintextCredentialsRule),
            Box::new(ReferenceIntegrityRule),
        ];
        for rule in rules {
            rule.validate(&template)
                .unwrap_or_else(|e| panic!("{} failed: {}", rule.name(), e));
        }
    }

    #[test]
    fn test_empty_output_rejected() {
        let mut template = template();
        template
            .outputs
            .insert("VpcId".to_string(), Output::new("", "VPC ID"));
        assert!(RequiredOutputsRule.validate(&template).is_err());

        template.outputs.remove("VpcId");
        assert!(RequiredOutputsRule.validate(&template).is_err());
    }

    #[test]
    fn test_overlapping_subnets_rejected() {
        let mut template = template();
        let ids: Vec<String> = template
            .resources_of_type(SUBNET_TYPE)
            .map(|(id, _)| id.clone())
            .take(2)
            .collect();
        for id in &ids {
            if let Some(subnet) = template.resources.get_mut(id) {
                subnet
                    .properties
                    .insert("CidrBlock".to_string(), json!("10.128.0.0/24"));
            }
        }
        let err = SubnetLayoutRule.validate(&template).unwrap_err().to_string();
        assert!(err.contains("overlap"));
    }

    #[test]
    fn test_subnet_outside_vpc_rejected() {
        let mut template = template();
        let id = template
            .resources_of_type(SUBNET_TYPE)
            .map(|(id, _)| id.clone())
            .next()
            .unwrap();
        if let Some(subnet) = template.resources.get_mut(&id) {
            subnet
                .properties
                .insert("CidrBlock".to_string(), json!("192.168.0.0/24"));
        }
        assert!(SubnetLayoutRule.validate(&template).is_err());
    }

    #[test]
    fn test_both_parameter_groups_rejected() {
        let mut template = template();
        template
            .add_resource(
                "AuroraClusterParameterGroupV3",
                Resource::new(PARAMETER_GROUP_TYPE).property("Family", "aurora-mysql8.0"),
            )
            .unwrap();
        let err = SingleParameterGroupRule
            .validate(&template)
            .unwrap_err()
            .to_string();
        assert!(err.contains("2 cluster parameter groups"));
    }

    #[test]
    fn test_no_parameter_group_rejected() {
        let mut template = template();
        let ids: Vec<String> = template
            .resources_of_type(PARAMETER_GROUP_TYPE)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            template.resources.remove(&id);
        }
        assert!(SingleParameterGroupRule.validate(&template).is_err());
    }

    #[test]
    fn test_detached_parameter_group_rejected() {
        let mut template = template();
        let id = cluster_id(&template);
        if let Some(cluster) = template.resources.get_mut(&id) {
            cluster.properties.remove("DBClusterParameterGroupName");
        }
        let err = SingleParameterGroupRule
            .validate(&template)
            .unwrap_err()
            .to_string();
        assert!(err.contains("no parameter group"));
    }

    #[test]
    fn test_family_mismatch_rejected() {
        let mut template = template();
        set_cluster_property(&mut template, "EngineVersion", json!("8.0.mysql_aurora.3.04.2"));
        assert!(ParameterGroupFamilyRule.validate(&template).is_err());
    }

    #[test]
    fn test_unreachable_port_rejected() {
        let mut template = template();
        set_cluster_property(&mut template, "Port", json!(5432));
        assert!(ClusterIngressRule.validate(&template).is_err());
        assert!(ClusterIngressRule::admits(
            &json!({ "IpProtocol": "-1" }),
            5432
        ));
    }

    #[test]
    fn test_literal_password_rejected() {
        let mut template = template();
        set_cluster_property(&mut template, "MasterUserPassword", json!("hunter2"));
        assert!(NoPlaintextCredentialsRule.validate(&template).is_err());
    }

    #[test]
    fn test_public_placement_rejected() {
        let mut template = template();
        let subnet_ids: Vec<String> = template
            .resources
            .iter()
            .filter(|(_, r)| r.resource_type == SUBNET_TYPE)
            .map(|(id, _)| id.clone())
            .collect();
        for id in subnet_ids {
            if let Some(subnet) = template.resources.get_mut(&id) {
                subnet
                    .properties
                    .insert("MapPublicIpOnLaunch".to_string(), json!(true));
            }
        }
        assert!(ClusterPlacementRule.validate(&template).is_err());
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let mut template = template();
        template
            .outputs
            .insert("Extra".to_string(), Output::new(reference("Missing"), "x"));
        let err = ReferenceIntegrityRule
            .validate(&template)
            .unwrap_err()
            .to_string();
        assert!(err.contains("Missing"));
    }
}
