//! VPC construct
//!
//! Lays out one subnet per availability zone for every configured tier and
//! renders the VPC, internet gateway, subnets, route tables and (optionally)
//! NAT gateways.
//!
//! Subnet CIDR blocks are carved sequentially from the VPC range in tier
//! order: all AZs of the first tier, then all AZs of the next. With the
//! default layout that gives `Public` 10.128.0-2.0/24 and `Private`
//! 10.128.3-5.0/24.
//!
//! `PrivateWithEgress` subnets only get a default route when NAT gateways
//! exist. With zero NAT gateways they are declared egress-capable but have no
//! managed egress path; connectivity is left to whatever the operator
//! attaches later.

use super::cidr::{self, CidrAllocator};
use super::Construct;
use crate::error::SynthError;
use crate::template::intrinsic::{get_att, get_azs, reference, select, tags};
use crate::template::{ConstructPath, Resource, Template};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

pub const DEFAULT_VPC_CIDR: &str = "10.128.0.0/16";
pub const DEFAULT_MAX_AZS: u8 = 3;
/// No NAT devices: private subnets are egress-capable but unrouted
pub const DEFAULT_NAT_GATEWAYS: u8 = 0;
pub const DEFAULT_SUBNET_MASK: u8 = 24;

/// Smallest subnet AWS accepts
const MAX_SUBNET_MASK: u8 = 28;
/// Largest VPC/subnet AWS accepts
const MIN_PREFIX: u8 = 16;
const ANY_IPV4: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetType {
    /// Routed through the internet gateway, public IPs on launch
    Public,
    /// Private, with egress through NAT gateways when any exist
    PrivateWithEgress,
    /// Private with no egress route at all
    PrivateIsolated,
}

impl SubnetType {
    /// Value of the `aws-cdk:subnet-type` tag
    pub fn tag_value(&self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
            SubnetType::PrivateWithEgress => "Private",
            SubnetType::PrivateIsolated => "Isolated",
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, SubnetType::Public)
    }
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetType::Public => write!(f, "public"),
            SubnetType::PrivateWithEgress => write!(f, "private-with-egress"),
            SubnetType::PrivateIsolated => write!(f, "private-isolated"),
        }
    }
}

/// One subnet tier, replicated across every AZ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetConfiguration {
    pub name: String,
    pub subnet_type: SubnetType,
    pub cidr_mask: u8,
}

impl SubnetConfiguration {
    pub fn new(name: impl Into<String>, subnet_type: SubnetType, cidr_mask: u8) -> Self {
        Self {
            name: name.into(),
            subnet_type,
            cidr_mask,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcProps {
    pub cidr: String,
    pub max_azs: u8,
    pub nat_gateways: u8,
    pub subnet_configuration: Vec<SubnetConfiguration>,
}

impl Default for VpcProps {
    fn default() -> Self {
        Self {
            cidr: DEFAULT_VPC_CIDR.to_string(),
            max_azs: DEFAULT_MAX_AZS,
            nat_gateways: DEFAULT_NAT_GATEWAYS,
            subnet_configuration: vec![
                SubnetConfiguration::new("Public", SubnetType::Public, DEFAULT_SUBNET_MASK),
                SubnetConfiguration::new(
                    "Private",
                    SubnetType::PrivateWithEgress,
                    DEFAULT_SUBNET_MASK,
                ),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Subnet {
    path: ConstructPath,
    logical_id: String,
    route_table_id: String,
    association_id: String,
    pub tier: String,
    pub subnet_type: SubnetType,
    pub cidr: Ipv4Network,
    pub az_index: usize,
}

impl Subnet {
    fn new(
        vpc_path: &ConstructPath,
        tier: &SubnetConfiguration,
        az_index: usize,
        cidr: Ipv4Network,
    ) -> Result<Self, SynthError> {
        let path = vpc_path.child(&format!("{}Subnet{}", tier.name, az_index + 1))?;
        Ok(Self {
            logical_id: path.child("Subnet")?.logical_id(),
            route_table_id: path.child("RouteTable")?.logical_id(),
            association_id: path.child("RouteTableAssociation")?.logical_id(),
            path,
            tier: tier.name.clone(),
            subnet_type: tier.subnet_type,
            cidr,
            az_index,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Deploy-time subnet id
    pub fn subnet_id(&self) -> Value {
        reference(&self.logical_id)
    }

    pub fn route_table_logical_id(&self) -> &str {
        &self.route_table_id
    }

    fn default_route_id(&self) -> Result<String, SynthError> {
        Ok(self.path.child("DefaultRoute")?.logical_id())
    }
}

#[derive(Debug, Clone)]
struct NatGateway {
    logical_id: String,
    eip_id: String,
    subnet_index: usize,
}

#[derive(Debug, Clone)]
pub struct Vpc {
    path: ConstructPath,
    logical_id: String,
    igw_id: String,
    igw_attachment_id: String,
    cidr: Ipv4Network,
    props: VpcProps,
    subnets: Vec<Subnet>,
    nat_gateways: Vec<NatGateway>,
}

impl Vpc {
    pub fn new(scope: &ConstructPath, id: &str, props: VpcProps) -> Result<Self, SynthError> {
        let path = scope.child(id)?;
        let cidr = cidr::parse_network(&props.cidr)?;
        validate_props(&props, &cidr)?;

        let mut allocator = CidrAllocator::new(cidr);
        let mut subnets = Vec::new();
        for tier in &props.subnet_configuration {
            for az in 0..usize::from(props.max_azs) {
                let block = allocator.allocate(tier.cidr_mask)?;
                debug!(tier = %tier.name, az, cidr = %block, "Allocated subnet");
                subnets.push(Subnet::new(&path, tier, az, block)?);
            }
        }

        let public: Vec<usize> = subnets
            .iter()
            .enumerate()
            .filter(|(_, s)| s.subnet_type.is_public())
            .map(|(i, _)| i)
            .collect();
        let mut nat_gateways = Vec::new();
        for &subnet_index in public.iter().take(usize::from(props.nat_gateways)) {
            let subnet_path = &subnets[subnet_index].path;
            nat_gateways.push(NatGateway {
                logical_id: subnet_path.child("NATGateway")?.logical_id(),
                eip_id: subnet_path.child("EIP")?.logical_id(),
                subnet_index,
            });
        }

        if props.nat_gateways == 0
            && subnets
                .iter()
                .any(|s| s.subnet_type == SubnetType::PrivateWithEgress)
        {
            warn!(
                vpc = %path,
                "Private-with-egress subnets declared without NAT gateways; they have no managed egress route"
            );
        }

        Ok(Self {
            logical_id: path.child("Resource")?.logical_id(),
            igw_id: path.child("IGW")?.logical_id(),
            igw_attachment_id: path.child("VPCGW")?.logical_id(),
            path,
            cidr,
            props,
            subnets,
            nat_gateways,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn vpc_id(&self) -> Value {
        reference(&self.logical_id)
    }

    pub fn cidr(&self) -> &Ipv4Network {
        &self.cidr
    }

    pub fn props(&self) -> &VpcProps {
        &self.props
    }

    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    pub fn select_subnets(&self, subnet_type: SubnetType) -> Vec<&Subnet> {
        self.subnets
            .iter()
            .filter(|s| s.subnet_type == subnet_type)
            .collect()
    }

    pub fn public_subnets(&self) -> Vec<&Subnet> {
        self.select_subnets(SubnetType::Public)
    }

    pub fn private_subnets(&self) -> Vec<&Subnet> {
        self.select_subnets(SubnetType::PrivateWithEgress)
    }

    pub fn isolated_subnets(&self) -> Vec<&Subnet> {
        self.select_subnets(SubnetType::PrivateIsolated)
    }

    pub fn nat_gateway_count(&self) -> usize {
        self.nat_gateways.len()
    }

    fn has_public_subnets(&self) -> bool {
        self.subnets.iter().any(|s| s.subnet_type.is_public())
    }

    fn name_tag(&self) -> String {
        self.path.to_string()
    }

    fn render_subnet(&self, subnet: &Subnet, template: &mut Template) -> Result<(), SynthError> {
        let name = subnet.path.to_string();
        let subnet_tags = tags(&[
            ("Name", name.as_str()),
            ("aws-cdk:subnet-name", subnet.tier.as_str()),
            ("aws-cdk:subnet-type", subnet.subnet_type.tag_value()),
        ]);

        template.add_resource(
            &subnet.logical_id,
            Resource::new("AWS::EC2::Subnet")
                .property(
                    "AvailabilityZone",
                    select(subnet.az_index, get_azs("")),
                )
                .property("CidrBlock", subnet.cidr.to_string())
                .property("MapPublicIpOnLaunch", subnet.subnet_type.is_public())
                .property("Tags", subnet_tags)
                .property("VpcId", self.vpc_id()),
        )?;

        template.add_resource(
            &subnet.route_table_id,
            Resource::new("AWS::EC2::RouteTable")
                .property("Tags", tags(&[("Name", name.as_str())]))
                .property("VpcId", self.vpc_id()),
        )?;

        template.add_resource(
            &subnet.association_id,
            Resource::new("AWS::EC2::SubnetRouteTableAssociation")
                .property("RouteTableId", reference(&subnet.route_table_id))
                .property("SubnetId", subnet.subnet_id()),
        )?;

        match subnet.subnet_type {
            SubnetType::Public => {
                template.add_resource(
                    subnet.default_route_id()?,
                    Resource::new("AWS::EC2::Route")
                        .property("DestinationCidrBlock", ANY_IPV4)
                        .property("GatewayId", reference(&self.igw_id))
                        .property("RouteTableId", reference(&subnet.route_table_id))
                        .depends_on(self.igw_attachment_id.clone()),
                )?;
            }
            SubnetType::PrivateWithEgress if !self.nat_gateways.is_empty() => {
                let nat = &self.nat_gateways[subnet.az_index % self.nat_gateways.len()];
                template.add_resource(
                    subnet.default_route_id()?,
                    Resource::new("AWS::EC2::Route")
                        .property("DestinationCidrBlock", ANY_IPV4)
                        .property("NatGatewayId", reference(&nat.logical_id))
                        .property("RouteTableId", reference(&subnet.route_table_id)),
                )?;
            }
            SubnetType::PrivateWithEgress | SubnetType::PrivateIsolated => {}
        }

        Ok(())
    }

    fn render_nat_gateway(&self, nat: &NatGateway, template: &mut Template) -> Result<(), SynthError> {
        let subnet = &self.subnets[nat.subnet_index];
        let name = subnet.path.to_string();

        template.add_resource(
            &nat.eip_id,
            Resource::new("AWS::EC2::EIP")
                .property("Domain", "vpc")
                .property("Tags", tags(&[("Name", name.as_str())])),
        )?;

        template.add_resource(
            &nat.logical_id,
            Resource::new("AWS::EC2::NatGateway")
                .property("AllocationId", get_att(&nat.eip_id, "AllocationId"))
                .property("SubnetId", subnet.subnet_id())
                .property("Tags", tags(&[("Name", name.as_str())]))
                .depends_on(subnet.default_route_id()?)
                .depends_on(subnet.association_id.clone()),
        )?;

        Ok(())
    }
}

fn validate_props(props: &VpcProps, cidr: &Ipv4Network) -> Result<(), SynthError> {
    if cidr.prefix() < MIN_PREFIX || cidr.prefix() > MAX_SUBNET_MASK {
        return Err(SynthError::props(
            "Vpc",
            format!(
                "VPC CIDR prefix must be between /{} and /{}, got /{}",
                MIN_PREFIX,
                MAX_SUBNET_MASK,
                cidr.prefix()
            ),
        ));
    }
    if props.max_azs == 0 {
        return Err(SynthError::props("Vpc", "max_azs must be at least 1"));
    }
    if props.subnet_configuration.is_empty() {
        return Err(SynthError::props(
            "Vpc",
            "at least one subnet configuration is required",
        ));
    }

    let mut names = std::collections::BTreeSet::new();
    for tier in &props.subnet_configuration {
        if !names.insert(tier.name.as_str()) {
            return Err(SynthError::props(
                "Vpc",
                format!("duplicate subnet configuration name '{}'", tier.name),
            ));
        }
        if tier.cidr_mask < cidr.prefix() || tier.cidr_mask > MAX_SUBNET_MASK {
            return Err(SynthError::props(
                "Vpc",
                format!(
                    "subnet '{}' mask /{} must be between /{} and /{}",
                    tier.name,
                    tier.cidr_mask,
                    cidr.prefix(),
                    MAX_SUBNET_MASK
                ),
            ));
        }
    }

    let has_public = props
        .subnet_configuration
        .iter()
        .any(|t| t.subnet_type.is_public());
    if props.nat_gateways > 0 && !has_public {
        return Err(SynthError::props(
            "Vpc",
            "NAT gateways require at least one public subnet configuration",
        ));
    }
    if props.nat_gateways > props.max_azs {
        return Err(SynthError::props(
            "Vpc",
            format!(
                "nat_gateways ({}) cannot exceed max_azs ({})",
                props.nat_gateways, props.max_azs
            ),
        ));
    }

    Ok(())
}

impl Construct for Vpc {
    fn node_id(&self) -> &str {
        self.path.id()
    }

    fn synthesize(&self, template: &mut Template) -> Result<(), SynthError> {
        let name = self.name_tag();
        template.add_resource(
            &self.logical_id,
            Resource::new("AWS::EC2::VPC")
                .property("CidrBlock", self.cidr.to_string())
                .property("EnableDnsHostnames", true)
                .property("EnableDnsSupport", true)
                .property("InstanceTenancy", "default")
                .property("Tags", tags(&[("Name", name.as_str())])),
        )?;

        if self.has_public_subnets() {
            template.add_resource(
                &self.igw_id,
                Resource::new("AWS::EC2::InternetGateway")
                    .property("Tags", tags(&[("Name", name.as_str())])),
            )?;
            template.add_resource(
                &self.igw_attachment_id,
                Resource::new("AWS::EC2::VPCGatewayAttachment")
                    .property("InternetGatewayId", reference(&self.igw_id))
                    .property("VpcId", self.vpc_id()),
            )?;
        }

        for subnet in &self.subnets {
            self.render_subnet(subnet, template)?;
        }
        for nat in &self.nat_gateways {
            self.render_nat_gateway(nat, template)?;
        }

        debug!(
            vpc = %self.path,
            subnets = self.subnets.len(),
            nat_gateways = self.nat_gateways.len(),
            "Rendered VPC"
        );
        Ok(())
    }
}
