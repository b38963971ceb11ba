use super::cidr;
use super::Construct;
use crate::error::SynthError;
use crate::template::intrinsic::get_att;
use crate::template::{ConstructPath, Resource, Template};
use serde_json::{json, Value};
use std::fmt;
use std::net::Ipv4Addr;

/// Every IPv4 address. Used as the default database ingress peer, which
/// exposes the database port to the whole internet.
pub const OPEN_WORLD_IPV4: &str = "0.0.0.0/0";

const DEFAULT_EGRESS_DESCRIPTION: &str = "Allow all outbound traffic by default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    All,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::All => "-1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub protocol: Protocol,
    pub from: u16,
    pub to: u16,
}

impl Port {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from: port,
            to: port,
        }
    }

    pub fn tcp_range(from: u16, to: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from,
            to,
        }
    }

    pub fn covers(&self, port: u16) -> bool {
        self.protocol == Protocol::All || (self.from..=self.to).contains(&port)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::All => write!(f, "all traffic"),
            _ if self.from == self.to => write!(f, "{} {}", self.protocol.as_str(), self.from),
            _ => write!(f, "{} {}-{}", self.protocol.as_str(), self.from, self.to),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    address: Ipv4Addr,
    prefix: u8,
}

impl Peer {
    pub fn any_ipv4() -> Self {
        Self {
            address: Ipv4Addr::UNSPECIFIED,
            prefix: 0,
        }
    }

    pub fn ipv4(cidr: &str) -> Result<Self, SynthError> {
        let network = cidr::parse_network(cidr)?;
        Ok(Self {
            address: network.network(),
            prefix: network.prefix(),
        })
    }

    pub fn is_open_world(&self) -> bool {
        self.prefix == 0
    }

    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub peer: Peer,
    pub port: Port,
    pub description: String,
}

impl IngressRule {
    fn render(&self) -> Value {
        json!({
            "CidrIp": self.peer.cidr(),
            "Description": self.description,
            "FromPort": self.port.from,
            "IpProtocol": self.port.protocol.as_str(),
            "ToPort": self.port.to,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SecurityGroupProps {
    pub vpc_id: Value,
    pub description: String,
    pub allow_all_outbound: bool,
}

#[derive(Debug, Clone)]
pub struct SecurityGroup {
    path: ConstructPath,
    logical_id: String,
    props: SecurityGroupProps,
    ingress: Vec<IngressRule>,
}

impl SecurityGroup {
    pub fn new(
        scope: &ConstructPath,
        id: &str,
        props: SecurityGroupProps,
    ) -> Result<Self, SynthError> {
        let path = scope.child(id)?;
        Ok(Self {
            logical_id: path.logical_id(),
            path,
            props,
            ingress: Vec::new(),
        })
    }

    pub fn add_ingress_rule(
        &mut self,
        peer: Peer,
        port: Port,
        description: impl Into<String>,
    ) -> Result<(), SynthError> {
        if port.from > port.to {
            return Err(SynthError::props(
                "SecurityGroup",
                format!("port range {}-{} is reversed", port.from, port.to),
            ));
        }
        let rule = IngressRule {
            peer,
            port,
            description: description.into(),
        };
        if !self.ingress.contains(&rule) {
            self.ingress.push(rule);
        }
        Ok(())
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn group_id(&self) -> Value {
        get_att(&self.logical_id, "GroupId")
    }

    pub fn ingress_rules(&self) -> &[IngressRule] {
        &self.ingress
    }
}

impl Construct for SecurityGroup {
    fn node_id(&self) -> &str {
        self.path.id()
    }

    fn synthesize(&self, template: &mut Template) -> Result<(), SynthError> {
        let mut resource = Resource::new("AWS::EC2::SecurityGroup")
            .property("GroupDescription", self.props.description.clone())
            .property("VpcId", self.props.vpc_id.clone());

        if self.props.allow_all_outbound {
            resource = resource.property(
                "SecurityGroupEgress",
                json!([{
                    "CidrIp": OPEN_WORLD_IPV4,
                    "Description": DEFAULT_EGRESS_DESCRIPTION,
                    "IpProtocol": Protocol::All.as_str(),
                }]),
            );
        }
        if !self.ingress.is_empty() {
            resource = resource.property(
                "SecurityGroupIngress",
                Value::Array(self.ingress.iter().map(IngressRule::render).collect()),
            );
        }

        template.add_resource(&self.logical_id, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::intrinsic::reference;

    fn group() -> SecurityGroup {
        SecurityGroup::new(
            &ConstructPath::root("TestStack"),
            "DatabaseSecurityGroup",
            SecurityGroupProps {
                vpc_id: reference("Vpc"),
                description: "Security group for Aurora database".to_string(),
                allow_all_outbound: true,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_any_ipv4_peer() {
        let peer = Peer::any_ipv4();
        assert!(peer.is_open_world());
        assert_eq!(peer.cidr(), OPEN_WORLD_IPV4);
        assert_eq!(Peer::ipv4(OPEN_WORLD_IPV4).unwrap(), peer);
        assert!(!Peer::ipv4("10.0.0.0/16").unwrap().is_open_world());
    }

    #[test]
    fn test_render_ingress_and_egress() {
        let mut sg = group();
        sg.add_ingress_rule(Peer::any_ipv4(), Port::tcp(3306), "Allow MySQL access")
            .unwrap();

        let mut template = Template::new(None);
        sg.synthesize(&mut template).unwrap();

        let resource = template.resource(sg.logical_id()).unwrap();
        assert_eq!(resource.resource_type, "AWS::EC2::SecurityGroup");
        assert_eq!(
            resource.get("SecurityGroupIngress").unwrap(),
            &json!([{
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow MySQL access",
                "FromPort": 3306,
                "IpProtocol": "tcp",
                "ToPort": 3306,
            }])
        );
        assert_eq!(
            resource.get("SecurityGroupEgress").unwrap()[0]["IpProtocol"],
            "-1"
        );
    }

    #[test]
    fn test_duplicate_rules_collapse() {
        let mut sg = group();
        for _ in 0..2 {
            sg.add_ingress_rule(Peer::any_ipv4(), Port::tcp(3306), "Allow MySQL access")
                .unwrap();
        }
        assert_eq!(sg.ingress_rules().len(), 1);
    }

    #[test]
    fn test_reversed_port_range_rejected() {
        let mut sg = group();
        assert!(sg
            .add_ingress_rule(Peer::any_ipv4(), Port::tcp_range(5000, 4000), "bad")
            .is_err());
    }

    #[test]
    fn test_port_covers() {
        assert!(Port::tcp(3306).covers(3306));
        assert!(!Port::tcp(3306).covers(3307));
        assert!(Port::tcp_range(3000, 4000).covers(3306));
        assert_eq!(Port::tcp(3306).to_string(), "tcp 3306");
    }

    #[test]
    fn test_no_outbound_omits_egress() {
        let mut props = group().props;
        props.allow_all_outbound = false;
        let sg = SecurityGroup::new(&ConstructPath::root("TestStack"), "Sg", props).unwrap();
        let mut template = Template::new(None);
        sg.synthesize(&mut template).unwrap();
        assert!(template
            .resource("Sg")
            .unwrap()
            .get("SecurityGroupEgress")
            .is_none());
    }
}
