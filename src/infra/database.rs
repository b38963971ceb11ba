//! Aurora MySQL database cluster construct
//!
//! Renders the DB subnet group, the cluster, its instances and, for the
//! generated-secret credential policy, the Secrets Manager secret plus its
//! target attachment.
//!
//! Credential material never passes through this crate. The cluster's
//! username and password are dynamic references that the engine resolves
//! against Secrets Manager at deploy time.

use super::engine::{AuroraMysqlEngineVersion, ParameterGroup, ENGINE_NAME};
use super::network::{SubnetType, Vpc};
use super::security::SecurityGroup;
use super::Construct;
use crate::error::SynthError;
use crate::template::intrinsic::{get_att, reference, secrets_manager_field, select, split};
use crate::template::{ConstructPath, RemovalPolicy, Resource, Template};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_MASTER_USERNAME: &str = "admin";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_INSTANCES: u8 = 1;
pub const DEFAULT_BACKUP_RETENTION_DAYS: u16 = 7;

const MAX_BACKUP_RETENTION_DAYS: u16 = 35;
const MAX_INSTANCES: u8 = 16;
const PASSWORD_LENGTH: u32 = 30;
const PASSWORD_EXCLUDED_CHARACTERS: &str = " %+~`#$&*()|[]{}:;<>?!'/@\"\\";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceClass {
    T3,
    T4g,
    R5,
    R6g,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceSize {
    Small,
    Medium,
    Large,
    Xlarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceType {
    pub class: InstanceClass,
    pub size: InstanceSize,
}

impl InstanceType {
    pub fn of(class: InstanceClass, size: InstanceSize) -> Self {
        Self { class, size }
    }
}

impl Default for InstanceType {
    fn default() -> Self {
        Self::of(InstanceClass::T3, InstanceSize::Medium)
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.class {
            InstanceClass::T3 => "t3",
            InstanceClass::T4g => "t4g",
            InstanceClass::R5 => "r5",
            InstanceClass::R6g => "r6g",
        };
        let size = match self.size {
            InstanceSize::Small => "small",
            InstanceSize::Medium => "medium",
            InstanceSize::Large => "large",
            InstanceSize::Xlarge => "xlarge",
        };
        write!(f, "db.{}.{}", class, size)
    }
}

impl FromStr for InstanceType {
    type Err = String;

    /// Accepts `t3.medium` or `db.t3.medium`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let trimmed = lower.strip_prefix("db.").unwrap_or(&lower);
        let (class, size) = trimmed
            .split_once('.')
            .ok_or_else(|| format!("Invalid instance type: {}. Expected <class>.<size>", s))?;
        let class = match class {
            "t3" => InstanceClass::T3,
            "t4g" => InstanceClass::T4g,
            "r5" => InstanceClass::R5,
            "r6g" => InstanceClass::R6g,
            other => return Err(format!("Unsupported instance class: {}", other)),
        };
        let size = match size {
            "small" => InstanceSize::Small,
            "medium" => InstanceSize::Medium,
            "large" => InstanceSize::Large,
            "xlarge" => InstanceSize::Xlarge,
            other => return Err(format!("Unsupported instance size: {}", other)),
        };
        Ok(Self::of(class, size))
    }
}

/// How the master credentials are created and stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum CredentialPolicy {
    /// A stack-owned Secrets Manager secret with a generated password
    GeneratedSecret { username: String },
    /// RDS creates and rotates the secret itself; the stack owns no secret
    RdsManaged { username: String },
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        CredentialPolicy::GeneratedSecret {
            username: DEFAULT_MASTER_USERNAME.to_string(),
        }
    }
}

impl CredentialPolicy {
    pub fn username(&self) -> &str {
        match self {
            CredentialPolicy::GeneratedSecret { username }
            | CredentialPolicy::RdsManaged { username } => username,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CredentialPolicy::GeneratedSecret { .. } => "generated-secret",
            CredentialPolicy::RdsManaged { .. } => "rds-managed",
        }
    }
}

/// Opaque handle to the generated credentials secret.
///
/// Only exposes deploy-time references; there is no way to obtain the
/// secret's contents from it.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretRef {
    logical_id: String,
    attachment_id: String,
}

impl SecretRef {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn arn(&self) -> Value {
        reference(&self.logical_id)
    }

    /// Secret name, taken from the seventh field of the secret ARN
    /// (`arn:aws:secretsmanager:<region>:<account>:secret:<name>`).
    pub fn secret_name(&self) -> Value {
        select(6, split(":", self.arn()))
    }

    fn resolve(&self, field: &str) -> Value {
        secrets_manager_field(self.arn(), field)
    }
}

impl fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretRef({})", self.logical_id)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseClusterProps {
    pub engine: AuroraMysqlEngineVersion,
    pub instance_type: InstanceType,
    pub instances: u8,
    pub port: u16,
    pub credentials: CredentialPolicy,
    pub backup_retention_days: u16,
    pub deletion_protection: bool,
    pub subnet_type: SubnetType,
}

impl DatabaseClusterProps {
    pub fn new(engine: AuroraMysqlEngineVersion) -> Self {
        Self {
            engine,
            instance_type: InstanceType::default(),
            instances: DEFAULT_INSTANCES,
            port: DEFAULT_PORT,
            credentials: CredentialPolicy::default(),
            backup_retention_days: DEFAULT_BACKUP_RETENTION_DAYS,
            deletion_protection: true,
            subnet_type: SubnetType::PrivateWithEgress,
        }
    }

    fn validate(&self) -> Result<(), SynthError> {
        if self.instances == 0 || self.instances > MAX_INSTANCES {
            return Err(SynthError::props(
                "DatabaseCluster",
                format!(
                    "instances must be between 1 and {}, got {}",
                    MAX_INSTANCES, self.instances
                ),
            ));
        }
        if self.backup_retention_days == 0
            || self.backup_retention_days > MAX_BACKUP_RETENTION_DAYS
        {
            return Err(SynthError::props(
                "DatabaseCluster",
                format!(
                    "backup retention must be between 1 and {} days, got {}",
                    MAX_BACKUP_RETENTION_DAYS, self.backup_retention_days
                ),
            ));
        }
        if self.port == 0 {
            return Err(SynthError::props("DatabaseCluster", "port cannot be 0"));
        }
        if self.credentials.username().is_empty() {
            return Err(SynthError::props(
                "DatabaseCluster",
                "master username cannot be empty",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseCluster {
    path: ConstructPath,
    logical_id: String,
    subnet_group_id: String,
    instance_ids: Vec<String>,
    props: DatabaseClusterProps,
    parameter_group: Value,
    subnet_ids: Vec<Value>,
    security_group_ids: Vec<Value>,
    secret: Option<SecretRef>,
}

impl DatabaseCluster {
    pub fn new(
        scope: &ConstructPath,
        id: &str,
        props: DatabaseClusterProps,
        vpc: &Vpc,
        security_groups: &[&SecurityGroup],
        parameter_group: &ParameterGroup,
    ) -> Result<Self, SynthError> {
        props.validate()?;
        parameter_group.ensure_compatible(props.engine)?;

        let subnets = vpc.select_subnets(props.subnet_type);
        if subnets.len() < 2 {
            return Err(SynthError::props(
                "DatabaseCluster",
                format!(
                    "needs {} subnets in at least 2 availability zones, found {}",
                    props.subnet_type,
                    subnets.len()
                ),
            ));
        }

        let path = scope.child(id)?;
        let instance_ids = (1..=props.instances)
            .map(|n| path.child(&format!("Instance{}", n)).map(|p| p.logical_id()))
            .collect::<Result<Vec<_>, _>>()?;

        let secret = match props.credentials {
            CredentialPolicy::GeneratedSecret { .. } => {
                let secret_path = path.child("Secret")?;
                Some(SecretRef {
                    logical_id: secret_path.child("Resource")?.logical_id(),
                    attachment_id: secret_path.child("Attachment")?.logical_id(),
                })
            }
            CredentialPolicy::RdsManaged { .. } => None,
        };

        Ok(Self {
            logical_id: path.child("Resource")?.logical_id(),
            subnet_group_id: path.child("Subnets")?.logical_id(),
            instance_ids,
            parameter_group: parameter_group.group_name(),
            subnet_ids: subnets.iter().map(|s| s.subnet_id()).collect(),
            security_group_ids: security_groups.iter().map(|sg| sg.group_id()).collect(),
            secret,
            path,
            props,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn props(&self) -> &DatabaseClusterProps {
        &self.props
    }

    pub fn instance_count(&self) -> usize {
        self.instance_ids.len()
    }

    /// Writer endpoint hostname
    pub fn cluster_endpoint(&self) -> Value {
        get_att(&self.logical_id, "Endpoint.Address")
    }

    /// Reader endpoint hostname. With a single instance it resolves to the
    /// writer.
    pub fn cluster_read_endpoint(&self) -> Value {
        get_att(&self.logical_id, "ReadEndpoint.Address")
    }

    pub fn secret(&self) -> Option<&SecretRef> {
        self.secret.as_ref()
    }

    fn render_secret(&self, secret: &SecretRef, template: &mut Template) -> Result<(), SynthError> {
        let username_template = json!({ "username": self.props.credentials.username() });

        template.add_resource(
            &secret.logical_id,
            Resource::new("AWS::SecretsManager::Secret")
                .property(
                    "Description",
                    format!(
                        "Generated by cdk-works for stack: {}",
                        self.path.stack_name()
                    ),
                )
                .property(
                    "GenerateSecretString",
                    json!({
                        "ExcludeCharacters": PASSWORD_EXCLUDED_CHARACTERS,
                        "GenerateStringKey": "password",
                        "PasswordLength": PASSWORD_LENGTH,
                        "SecretStringTemplate": username_template.to_string(),
                    }),
                )
                .removal_policy(RemovalPolicy::Delete),
        )?;

        template.add_resource(
            &secret.attachment_id,
            Resource::new("AWS::SecretsManager::SecretTargetAttachment")
                .property("SecretId", secret.arn())
                .property("TargetId", reference(&self.logical_id))
                .property("TargetType", "AWS::RDS::DBCluster"),
        )
    }

    fn render_cluster(&self, template: &mut Template) -> Result<(), SynthError> {
        let mut cluster = Resource::new("AWS::RDS::DBCluster")
            .property("BackupRetentionPeriod", self.props.backup_retention_days)
            .property("CopyTagsToSnapshot", true)
            .property("DBClusterParameterGroupName", self.parameter_group.clone())
            .property("DBSubnetGroupName", reference(&self.subnet_group_id))
            .property("DeletionProtection", self.props.deletion_protection)
            .property("Engine", ENGINE_NAME)
            .property("EngineVersion", self.props.engine.full_version())
            .property("Port", self.props.port)
            .property("VpcSecurityGroupIds", self.security_group_ids.clone())
            .removal_policy(RemovalPolicy::Snapshot);

        cluster = match (&self.props.credentials, &self.secret) {
            (CredentialPolicy::GeneratedSecret { .. }, Some(secret)) => cluster
                .property("MasterUsername", secret.resolve("username"))
                .property("MasterUserPassword", secret.resolve("password")),
            (credentials, _) => cluster
                .property("ManageMasterUserPassword", true)
                .property("MasterUsername", credentials.username()),
        };

        template.add_resource(&self.logical_id, cluster)
    }
}

impl Construct for DatabaseCluster {
    fn node_id(&self) -> &str {
        self.path.id()
    }

    fn synthesize(&self, template: &mut Template) -> Result<(), SynthError> {
        template.add_resource(
            &self.subnet_group_id,
            Resource::new("AWS::RDS::DBSubnetGroup")
                .property(
                    "DBSubnetGroupDescription",
                    format!("Subnets for {} database", self.path.id()),
                )
                .property("SubnetIds", self.subnet_ids.clone()),
        )?;

        if let Some(secret) = &self.secret {
            self.render_secret(secret, template)?;
        }
        self.render_cluster(template)?;

        for instance_id in &self.instance_ids {
            template.add_resource(
                instance_id,
                Resource::new("AWS::RDS::DBInstance")
                    .property("DBClusterIdentifier", reference(&self.logical_id))
                    .property("DBInstanceClass", self.props.instance_type.to_string())
                    .property("DBSubnetGroupName", reference(&self.subnet_group_id))
                    .property("Engine", ENGINE_NAME)
                    .property(
                        "PubliclyAccessible",
                        self.props.subnet_type.is_public(),
                    )
                    .removal_policy(RemovalPolicy::Delete),
            )?;
        }

        debug!(
            cluster = %self.path,
            engine = %self.props.engine,
            instances = self.instance_ids.len(),
            "Rendered database cluster"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::engine::EngineProfile;
    use crate::infra::network::VpcProps;
    use crate::infra::security::SecurityGroupProps;
    use crate::template::intrinsic::{as_get_att, as_reference};

    struct Fixture {
        scope: ConstructPath,
        vpc: Vpc,
        sg: SecurityGroup,
        group: ParameterGroup,
    }

    fn fixture(profile: EngineProfile) -> Fixture {
        let scope = ConstructPath::root("TestStack");
        let vpc = Vpc::new(&scope, "TestVPC", VpcProps::default()).unwrap();
        let sg = SecurityGroup::new(
            &scope,
            "DatabaseSecurityGroup",
            SecurityGroupProps {
                vpc_id: vpc.vpc_id(),
                description: "sg".to_string(),
                allow_all_outbound: true,
            },
        )
        .unwrap();
        let group = profile.parameter_group(&scope).unwrap();
        Fixture {
            scope,
            vpc,
            sg,
            group,
        }
    }

    fn cluster(f: &Fixture, props: DatabaseClusterProps) -> Result<DatabaseCluster, SynthError> {
        DatabaseCluster::new(&f.scope, "AuroraCluster", props, &f.vpc, &[&f.sg], &f.group)
    }

    fn render(cluster: &DatabaseCluster) -> Template {
        let mut template = Template::new(None);
        cluster.synthesize(&mut template).unwrap();
        template
    }

    #[test]
    fn test_default_cluster_resources() {
        let f = fixture(EngineProfile::MysqlV2);
        let cluster = cluster(&f, DatabaseClusterProps::new(AuroraMysqlEngineVersion::V2_11_2))
            .unwrap();
        let template = render(&cluster);

        assert_eq!(template.count_of_type("AWS::RDS::DBCluster"), 1);
        assert_eq!(template.count_of_type("AWS::RDS::DBInstance"), 1);
        assert_eq!(template.count_of_type("AWS::RDS::DBSubnetGroup"), 1);
        assert_eq!(template.count_of_type("AWS::SecretsManager::Secret"), 1);
        assert_eq!(
            template.count_of_type("AWS::SecretsManager::SecretTargetAttachment"),
            1
        );

        let resource = template.resource(cluster.logical_id()).unwrap();
        assert_eq!(resource.get("Port").unwrap(), 3306);
        assert_eq!(resource.get("BackupRetentionPeriod").unwrap(), 7);
        assert_eq!(resource.get("DeletionProtection").unwrap(), true);
        assert_eq!(
            resource.get("EngineVersion").unwrap(),
            "5.7.mysql_aurora.2.11.2"
        );
        assert_eq!(
            as_reference(resource.get("DBClusterParameterGroupName").unwrap()),
            Some(f.group.logical_id())
        );
        assert_eq!(resource.deletion_policy, Some(RemovalPolicy::Snapshot));
    }

    #[test]
    fn test_subnet_group_uses_private_subnets() {
        let f = fixture(EngineProfile::MysqlV2);
        let cluster = cluster(&f, DatabaseClusterProps::new(AuroraMysqlEngineVersion::V2_11_2))
            .unwrap();
        let template = render(&cluster);

        let (_, group) = template
            .resources_of_type("AWS::RDS::DBSubnetGroup")
            .next()
            .unwrap();
        let ids: Vec<&str> = group.get("SubnetIds").unwrap().as_array().unwrap()
            .iter()
            .filter_map(as_reference)
            .collect();
        let expected: Vec<&str> = f.vpc.private_subnets().iter().map(|s| s.logical_id()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_password_is_dynamic_reference() {
        let f = fixture(EngineProfile::MysqlV2);
        let cluster = cluster(&f, DatabaseClusterProps::new(AuroraMysqlEngineVersion::V2_11_2))
            .unwrap();
        let template = render(&cluster);
        let resource = template.resource(cluster.logical_id()).unwrap();

        let password = resource.get("MasterUserPassword").unwrap().to_string();
        assert!(password.contains("{{resolve:secretsmanager:"));
        assert!(password.contains(":SecretString:password::}}"));

        let secret = cluster.secret().unwrap();
        assert_eq!(format!("{:?}", secret), format!("SecretRef({})", secret.logical_id()));
    }

    #[test]
    fn test_rds_managed_credentials_have_no_secret() {
        let f = fixture(EngineProfile::MysqlV2);
        let mut props = DatabaseClusterProps::new(AuroraMysqlEngineVersion::V2_11_2);
        props.credentials = CredentialPolicy::RdsManaged {
            username: "admin".to_string(),
        };
        let cluster = cluster(&f, props).unwrap();
        assert!(cluster.secret().is_none());

        let template = render(&cluster);
        assert_eq!(template.count_of_type("AWS::SecretsManager::Secret"), 0);
        let resource = template.resource(cluster.logical_id()).unwrap();
        assert_eq!(resource.get("ManageMasterUserPassword").unwrap(), true);
        assert!(resource.get("MasterUserPassword").is_none());
    }

    #[test]
    fn test_endpoints() {
        let f = fixture(EngineProfile::MysqlV2);
        let cluster = cluster(&f, DatabaseClusterProps::new(AuroraMysqlEngineVersion::V2_11_2))
            .unwrap();
        assert_eq!(
            as_get_att(&cluster.cluster_endpoint()),
            Some((cluster.logical_id(), "Endpoint.Address"))
        );
        assert_eq!(
            as_get_att(&cluster.cluster_read_endpoint()),
            Some((cluster.logical_id(), "ReadEndpoint.Address"))
        );
    }

    #[test]
    fn test_engine_group_mismatch_rejected() {
        let f = fixture(EngineProfile::MysqlV3);
        let err = cluster(&f, DatabaseClusterProps::new(AuroraMysqlEngineVersion::V2_11_2))
            .unwrap_err();
        assert!(matches!(err, SynthError::IncompatibleParameterGroup { .. }));
    }

    #[test]
    fn test_invalid_props_rejected() {
        let f = fixture(EngineProfile::MysqlV2);
        let base = DatabaseClusterProps::new(AuroraMysqlEngineVersion::V2_11_2);

        let mut props = base.clone();
        props.instances = 0;
        assert!(cluster(&f, props).is_err());

        let mut props = base.clone();
        props.backup_retention_days = 36;
        assert!(cluster(&f, props).is_err());

        let mut props = base;
        props.subnet_type = SubnetType::PrivateIsolated;
        assert!(cluster(&f, props).is_err());
    }

    #[test]
    fn test_instance_type_parsing() {
        assert_eq!(InstanceType::default().to_string(), "db.t3.medium");
        assert_eq!(
            "db.r6g.large".parse::<InstanceType>().unwrap(),
            InstanceType::of(InstanceClass::R6g, InstanceSize::Large)
        );
        assert_eq!(
            "T3.Medium".parse::<InstanceType>().unwrap(),
            InstanceType::default()
        );
        assert!("m5".parse::<InstanceType>().is_err());
        assert!("db.x1.medium".parse::<InstanceType>().is_err());
    }
}
