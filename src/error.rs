use thiserror::Error;

/// Errors raised while declaring constructs or rendering the template.
///
/// Everything the cloud side could reject (quotas, permissions, API
/// failures) is the provisioning engine's concern and never shows up here.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("Invalid CIDR block '{cidr}': {reason}")]
    InvalidCidr { cidr: String, reason: String },

    #[error("VPC CIDR {vpc_cidr} has no room for subnet #{index} (/{mask})")]
    CidrExhausted {
        vpc_cidr: String,
        mask: u8,
        index: usize,
    },

    #[error(
        "Parameter group family '{group_family}' does not match engine {engine_version} (family '{engine_family}')"
    )]
    IncompatibleParameterGroup {
        group_family: String,
        engine_version: String,
        engine_family: String,
    },

    #[error("Invalid construct id '{0}': ids must contain at least one alphanumeric character and no '/'")]
    InvalidConstructId(String),

    #[error("Duplicate logical id '{0}' in template")]
    DuplicateLogicalId(String),

    #[error("Invalid {construct} properties: {reason}")]
    InvalidProps {
        construct: &'static str,
        reason: String,
    },

    #[error("Failed to serialize template: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthError {
    pub(crate) fn props(construct: &'static str, reason: impl Into<String>) -> Self {
        SynthError::InvalidProps {
            construct,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_exhausted_message() {
        let err = SynthError::CidrExhausted {
            vpc_cidr: "10.0.0.0/23".to_string(),
            mask: 24,
            index: 2,
        };
        assert_eq!(
            err.to_string(),
            "VPC CIDR 10.0.0.0/23 has no room for subnet #2 (/24)"
        );
    }

    #[test]
    fn test_props_helper() {
        let err = SynthError::props("DatabaseCluster", "instances must be at least 1");
        assert!(err.to_string().contains("DatabaseCluster"));
        assert!(err.to_string().contains("at least 1"));
    }
}
