use crate::template::Template;
use crate::validation::rules::{
    ClusterIngressRule, ClusterPlacementRule, NoPlaintextCredentialsRule,
    ParameterGroupFamilyRule, ReferenceIntegrityRule, RequiredOutputsRule,
    SingleParameterGroupRule, SubnetLayoutRule, ValidationRule,
};
use anyhow::Result;
use serde::Serialize;
use tracing::debug;

/// Result of one rule, as shown by `cdk-works validate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule: &'static str,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    /// Stops at the first failing rule
    pub fn validate(&self, template: &Template) -> Result<()> {
        for rule in &self.rules {
            if let Err(e) = rule.validate(template) {
                anyhow::bail!("[{}] {}", rule.name(), e);
            }
        }
        Ok(())
    }

    /// Runs every rule and reports each outcome
    pub fn report(&self, template: &Template) -> Vec<RuleOutcome> {
        self.rules
            .iter()
            .map(|rule| {
                let result = rule.validate(template);
                debug!(rule = rule.name(), passed = result.is_ok(), "Validation rule");
                RuleOutcome {
                    rule: rule.name(),
                    passed: result.is_ok(),
                    message: result.err().map(|e| e.to_string()),
                }
            })
            .collect()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(RequiredOutputsRule),
                Box::new(SubnetLayoutRule),
                Box::new(SingleParameterGroupRule),
                Box::new(ParameterGroupFamilyRule),
                Box::new(ClusterIngressRule),
                Box::new(ClusterPlacementRule),
                Box::new(NoPlaintextCredentialsRule),
                Box::new(ReferenceIntegrityRule),
            ],
        }
    }
}
