//! Output formatting for multiple formats
//!
//! Every command result can be rendered as JSON, YAML or human-readable
//! text. Templates are the exception: they only have machine formats.
//!
//! # Example
//!
//! ```no_run
//! use cdk_works::cli::output::{OutputFormat, OutputFormatter};
//! use cdk_works::{StackConfig, StackDefinition};
//!
//! # fn example() -> anyhow::Result<()> {
//! let template = StackDefinition::new(&StackConfig::default())?.synthesize()?;
//! let formatter = OutputFormatter::new(OutputFormat::Yaml);
//! println!("{}", formatter.format_template(&template)?);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};

use crate::assembly::SynthSummary;
use crate::config::StackConfig;
use crate::outputs::{DeployedOutputs, OutputName};
use crate::template::Template;
use crate::validation::RuleOutcome;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";
const PASS: &str = "\u{2713}";
const FAIL: &str = "\u{2717}";

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Renders a template. `Human` falls back to JSON, the template's
    /// native form.
    pub fn format_template(&self, template: &Template) -> Result<String> {
        match self.format {
            OutputFormat::Yaml => template.to_yaml(),
            OutputFormat::Json | OutputFormat::Human => template
                .to_json()
                .context("Failed to serialize template to JSON"),
        }
    }

    pub fn format_synth_summary(&self, summary: &SynthSummary) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary)
                .context("Failed to serialize synthesis summary to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(summary)
                .context("Failed to serialize synthesis summary to YAML"),
            OutputFormat::Human => Ok(self.format_synth_summary_human(summary)),
        }
    }

    pub fn format_validation(&self, outcomes: &[RuleOutcome]) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcomes)
                .context("Failed to serialize validation report to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(outcomes)
                .context("Failed to serialize validation report to YAML"),
            OutputFormat::Human => Ok(self.format_validation_human(outcomes)),
        }
    }

    pub fn format_outputs(&self, outputs: &DeployedOutputs) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outputs)
                .context("Failed to serialize stack outputs to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(outputs)
                .context("Failed to serialize stack outputs to YAML"),
            OutputFormat::Human => Ok(self.format_outputs_human(outputs)),
        }
    }

    pub fn format_config(&self, config: &StackConfig) -> Result<String> {
        let config_map = config.to_display_map();
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&config_map)
                .context("Failed to serialize config to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(&config_map).context("Failed to serialize config to YAML")
            }
            OutputFormat::Human => Ok(self.format_config_human(config)),
        }
    }

    fn format_synth_summary_human(&self, summary: &SynthSummary) -> String {
        let mut output = String::new();
        output.push_str(&format!("{} Synthesized {}\n", PASS, summary.stack_name));
        output.push_str(&format!("  Environment: {}\n", summary.environment));
        output.push_str(&format!("  Template:    {}\n", summary.template_file.display()));
        output.push_str(&format!("  Manifest:    {}\n", summary.manifest_file.display()));
        output.push_str(&format!(
            "  Resources:   {} ({} outputs)\n",
            summary.resources, summary.outputs
        ));
        output.push_str(&format!("  Digest:      {}\n", summary.digest));
        output
    }

    fn format_validation_human(&self, outcomes: &[RuleOutcome]) -> String {
        let mut output = String::new();
        output.push_str("Template Validation\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        for outcome in outcomes {
            let symbol = if outcome.passed { PASS } else { FAIL };
            output.push_str(&format!("{} {}\n", symbol, outcome.rule));
            if let Some(message) = &outcome.message {
                output.push_str(&format!("  {}\n", message));
            }
        }

        let failed = outcomes.iter().filter(|o| !o.passed).count();
        output.push('\n');
        if failed == 0 {
            output.push_str(&format!("All {} rules passed\n", outcomes.len()));
        } else {
            output.push_str(&format!("{} of {} rules failed\n", failed, outcomes.len()));
        }
        output
    }

    fn format_outputs_human(&self, outputs: &DeployedOutputs) -> String {
        let mut output = String::new();
        output.push_str(&format!("Stack Outputs: {}\n", outputs.stack_name));
        output.push_str(RULE);
        output.push_str("\n\n");

        for name in OutputName::ALL {
            let value = outputs.get(name).unwrap_or("(missing)");
            output.push_str(&format!("{}:\n  {}\n", name.description(), value));
        }

        let extra: Vec<&String> = outputs
            .values
            .keys()
            .filter(|k| OutputName::ALL.iter().all(|n| n.as_str() != k.as_str()))
            .collect();
        if !extra.is_empty() {
            output.push_str("\nOther Outputs:\n");
            for key in extra {
                output.push_str(&format!("  {}: {}\n", key, outputs.values[key]));
            }
        }
        output
    }

    fn format_config_human(&self, config: &StackConfig) -> String {
        let mut output = String::new();
        output.push_str("cdk-works Configuration\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        let map = config.to_display_map();
        let mut section = |title: &str, keys: &[(&str, &str)]| {
            output.push_str(&format!("{}:\n", title));
            for (key, label) in keys {
                if let Some(value) = map.get(*key) {
                    output.push_str(&format!("  {}: {}\n", label, value));
                }
            }
            output.push('\n');
        };

        section(
            "Stack",
            &[
                ("stack_name", "Name"),
                ("account", "Account"),
                ("region", "Region"),
            ],
        );
        section(
            "Network",
            &[
                ("vpc_cidr", "VPC CIDR"),
                ("max_azs", "Max AZs"),
                ("subnet_mask", "Subnet Mask"),
                ("nat_gateways", "NAT Gateways"),
            ],
        );
        section(
            "Database",
            &[
                ("engine_profile", "Engine Profile"),
                ("db_instance_type", "Instance Type"),
                ("db_instances", "Instances"),
                ("db_port", "Port"),
                ("db_ingress_cidr", "Ingress CIDR"),
                ("backup_retention_days", "Backup Retention (days)"),
                ("deletion_protection", "Deletion Protection"),
                ("credentials", "Credentials"),
                ("db_username", "Username"),
            ],
        );
        section("Logging", &[("log_level", "Level")]);

        if config.db_ingress_is_open_world() {
            output.push_str(&format!(
                "{} Database port is open to 0.0.0.0/0\n",
                FAIL
            ));
        }
        output
    }
}
