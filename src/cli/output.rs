//! Output formatting for build plans, build results and remote deployments
//!
//! Every report renders as JSON, YAML or human-readable text.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::artifact::Artifact;
use crate::config::ShipyardConfig;
use crate::remote::{FailureDetails, RemoteDeployment};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format
    Yaml,
    /// Human-readable formatted text
    Human,
}

/// What a `--dry-run` build would do
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub path: String,
    pub app: String,
    pub chain: Vec<String>,
    pub reason: String,
    pub fallback_enabled: bool,
    pub remote: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub deployer: String,
}

/// Outcome of a local build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub app: String,
    pub builder: String,
    pub attempts: usize,
    pub deployed: bool,
    pub artifact: Artifact,
}

/// Current state of a remote deployment
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub deployment_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<FailureDetails>,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn format_plan(&self, plan: &BuildPlan) -> Result<String> {
        self.structured(plan, "build plan")
            .unwrap_or_else(|| Ok(plan_human(plan)))
    }

    pub fn format_build(&self, report: &BuildReport) -> Result<String> {
        self.structured(report, "build report")
            .unwrap_or_else(|| Ok(build_human(report)))
    }

    pub fn format_remote(&self, deployment: &RemoteDeployment) -> Result<String> {
        self.structured(deployment, "remote deployment")
            .unwrap_or_else(|| Ok(remote_human(deployment)))
    }

    pub fn format_status(&self, report: &StatusReport) -> Result<String> {
        self.structured(report, "deployment status")
            .unwrap_or_else(|| Ok(status_human(report)))
    }

    pub fn format_config(&self, config: &ShipyardConfig) -> Result<String> {
        let map = config.to_display_map();
        self.structured(&map, "config")
            .unwrap_or_else(|| Ok(config.to_string()))
    }

    /// JSON or YAML rendering; `None` for human output
    fn structured<T: Serialize>(&self, value: &T, what: &str) -> Option<Result<String>> {
        match self.format {
            OutputFormat::Json => Some(
                serde_json::to_string_pretty(value)
                    .with_context(|| format!("Failed to serialize {} to JSON", what)),
            ),
            OutputFormat::Yaml => Some(
                serde_yaml::to_string(value)
                    .with_context(|| format!("Failed to serialize {} to YAML", what)),
            ),
            OutputFormat::Human => None,
        }
    }
}

fn header(output: &mut String, title: &str) {
    output.push_str(title);
    output.push('\n');
    output.push_str(RULE);
    output.push_str("\n\n");
}

fn plan_human(plan: &BuildPlan) -> String {
    let mut output = String::new();
    header(&mut output, "Build Plan (dry run)");

    output.push_str(&format!("Application:  {}\n", plan.app));
    output.push_str(&format!("Source:       {}\n", plan.path));
    output.push_str(&format!("Detection:    {}\n\n", plan.reason));

    if plan.remote {
        output.push_str(&format!(
            "Remote build for service {}\n",
            plan.service.as_deref().unwrap_or("(not set)")
        ));
        return output;
    }

    output.push_str("Builder Chain:\n");
    for (i, builder) in plan.chain.iter().enumerate() {
        let connector = if i + 1 == plan.chain.len() {
            "\u{2514}"
        } else {
            "\u{251C}"
        };
        output.push_str(&format!("{}\u{2500} {}. {}\n", connector, i + 1, builder));
    }
    output.push('\n');
    output.push_str(&format!(
        "Fallback:     {}\n",
        if plan.fallback_enabled {
            "enabled"
        } else {
            "disabled"
        }
    ));
    output.push_str(&format!("Deployer:     {}\n", plan.deployer));
    output
}

fn build_human(report: &BuildReport) -> String {
    let mut output = String::new();
    header(&mut output, "\u{2713} Build Succeeded");

    let artifact = &report.artifact;
    output.push_str(&format!("Application:  {}\n", report.app));
    output.push_str(&format!(
        "Builder:      {} (attempt {})\n",
        report.builder, report.attempts
    ));
    output.push_str(&format!("Artifact:     {}\n", artifact.id));
    output.push_str(&format!("Image:        {}\n", artifact.image));
    if artifact.exposed_ports.is_empty() {
        output.push_str("Ports:        (none detected)\n");
    } else {
        let ports: Vec<String> = artifact
            .exposed_ports
            .iter()
            .map(|p| p.to_string())
            .collect();
        output.push_str(&format!("Ports:        {}\n", ports.join(", ")));
    }
    if report.deployed {
        output.push_str("Deployed:     yes\n");
    }
    output
}

fn remote_human(deployment: &RemoteDeployment) -> String {
    let mut output = String::new();
    header(&mut output, "\u{2713} Remote Deployment Succeeded");

    output.push_str(&format!("Deployment:   {}\n", deployment.deployment_id));
    output.push_str(&format!("Service:      {}\n", deployment.service_id));
    output.push_str(&format!("Status:       {}\n\n", deployment.status));
    output.push_str("Upload:\n");
    output.push_str(&format!("\u{251C}\u{2500} Id:       {}\n", deployment.upload_id));
    output.push_str(&format!(
        "\u{251C}\u{2500} Files:    {}\n",
        deployment.archive_files
    ));
    output.push_str(&format!(
        "\u{251C}\u{2500} Size:     {} bytes\n",
        deployment.archive_size
    ));
    output.push_str(&format!(
        "\u{2514}\u{2500} SHA-256:  {}\n",
        deployment.archive_checksum
    ));
    output
}

fn status_human(report: &StatusReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Deployment {}: {}\n",
        report.deployment_id, report.status
    ));
    if let Some(details) = &report.details {
        if let Some(service) = &details.service_name {
            output.push_str(&format!("  Service: {}\n", service));
        }
        if let Some(branch) = &details.branch {
            output.push_str(&format!("  Branch: {}\n", branch));
        }
        output.push_str(&format!("  Reason: {}\n", details.reason));
        if !details.suggestions.is_empty() {
            output.push_str("  Suggestions:\n");
            for suggestion in &details.suggestions {
                output.push_str(&format!("    - {}\n", suggestion));
            }
        }
    }
    output
}
