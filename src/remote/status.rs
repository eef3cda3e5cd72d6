//! Deployment status model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    /// SUCCESS, FAILED and CANCELLED admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "QUEUED",
            DeploymentStatus::Running => "RUNNING",
            DeploymentStatus::Success => "SUCCESS",
            DeploymentStatus::Failed => "FAILED",
            DeploymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a remote status string, case-insensitively, folding known aliases
impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" | "PENDING" | "INITIALIZING" => Ok(DeploymentStatus::Queued),
            "RUNNING" | "BUILDING" | "DEPLOYING" | "IN_PROGRESS" => Ok(DeploymentStatus::Running),
            "SUCCESS" | "SUCCEEDED" | "DEPLOYED" | "COMPLETED" => Ok(DeploymentStatus::Success),
            "FAILED" | "FAILURE" | "ERROR" | "CRASHED" => Ok(DeploymentStatus::Failed),
            "CANCELLED" | "CANCELED" => Ok(DeploymentStatus::Cancelled),
            other => Err(format!("unknown deployment status '{}'", other)),
        }
    }
}

/// A deployment and the last status observed for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub status: DeploymentStatus,
}

impl DeploymentRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: DeploymentStatus::Queued,
        }
    }

    /// Moves to `next`. Once terminal the record is frozen and any different
    /// status is rejected; repeating the terminal status is a no-op.
    pub fn advance(&mut self, next: DeploymentStatus) -> Result<(), String> {
        if self.status.is_terminal() && next != self.status {
            return Err(format!(
                "deployment '{}' is already {}, cannot move to {}",
                self.id, self.status, next
            ));
        }
        self.status = next;
        Ok(())
    }
}

/// Failure report fetched after a FAILED status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetails {
    pub id: String,
    #[serde(default, alias = "serviceName")]
    pub service_name: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl FailureDetails {
    /// Minimal details when the detail endpoint itself could not be read
    pub fn unavailable(id: &str, why: &str) -> Self {
        Self {
            id: id.to_string(),
            service_name: None,
            branch: None,
            reason: format!("deployment failed (details unavailable: {})", why),
            suggestions: Vec::new(),
        }
    }
}
