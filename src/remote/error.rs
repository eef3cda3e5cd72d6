//! Errors raised by the remote build path

use super::status::FailureDetails;
use crate::progress::RemoteStep;
use std::time::Duration;
use thiserror::Error;

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// The source archive could not be produced
    #[error("Failed to archive source: {0}")]
    Archive(String),

    /// Upload, finalize or trigger failed; never retried automatically
    #[error("Remote {step} failed{}: {message}", status_suffix(.status))]
    Transfer {
        step: RemoteStep,
        status: Option<u16>,
        message: String,
    },

    /// A single status poll failed; the poll loop recovers from these
    #[error("Status poll failed: {0}")]
    PollTransient(String),

    /// The maximum wait elapsed without a terminal status
    #[error("Deployment '{deployment_id}' did not finish within {}s", .waited.as_secs())]
    Timeout {
        deployment_id: String,
        waited: Duration,
    },

    #[error("Deployment '{}' failed: {}", .0.id, .0.reason)]
    DeploymentFailed(FailureDetails),

    #[error("Deployment '{deployment_id}' was cancelled")]
    Cancelled { deployment_id: String },

    /// The caller cancelled before a deployment was triggered
    #[error("Remote build aborted during {step}")]
    Aborted { step: RemoteStep },

    /// The caller stopped watching; the deployment itself continues remotely
    #[error("Stopped watching deployment '{deployment_id}'")]
    Interrupted { deployment_id: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

impl RemoteError {
    pub fn transfer(step: RemoteStep, message: impl Into<String>) -> Self {
        RemoteError::Transfer {
            step,
            status: None,
            message: message.into(),
        }
    }

    /// Whether the poll loop should keep going after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::PollTransient(_) | RemoteError::Http(_))
    }

    /// User-facing report with remediation hints, when there is one
    pub fn help_message(&self) -> Option<String> {
        match self {
            RemoteError::DeploymentFailed(details) => {
                let mut msg = format!("Deployment {} failed", details.id);
                if let Some(service) = &details.service_name {
                    msg.push_str(&format!(" for service {}", service));
                }
                if let Some(branch) = &details.branch {
                    msg.push_str(&format!(" (branch {})", branch));
                }
                msg.push_str(&format!("\n\nReason: {}\n", details.reason));
                if !details.suggestions.is_empty() {
                    msg.push_str("\nSuggestions:\n");
                    for suggestion in &details.suggestions {
                        msg.push_str(&format!("  - {}\n", suggestion));
                    }
                }
                msg.push_str(&format!(
                    "\nRun 'shipyard status {}' for more details.",
                    details.id
                ));
                Some(msg)
            }
            RemoteError::Timeout { deployment_id, .. }
            | RemoteError::Interrupted { deployment_id } => Some(format!(
                "The deployment may still be running. Run 'shipyard status {}' to check on it.",
                deployment_id
            )),
            RemoteError::Transfer {
                step: RemoteStep::InitUpload,
                status: Some(401) | Some(403),
                ..
            } => Some("Check that SHIPYARD_TOKEN is set to a valid token.".to_string()),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RemoteError::Timeout { .. } => 3,
            RemoteError::Configuration(_) => 2,
            _ => 1,
        }
    }
}
