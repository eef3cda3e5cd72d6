//! Logging-based progress handler

use super::{BuildEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &BuildEvent) {
        match event {
            BuildEvent::ChainResolved {
                chain,
                fallback_enabled,
            } => {
                info!(
                    chain = %chain.join(" -> "),
                    fallback = fallback_enabled,
                    "Resolved builder chain"
                );
            }
            BuildEvent::AttemptStarted {
                builder,
                attempt,
                total,
            } => {
                info!(
                    builder = %builder,
                    progress = format!("{}/{}", attempt, total),
                    "Trying builder"
                );
            }
            BuildEvent::AttemptFailed {
                builder,
                error,
                remaining,
                next,
            } => match next {
                Some(next) => warn!(
                    builder = %builder,
                    remaining,
                    next = %next,
                    error = %error,
                    "Builder failed, falling back"
                ),
                None => warn!(
                    builder = %builder,
                    remaining,
                    error = %error,
                    "Builder failed, no builders left"
                ),
            },
            BuildEvent::BuildSucceeded {
                builder,
                artifact_id,
                duration,
            } => {
                info!(
                    builder = %builder,
                    artifact = %artifact_id,
                    duration_ms = duration.as_millis(),
                    "Build complete"
                );
            }
            BuildEvent::RemoteStepStarted { step } => {
                info!(step = %step, "Remote step started");
            }
            BuildEvent::RemoteStepComplete { step, duration } => {
                debug!(
                    step = %step,
                    duration_ms = duration.as_millis(),
                    "Remote step complete"
                );
            }
            BuildEvent::StatusObserved {
                deployment_id,
                status,
            } => {
                debug!(deployment = %deployment_id, status = %status, "Deployment status");
            }
        }
    }
}
