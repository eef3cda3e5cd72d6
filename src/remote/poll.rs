//! Deployment status polling

use super::client::RemoteBuildService;
use super::error::{RemoteError, RemoteResult};
use super::status::{DeploymentRecord, DeploymentStatus, FailureDetails};
use crate::progress::{BuildEvent, ProgressHandler};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

/// Polls a deployment at a fixed interval until it is terminal or the
/// maximum wait elapses
#[derive(Debug, Clone, Copy)]
pub struct StatusPoller {
    interval: Duration,
    max_wait: Duration,
}

impl Default for StatusPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_WAIT)
    }
}

impl StatusPoller {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    /// Returns the final record on SUCCESS.
    ///
    /// FAILED fetches the failure details before erroring, CANCELLED is a
    /// cancellation error and running out of time is a timeout. Failed
    /// status fetches and unknown status strings are logged and polling
    /// continues.
    pub async fn wait(
        &self,
        service: &dyn RemoteBuildService,
        deployment_id: &str,
        cancel: &CancellationToken,
        progress: &dyn ProgressHandler,
    ) -> RemoteResult<DeploymentRecord> {
        let start = Instant::now();
        let mut record = DeploymentRecord::new(deployment_id);
        let mut polls = 0u32;

        loop {
            polls += 1;
            let observed = service.status(deployment_id).await.and_then(|raw| {
                raw.parse::<DeploymentStatus>()
                    .map_err(RemoteError::PollTransient)
            });

            match observed {
                Ok(status) => {
                    progress.on_progress(&BuildEvent::StatusObserved {
                        deployment_id: deployment_id.to_string(),
                        status: status.to_string(),
                    });
                    if let Err(e) = record.advance(status) {
                        warn!(error = %e, "Ignoring status transition");
                    }

                    match record.status {
                        DeploymentStatus::Success => {
                            debug!(deployment = deployment_id, polls, "Deployment succeeded");
                            return Ok(record);
                        }
                        DeploymentStatus::Failed => {
                            let details = match service.details(deployment_id).await {
                                Ok(details) => details,
                                Err(e) => {
                                    warn!(error = %e, "Could not fetch failure details");
                                    FailureDetails::unavailable(deployment_id, &e.to_string())
                                }
                            };
                            return Err(RemoteError::DeploymentFailed(details));
                        }
                        DeploymentStatus::Cancelled => {
                            return Err(RemoteError::Cancelled {
                                deployment_id: deployment_id.to_string(),
                            });
                        }
                        DeploymentStatus::Queued | DeploymentStatus::Running => {}
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(deployment = deployment_id, polls, error = %e, "Status poll failed, retrying");
                }
                Err(e) => return Err(e),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.max_wait {
                return Err(RemoteError::Timeout {
                    deployment_id: deployment_id.to_string(),
                    waited: self.max_wait,
                });
            }

            let pause = self.interval.min(self.max_wait - elapsed);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RemoteError::Interrupted {
                        deployment_id: deployment_id.to_string(),
                    });
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
