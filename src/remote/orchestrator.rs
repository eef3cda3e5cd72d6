//! Remote build orchestration
//!
//! Archive, init-upload, transfer, finalize and trigger run strictly in
//! order. Observe then streams the build log to completion and polls the
//! deployment status; only the poll result decides success.

use super::archive::{create_archive, SourceArchive};
use super::client::{RemoteBuildService, UploadSession};
use super::error::{RemoteError, RemoteResult};
use super::poll::StatusPoller;
use super::sse::forward_logs;
use super::status::DeploymentRecord;
use crate::progress::{BuildEvent, ProgressHandler, RemoteStep};
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a finished remote build reports back
#[derive(Debug, Clone, Serialize)]
pub struct RemoteDeployment {
    pub deployment_id: String,
    pub service_id: String,
    pub upload_id: String,
    pub archive_size: u64,
    pub archive_checksum: String,
    pub archive_files: usize,
    pub log_lines: usize,
    pub status: String,
}

pub struct RemoteBuildOrchestrator {
    service: Arc<dyn RemoteBuildService>,
    poller: StatusPoller,
    progress: Arc<dyn ProgressHandler>,
}

impl RemoteBuildOrchestrator {
    pub fn new(
        service: Arc<dyn RemoteBuildService>,
        poller: StatusPoller,
        progress: Arc<dyn ProgressHandler>,
    ) -> Self {
        Self {
            service,
            poller,
            progress,
        }
    }

    async fn step<T, F>(&self, cancel: &CancellationToken, step: RemoteStep, work: F) -> RemoteResult<T>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        self.progress
            .on_progress(&BuildEvent::RemoteStepStarted { step });
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RemoteError::Aborted { step }),
            result = work => result,
        };

        if result.is_ok() {
            self.progress.on_progress(&BuildEvent::RemoteStepComplete {
                step,
                duration: start.elapsed(),
            });
        }
        result
    }

    /// Builds `source` remotely for `service_id`, writing build logs to `sink`
    pub async fn run<W>(
        &self,
        cancel: &CancellationToken,
        source: &Path,
        service_id: &str,
        sink: &mut W,
    ) -> RemoteResult<RemoteDeployment>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if service_id.trim().is_empty() {
            return Err(RemoteError::Configuration(
                "a service id is required for remote builds".to_string(),
            ));
        }

        let root: PathBuf = source.to_path_buf();
        let archive: SourceArchive = self
            .step(cancel, RemoteStep::Archive, async move {
                tokio::task::spawn_blocking(move || create_archive(&root))
                    .await
                    .map_err(|e| RemoteError::Archive(e.to_string()))?
            })
            .await?;
        info!(
            files = archive.file_count,
            bytes = archive.size(),
            "Archived source"
        );

        let mut session: UploadSession = self
            .step(cancel, RemoteStep::InitUpload, self.service.init_upload(service_id))
            .await?;
        if session.is_expired(Utc::now()) {
            warn!(upload_id = %session.id, "Upload session is already expired");
        }

        let size = archive.size();
        let checksum = archive.checksum.clone();
        self.step(
            cancel,
            RemoteStep::Transfer,
            self.service.transfer(&session, archive.bytes),
        )
        .await?;

        self.step(
            cancel,
            RemoteStep::Finalize,
            self.service.complete_upload(&session.id, size, &checksum),
        )
        .await?;
        session.complete(size, checksum.clone());
        debug!(upload_id = %session.id, size, checksum = %checksum, "Upload finalized");

        let deployment_id = self
            .step(cancel, RemoteStep::Trigger, self.service.trigger_deploy(&session.id))
            .await?;
        info!(deployment = %deployment_id, "Deployment triggered");

        self.progress.on_progress(&BuildEvent::RemoteStepStarted {
            step: RemoteStep::Observe,
        });
        let observe_start = Instant::now();

        let log_lines = self.follow_logs(cancel, &deployment_id, sink).await;
        let record: DeploymentRecord = self
            .poller
            .wait(
                self.service.as_ref(),
                &deployment_id,
                cancel,
                self.progress.as_ref(),
            )
            .await?;

        self.progress.on_progress(&BuildEvent::RemoteStepComplete {
            step: RemoteStep::Observe,
            duration: observe_start.elapsed(),
        });
        info!(deployment = %deployment_id, status = %record.status, "Deployment finished");

        Ok(RemoteDeployment {
            deployment_id,
            service_id: service_id.to_string(),
            upload_id: session.id,
            archive_size: size,
            archive_checksum: checksum,
            archive_files: archive.file_count,
            log_lines,
            status: record.status.to_string(),
        })
    }

    /// Streams logs to completion. Stream failures are logged, never fatal.
    async fn follow_logs<W>(&self, cancel: &CancellationToken, deployment_id: &str, sink: &mut W) -> usize
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let reader = match self.service.logs(deployment_id).await {
            Ok(reader) => reader,
            Err(e) => {
                warn!(deployment = deployment_id, error = %e, "Could not open build log stream");
                return 0;
            }
        };

        let mut delivered = 0;
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = forward_logs(reader, sink, &mut delivered) => {
                if let Err(e) = result {
                    warn!(
                        deployment = deployment_id,
                        delivered,
                        error = %e,
                        "Build log stream broke off"
                    );
                }
            }
        }
        delivered
    }
}
