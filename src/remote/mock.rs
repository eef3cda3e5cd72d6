//! Scripted in-memory remote build service

use super::client::{LogReader, RemoteBuildService, UploadSession};
use super::error::{RemoteError, RemoteResult};
use super::status::FailureDetails;
use crate::progress::RemoteStep;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Plays back scripted status responses and records every protocol call.
///
/// Once the scripted statuses run out the last one repeats.
pub struct MockRemoteService {
    statuses: Mutex<VecDeque<Result<String, String>>>,
    last_status: Mutex<String>,
    details: FailureDetails,
    log_body: String,
    fail_at: Option<RemoteStep>,
    calls: Mutex<Vec<String>>,
    uploaded: Mutex<Option<Vec<u8>>>,
    completed: Mutex<Option<(u64, String)>>,
}

impl Default for MockRemoteService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteService {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            last_status: Mutex::new("QUEUED".to_string()),
            details: FailureDetails::unavailable("dep-mock", "no details scripted"),
            log_body: String::new(),
            fail_at: None,
            calls: Mutex::new(Vec::new()),
            uploaded: Mutex::new(None),
            completed: Mutex::new(None),
        }
    }

    pub fn with_statuses<I, S>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.statuses).extend(statuses.into_iter().map(|s| Ok(s.into())));
        self
    }

    /// Queues a failed status fetch
    pub fn with_poll_error(self, message: impl Into<String>) -> Self {
        lock(&self.statuses).push_back(Err(message.into()));
        self
    }

    pub fn with_details(mut self, details: FailureDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_logs(mut self, body: impl Into<String>) -> Self {
        self.log_body = body.into();
        self
    }

    /// Makes `step` answer with an HTTP 500
    pub fn failing_at(mut self, step: RemoteStep) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Protocol calls made so far, e.g. `init_upload:svc`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn status_polls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.starts_with("status:"))
            .count()
    }

    pub fn uploaded_bytes(&self) -> Option<Vec<u8>> {
        lock(&self.uploaded).clone()
    }

    /// Size and checksum reported at finalize
    pub fn completed_with(&self) -> Option<(u64, String)> {
        lock(&self.completed).clone()
    }

    fn record(&self, step: RemoteStep, call: String) -> RemoteResult<()> {
        lock(&self.calls).push(call);
        if self.fail_at == Some(step) {
            return Err(RemoteError::Transfer {
                step,
                status: Some(500),
                message: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBuildService for MockRemoteService {
    async fn init_upload(&self, service_id: &str) -> RemoteResult<UploadSession> {
        self.record(RemoteStep::InitUpload, format!("init_upload:{}", service_id))?;
        Ok(UploadSession {
            id: "up-mock".to_string(),
            url: "mock://uploads/up-mock".to_string(),
            expires_at: None,
            size: None,
            checksum: None,
        })
    }

    async fn transfer(&self, session: &UploadSession, bytes: Vec<u8>) -> RemoteResult<()> {
        self.record(RemoteStep::Transfer, format!("transfer:{}", session.id))?;
        *lock(&self.uploaded) = Some(bytes);
        Ok(())
    }

    async fn complete_upload(
        &self,
        upload_id: &str,
        size: u64,
        checksum: &str,
    ) -> RemoteResult<()> {
        self.record(RemoteStep::Finalize, format!("complete_upload:{}", upload_id))?;
        *lock(&self.completed) = Some((size, checksum.to_string()));
        Ok(())
    }

    async fn trigger_deploy(&self, upload_id: &str) -> RemoteResult<String> {
        self.record(RemoteStep::Trigger, format!("trigger_deploy:{}", upload_id))?;
        Ok("dep-mock".to_string())
    }

    async fn status(&self, deployment_id: &str) -> RemoteResult<String> {
        lock(&self.calls).push(format!("status:{}", deployment_id));
        match lock(&self.statuses).pop_front() {
            Some(Ok(status)) => {
                *lock(&self.last_status) = status.clone();
                Ok(status)
            }
            Some(Err(message)) => Err(RemoteError::PollTransient(message)),
            None => Ok(lock(&self.last_status).clone()),
        }
    }

    async fn details(&self, deployment_id: &str) -> RemoteResult<FailureDetails> {
        lock(&self.calls).push(format!("details:{}", deployment_id));
        Ok(FailureDetails {
            id: deployment_id.to_string(),
            ..self.details.clone()
        })
    }

    async fn logs(&self, deployment_id: &str) -> RemoteResult<LogReader> {
        self.record(RemoteStep::Observe, format!("logs:{}", deployment_id))?;
        let reader: LogReader = Box::new(std::io::Cursor::new(self.log_body.clone().into_bytes()));
        Ok(reader)
    }
}
