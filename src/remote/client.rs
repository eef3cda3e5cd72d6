//! Remote build service client

use super::error::{RemoteError, RemoteResult};
use super::status::FailureDetails;
use crate::progress::RemoteStep;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Live build log body, framed as described in [`super::sse`]
pub type LogReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// A write destination for one archive. Created per remote build, used once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    #[serde(rename = "upload_id")]
    pub id: String,
    #[serde(rename = "upload_url")]
    pub url: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub size: Option<u64>,
    #[serde(skip)]
    pub checksum: Option<String>,
}

impl UploadSession {
    /// Records what was transferred
    pub fn complete(&mut self, size: u64, checksum: impl Into<String>) {
        self.size = Some(size);
        self.checksum = Some(checksum.into());
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// The remote build service, one method per protocol call
#[async_trait]
pub trait RemoteBuildService: Send + Sync {
    async fn init_upload(&self, service_id: &str) -> RemoteResult<UploadSession>;

    async fn transfer(&self, session: &UploadSession, bytes: Vec<u8>) -> RemoteResult<()>;

    async fn complete_upload(&self, upload_id: &str, size: u64, checksum: &str)
        -> RemoteResult<()>;

    /// Starts a deployment from a finalized upload and returns its id
    async fn trigger_deploy(&self, upload_id: &str) -> RemoteResult<String>;

    /// Raw status string; normalization is the caller's job
    async fn status(&self, deployment_id: &str) -> RemoteResult<String>;

    async fn details(&self, deployment_id: &str) -> RemoteResult<FailureDetails>;

    async fn logs(&self, deployment_id: &str) -> RemoteResult<LogReader>;
}

#[derive(Serialize)]
struct CompleteUploadRequest<'a> {
    size: u64,
    checksum: &'a str,
}

#[derive(Deserialize)]
struct TriggerResponse {
    deployment_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

/// HTTP implementation of [`RemoteBuildService`]
#[derive(Debug, Clone)]
pub struct HttpRemoteService {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpRemoteService {
    /// `timeout` bounds each request except the log stream, which stays open
    /// for as long as the remote build runs
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("shipyard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.filter(|t| !t.is_empty()),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, step: RemoteStep, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::transfer(step, e.to_string()))?;
        check(step, response).await
    }
}

/// Turns a non-2xx response into a transfer error carrying status and body
async fn check(step: RemoteStep, response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    };
    Err(RemoteError::Transfer {
        step,
        status: Some(status.as_u16()),
        message,
    })
}

fn decode_error(step: RemoteStep, e: reqwest::Error) -> RemoteError {
    RemoteError::transfer(step, format!("unreadable response: {}", e))
}

#[async_trait]
impl RemoteBuildService for HttpRemoteService {
    async fn init_upload(&self, service_id: &str) -> RemoteResult<UploadSession> {
        let request = self
            .client
            .post(self.url(&format!("/v1/services/{}/uploads", service_id)))
            .timeout(self.timeout);
        let response = self
            .send(RemoteStep::InitUpload, self.authorized(request))
            .await?;
        let session: UploadSession = response
            .json()
            .await
            .map_err(|e| decode_error(RemoteStep::InitUpload, e))?;
        debug!(upload_id = %session.id, expires_at = ?session.expires_at, "Upload session created");
        Ok(session)
    }

    async fn transfer(&self, session: &UploadSession, bytes: Vec<u8>) -> RemoteResult<()> {
        // The destination is pre-signed; it never sees our token
        let request = self
            .client
            .put(&session.url)
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(bytes);
        self.send(RemoteStep::Transfer, request).await?;
        Ok(())
    }

    async fn complete_upload(
        &self,
        upload_id: &str,
        size: u64,
        checksum: &str,
    ) -> RemoteResult<()> {
        let request = self
            .client
            .post(self.url(&format!("/v1/uploads/{}/complete", upload_id)))
            .timeout(self.timeout)
            .json(&CompleteUploadRequest { size, checksum });
        self.send(RemoteStep::Finalize, self.authorized(request))
            .await?;
        Ok(())
    }

    async fn trigger_deploy(&self, upload_id: &str) -> RemoteResult<String> {
        let request = self
            .client
            .post(self.url(&format!("/v1/uploads/{}/deploy", upload_id)))
            .timeout(self.timeout);
        let response = self
            .send(RemoteStep::Trigger, self.authorized(request))
            .await?;
        let trigger: TriggerResponse = response
            .json()
            .await
            .map_err(|e| decode_error(RemoteStep::Trigger, e))?;
        Ok(trigger.deployment_id)
    }

    async fn status(&self, deployment_id: &str) -> RemoteResult<String> {
        let request = self
            .client
            .get(self.url(&format!("/v1/deployments/{}", deployment_id)))
            .timeout(self.timeout);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RemoteError::PollTransient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RemoteError::PollTransient(format!(
                "status endpoint returned {}",
                response.status()
            )));
        }
        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::PollTransient(e.to_string()))?;
        Ok(status.status)
    }

    async fn details(&self, deployment_id: &str) -> RemoteResult<FailureDetails> {
        let request = self
            .client
            .get(self.url(&format!("/v1/deployments/{}/details", deployment_id)))
            .timeout(self.timeout);
        let response = self
            .send(RemoteStep::Observe, self.authorized(request))
            .await?;
        response
            .json()
            .await
            .map_err(|e| decode_error(RemoteStep::Observe, e))
    }

    async fn logs(&self, deployment_id: &str) -> RemoteResult<LogReader> {
        let request = self
            .client
            .get(self.url(&format!("/v1/deployments/{}/logs", deployment_id)))
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let response = self
            .send(RemoteStep::Observe, self.authorized(request))
            .await?;

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let reader: LogReader = Box::new(StreamReader::new(Box::pin(body)));
        Ok(reader)
    }
}
