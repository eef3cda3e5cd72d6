//! Build log stream parsing
//!
//! Events are `event: <name>` plus `data: <json>` lines, terminated by a
//! blank line. A `data:` line without a preceding `event:` is a `log` event.

use super::error::RemoteResult;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

const DEFAULT_EVENT: &str = "log";

#[derive(Debug, Deserialize)]
struct LogPayload {
    message: String,
    #[serde(default)]
    stream: Option<String>,
}

/// Copies log messages from `reader` into `sink` until `event: end` or EOF.
///
/// Malformed payloads, including lines that are not valid UTF-8, are skipped.
/// Returns the number of lines written.
pub async fn stream_logs<R, W>(reader: R, sink: &mut W) -> RemoteResult<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut delivered = 0;
    forward_logs(reader, sink, &mut delivered).await?;
    Ok(delivered)
}

/// Like [`stream_logs`], counting delivered lines into `delivered` so the
/// count survives a stream that breaks off or is dropped midway.
pub async fn forward_logs<R, W>(
    mut reader: R,
    sink: &mut W,
    delivered: &mut usize,
) -> RemoteResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut event = DEFAULT_EVENT.to_string();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let raw = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "Skipping log line that is not valid UTF-8");
                continue;
            }
        };

        if line.is_empty() {
            event = DEFAULT_EVENT.to_string();
            continue;
        }
        if line.starts_with(':') {
            continue;
        }

        if let Some(name) = field(line, "event") {
            if name == "end" {
                debug!(delivered = *delivered, "Log stream ended");
                sink.flush().await?;
                return Ok(());
            }
            event = name.to_string();
            continue;
        }

        let Some(data) = field(line, "data") else {
            continue;
        };

        match event.as_str() {
            "log" => match serde_json::from_str::<LogPayload>(data) {
                Ok(payload) => {
                    sink.write_all(payload.message.as_bytes()).await?;
                    sink.write_all(b"\n").await?;
                    *delivered += 1;
                    if payload.stream.as_deref() == Some("stderr") {
                        debug!(message = %payload.message, "Remote stderr");
                    }
                }
                Err(e) => debug!(error = %e, data, "Skipping malformed log payload"),
            },
            "error" => {
                let message = serde_json::from_str::<LogPayload>(data)
                    .map(|p| p.message)
                    .unwrap_or_else(|_| data.to_string());
                warn!(message = %message, "Remote build reported an error");
            }
            other => debug!(event = other, "Ignoring log stream event"),
        }
    }

    debug!(delivered = *delivered, "Log stream closed");
    sink.flush().await?;
    Ok(())
}

/// Value of `name:` on `line`, with the single optional leading space removed
fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}
