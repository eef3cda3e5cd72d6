//! Build output descriptor and port detection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Result of a successful build. Never produced for a failed build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// `<builder>-<app>-<unix seconds>`
    pub id: String,
    pub image: String,
    pub tag: String,
    pub exposed_ports: Vec<u16>,
    pub labels: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Starts an artifact for `app_name` built by `builder` from `context`.
    ///
    /// The identifier, image reference, labels and the mandatory `builder` and
    /// `context` metadata entries are filled in here.
    pub fn new(builder: &str, app_name: &str, tag: &str, context: &str) -> Self {
        let created_at = Utc::now();

        let mut labels = BTreeMap::new();
        labels.insert("shipyard.app".to_string(), app_name.to_string());
        labels.insert("shipyard.builder".to_string(), builder.to_string());

        let mut metadata = BTreeMap::new();
        metadata.insert("builder".to_string(), builder.to_string());
        metadata.insert("context".to_string(), context.to_string());

        Self {
            id: format!("{}-{}-{}", builder, app_name, created_at.timestamp()),
            image: format!("{}:{}", app_name, tag),
            tag: tag.to_string(),
            exposed_ports: Vec::new(),
            labels,
            metadata,
            created_at,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replaces the exposed ports, keeping first-seen order and dropping duplicates
    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        let mut unique = Vec::new();
        for port in ports {
            if !unique.contains(&port) {
                unique.push(port);
            }
        }
        if !unique.is_empty() {
            let joined = unique
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(",");
            self.metadata.insert("detected_ports".to_string(), joined);
        }
        self.exposed_ports = unique;
        self
    }
}

#[derive(Debug, Error)]
#[error("Port detection failed for '{image}': {message}")]
pub struct PortDetectionError {
    pub image: String,
    pub message: String,
}

/// Looks up the ports an image exposes
#[async_trait]
pub trait PortDetector: Send + Sync {
    async fn detect_ports(&self, image: &str) -> Result<Vec<u16>, PortDetectionError>;
}

/// Reads `EXPOSE`d ports from the local Docker daemon's image metadata
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerImagePortDetector;

#[async_trait]
impl PortDetector for DockerImagePortDetector {
    async fn detect_ports(&self, image: &str) -> Result<Vec<u16>, PortDetectionError> {
        use bollard::Docker;

        let docker = Docker::connect_with_local_defaults().map_err(|e| PortDetectionError {
            image: image.to_string(),
            message: format!("cannot connect to Docker: {}", e),
        })?;

        let inspect = docker
            .inspect_image(image)
            .await
            .map_err(|e| PortDetectionError {
                image: image.to_string(),
                message: e.to_string(),
            })?;

        let mut ports: Vec<u16> = inspect
            .config
            .and_then(|c| c.exposed_ports)
            .map(|exposed| exposed.keys().filter_map(|k| parse_port_spec(k)).collect())
            .unwrap_or_default();
        ports.sort_unstable();

        debug!(image, ?ports, "Inspected image ports");
        Ok(ports)
    }
}

/// Returns a fixed port list; used for no-op builds and tests
#[derive(Debug, Default, Clone)]
pub struct StaticPortDetector {
    ports: Vec<u16>,
}

impl StaticPortDetector {
    pub fn new(ports: Vec<u16>) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl PortDetector for StaticPortDetector {
    async fn detect_ports(&self, _image: &str) -> Result<Vec<u16>, PortDetectionError> {
        Ok(self.ports.clone())
    }
}

/// Parses `8080/tcp` or `8080` into a port number
pub fn parse_port_spec(spec: &str) -> Option<u16> {
    spec.split('/').next()?.trim().parse().ok()
}

/// Attaches detected ports to `artifact`.
///
/// Detection failure is logged and treated as zero ports. When nothing was
/// found, `default_port` (usually the configured `PORT` env entry) is applied.
pub async fn enrich_ports(
    artifact: Artifact,
    detector: &dyn PortDetector,
    default_port: Option<u16>,
) -> Artifact {
    let detected = match detector.detect_ports(&artifact.image).await {
        Ok(ports) => ports,
        Err(e) => {
            warn!(error = %e, "Port detection failed, continuing without ports");
            Vec::new()
        }
    };

    if detected.is_empty() {
        if let Some(port) = default_port {
            debug!(port, "No ports detected, applying default");
            return artifact
                .with_metadata("default_port", port.to_string())
                .with_ports([port]);
        }
    }

    artifact.with_ports(detected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    struct FailingDetector;

    #[async_trait]
    impl PortDetector for FailingDetector {
        async fn detect_ports(&self, image: &str) -> Result<Vec<u16>, PortDetectionError> {
            Err(PortDetectionError {
                image: image.to_string(),
                message: "daemon unavailable".to_string(),
            })
        }
    }

    #[test]
    fn test_artifact_id_format() {
        let artifact = Artifact::new("railpack", "web", "latest", ".");
        let re = Regex::new(r"^railpack-web-\d+$").unwrap();
        assert!(re.is_match(&artifact.id), "unexpected id {}", artifact.id);
        assert_eq!(artifact.image, "web:latest");
    }

    #[test]
    fn test_artifact_required_metadata() {
        let artifact = Artifact::new("nixpacks", "api", "v2", "services/api");
        assert_eq!(artifact.metadata.get("builder").unwrap(), "nixpacks");
        assert_eq!(artifact.metadata.get("context").unwrap(), "services/api");
        assert!(artifact.exposed_ports.is_empty());
    }

    #[test]
    fn test_with_ports_dedupes_in_order() {
        let artifact = Artifact::new("docker", "web", "latest", ".").with_ports([8080, 3000, 8080]);
        assert_eq!(artifact.exposed_ports, vec![8080, 3000]);
        assert_eq!(artifact.metadata.get("detected_ports").unwrap(), "8080,3000");
    }

    #[test]
    fn test_parse_port_spec() {
        assert_eq!(parse_port_spec("8080/tcp"), Some(8080));
        assert_eq!(parse_port_spec("53/udp"), Some(53));
        assert_eq!(parse_port_spec("3000"), Some(3000));
        assert_eq!(parse_port_spec("http"), None);
    }

    #[tokio::test]
    async fn test_enrich_ports_failure_is_not_fatal() {
        let artifact = Artifact::new("docker", "web", "latest", ".");
        let enriched = enrich_ports(artifact, &FailingDetector, None).await;
        assert!(enriched.exposed_ports.is_empty());
        assert!(!enriched.metadata.contains_key("detected_ports"));
    }

    #[tokio::test]
    async fn test_enrich_ports_applies_default() {
        let artifact = Artifact::new("docker", "web", "latest", ".");
        let enriched = enrich_ports(artifact, &FailingDetector, Some(5000)).await;
        assert_eq!(enriched.exposed_ports, vec![5000]);
    }

    #[tokio::test]
    async fn test_enrich_ports_prefers_detected() {
        let artifact = Artifact::new("docker", "web", "latest", ".");
        let detector = StaticPortDetector::new(vec![8080]);
        let enriched = enrich_ports(artifact, &detector, Some(5000)).await;
        assert_eq!(enriched.exposed_ports, vec![8080]);
        assert_eq!(enriched.metadata.get("detected_ports").unwrap(), "8080");
    }
}
