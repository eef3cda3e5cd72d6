//! Builder capabilities
//!
//! A builder turns a source directory into an [`Artifact`]. Every variant
//! binds a [`BuilderConfig`] before it can build, writes its output to the
//! caller's [`OutputSinks`], and honours cancellation.
//!
//! Variants:
//! - `railpack` and `nixpacks`: framework-aware builders driven by their CLIs
//! - `csdocker` and `docker`: container-native builders driven by a Dockerfile
//! - `noop`: produces an artifact without running anything; also the default deployer

use crate::artifact::Artifact;
use crate::error::BuildError;
use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod config;
pub mod docker;
pub mod nixpacks;
pub mod noop;
pub mod process;
pub mod railpack;
pub mod registry;

pub use config::{
    BuilderConfig, BuilderSettings, DockerSettings, NixpacksSettings, RailpackSettings,
};
pub use docker::{DockerBuilder, DockerFlavor};
pub use nixpacks::NixpacksBuilder;
pub use noop::NoopBuilder;
pub use railpack::RailpackBuilder;
pub use registry::BuilderRegistry;

pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Destinations for build output. Missing sinks are fine: output is still
/// captured in memory for error reporting.
#[derive(Default)]
pub struct OutputSinks {
    pub stdout: Option<OutputSink>,
    pub stderr: Option<OutputSink>,
}

impl OutputSinks {
    pub fn new(stdout: OutputSink, stderr: OutputSink) -> Self {
        Self {
            stdout: Some(stdout),
            stderr: Some(stderr),
        }
    }

    /// Sinks wired to the process's own stdout and stderr
    pub fn stdio() -> Self {
        Self::new(Box::new(tokio::io::stdout()), Box::new(tokio::io::stderr()))
    }
}

impl std::fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSinks")
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// A pluggable strategy that turns source code into a deployable artifact
#[async_trait]
pub trait Builder: Send + Sync {
    /// Registry identity, e.g. `railpack`
    fn name(&self) -> &str;

    /// The currently bound configuration, or an empty one when nothing was bound
    fn configuration(&self) -> Result<BuilderConfig, BuildError>;

    /// Binds a configuration; `None` resets to an empty configuration
    fn set_configuration(&mut self, config: Option<BuilderConfig>) -> Result<(), BuildError>;

    async fn build(
        &self,
        cancel: &CancellationToken,
        sinks: &mut OutputSinks,
    ) -> Result<Artifact, BuildError>;

    /// Hands a built artifact to the deploy target
    async fn deploy(
        &self,
        _cancel: &CancellationToken,
        _artifact: &Artifact,
    ) -> Result<(), BuildError> {
        Err(BuildError::DeployFailed {
            deployer: self.name().to_string(),
            message: "this builder has no deploy capability".to_string(),
        })
    }
}

/// Bound configuration slot shared by the builder variants
#[derive(Debug, Clone, Default)]
pub(crate) struct ConfigSlot {
    config: Option<BuilderConfig>,
}

impl ConfigSlot {
    pub(crate) fn get(&self) -> BuilderConfig {
        self.config.clone().unwrap_or_default()
    }

    /// Stores `config` after checking its settings belong to `builder`
    pub(crate) fn set(
        &mut self,
        builder: &str,
        config: Option<BuilderConfig>,
    ) -> Result<(), BuildError> {
        let config = config.unwrap_or_default();
        if let Some(settings) = &config.settings {
            if !settings.applies_to(builder) {
                return Err(BuildError::config(format!(
                    "'{}' settings cannot be used with builder '{}'",
                    settings.kind(),
                    builder
                )));
            }
        }
        self.config = Some(config);
        Ok(())
    }

    /// The bound configuration, failing fast when unset or incomplete
    pub(crate) fn require(&self, builder: &str) -> Result<&BuilderConfig, BuildError> {
        let config = self.config.as_ref().ok_or_else(|| {
            BuildError::config(format!("builder '{}' has no configuration", builder))
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Turns a finished command run into an artifact with ports attached
pub(crate) async fn finish_artifact(
    builder: &str,
    config: &BuilderConfig,
    command: &process::BuildCommand,
    output: &process::CommandOutput,
    detector: &dyn crate::artifact::PortDetector,
) -> Artifact {
    let artifact = Artifact::new(builder, &config.app_name, &config.tag, &config.context)
        .with_metadata("command", command.display())
        .with_metadata("duration_ms", output.duration.as_millis().to_string());

    let artifact = crate::artifact::enrich_ports(artifact, detector, config.default_port()).await;
    info!(
        builder,
        artifact = %artifact.id,
        image = %artifact.image,
        ports = ?artifact.exposed_ports,
        "Build succeeded"
    );
    artifact
}
