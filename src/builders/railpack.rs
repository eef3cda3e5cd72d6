//! railpack builder (framework-aware)

use super::process::{self, resolve_invocation, BuildCommand};
use super::{Builder, BuilderConfig, BuilderSettings, ConfigSlot, OutputSinks};
use crate::artifact::{Artifact, PortDetector};
use crate::error::BuildError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const NAME: &str = "railpack";

pub struct RailpackBuilder {
    slot: ConfigSlot,
    detector: Arc<dyn PortDetector>,
}

impl RailpackBuilder {
    pub fn new(detector: Arc<dyn PortDetector>) -> Self {
        Self {
            slot: ConfigSlot::default(),
            detector,
        }
    }

    /// `railpack build <path> --name <image> [--env K=V]... [--config-file F]`.
    /// Build args have no railpack equivalent and are ignored.
    pub fn command(config: &BuilderConfig) -> BuildCommand {
        let mut command = BuildCommand::new("railpack")
            .arg("build")
            .target(resolve_invocation(&config.context))
            .arg("--name")
            .arg(format!("{}:{}", config.app_name, config.tag))
            .key_value_flags("--env", &config.env);

        if let Some(BuilderSettings::Railpack(settings)) = &config.settings {
            if let Some(file) = &settings.config_file {
                command = command.arg("--config-file").arg(file.clone());
            }
        }
        command
    }
}

#[async_trait]
impl Builder for RailpackBuilder {
    fn name(&self) -> &str {
        NAME
    }

    fn configuration(&self) -> Result<BuilderConfig, BuildError> {
        Ok(self.slot.get())
    }

    fn set_configuration(&mut self, config: Option<BuilderConfig>) -> Result<(), BuildError> {
        self.slot.set(NAME, config)
    }

    async fn build(
        &self,
        cancel: &CancellationToken,
        sinks: &mut OutputSinks,
    ) -> Result<Artifact, BuildError> {
        let config = self.slot.require(NAME)?;
        let command = Self::command(config);
        let output = process::run_command(NAME, &command, cancel, sinks).await?;
        Ok(super::finish_artifact(NAME, config, &command, &output, self.detector.as_ref()).await)
    }
}
