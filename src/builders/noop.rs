//! Builder and deployer that does nothing

use super::{Builder, BuilderConfig, ConfigSlot, OutputSinks};
use crate::artifact::{self, Artifact, PortDetector};
use crate::error::BuildError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const NAME: &str = "noop";

pub struct NoopBuilder {
    slot: ConfigSlot,
    detector: Arc<dyn PortDetector>,
}

impl NoopBuilder {
    pub fn new(detector: Arc<dyn PortDetector>) -> Self {
        Self {
            slot: ConfigSlot::default(),
            detector,
        }
    }
}

#[async_trait]
impl Builder for NoopBuilder {
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
        _sinks: &mut OutputSinks,
    ) -> Result<Artifact, BuildError> {
        let config = self.slot.require(NAME)?;
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled {
                builder: NAME.to_string(),
            });
        }

        let built = Artifact::new(NAME, &config.app_name, &config.tag, &config.context)
            .with_metadata("note", "no build performed");
        Ok(artifact::enrich_ports(built, self.detector.as_ref(), config.default_port()).await)
    }

    async fn deploy(
        &self,
        _cancel: &CancellationToken,
        artifact: &Artifact,
    ) -> Result<(), BuildError> {
        info!(artifact = %artifact.id, "Skipping deploy (noop deployer)");
        Ok(())
    }
}
