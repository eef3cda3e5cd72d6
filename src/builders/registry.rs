//! Builder registry
//!
//! Built once in the entry point and shared read-only afterwards. Each lookup
//! creates a fresh builder instance, so bound configuration never leaks
//! between attempts.

use super::{Builder, DockerBuilder, DockerFlavor, NixpacksBuilder, NoopBuilder, RailpackBuilder};
use crate::artifact::PortDetector;
use crate::error::BuildError;
use std::collections::BTreeMap;
use std::sync::Arc;

type Constructor = Arc<dyn Fn() -> Box<dyn Builder> + Send + Sync>;

/// Mapping from builder name to a constructor for that builder
#[derive(Clone, Default)]
pub struct BuilderRegistry {
    builders: BTreeMap<String, Constructor>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in builder, sharing one port detector
    pub fn with_defaults(detector: Arc<dyn PortDetector>) -> Self {
        let mut registry = Self::new();

        let d = detector.clone();
        registry.register("railpack", move || Box::new(RailpackBuilder::new(d.clone())));
        let d = detector.clone();
        registry.register("nixpacks", move || Box::new(NixpacksBuilder::new(d.clone())));
        let d = detector.clone();
        registry.register("csdocker", move || {
            Box::new(DockerBuilder::new(DockerFlavor::ContainerNative, d.clone()))
        });
        let d = detector.clone();
        registry.register("docker", move || {
            Box::new(DockerBuilder::new(DockerFlavor::Docker, d.clone()))
        });
        registry.register("noop", move || Box::new(NoopBuilder::new(detector.clone())));

        registry
    }

    /// Registers `constructor` under `name`, replacing any previous entry
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Builder> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Arc::new(constructor));
    }

    /// Creates a fresh builder registered as `name` (case-sensitive)
    pub fn create(&self, name: &str) -> Result<Box<dyn Builder>, BuildError> {
        if name.is_empty() {
            return Err(BuildError::config("builder name must not be empty"));
        }
        match self.builders.get(name) {
            Some(constructor) => Ok(constructor()),
            None => Err(BuildError::UnknownBuilder {
                name: name.to_string(),
                suggestion: self.closest(name),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    fn closest(&self, name: &str) -> Option<String> {
        self.builders
            .keys()
            .map(|candidate| (strsim::jaro_winkler(name, candidate), candidate))
            .filter(|(score, _)| *score >= 0.8)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, candidate)| candidate.clone())
    }
}
