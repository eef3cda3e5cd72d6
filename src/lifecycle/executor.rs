//! Per-application build and deploy pipeline

use super::SecretProvider;
use crate::artifact::Artifact;
use crate::builders::{BuilderConfig, BuilderRegistry, BuilderSettings, OutputSinks};
use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_DEPLOYER: &str = "noop";

/// An application as the executor sees it: which builder and deployer to
/// resolve and the configuration to bind to them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub builder: String,
    pub deployer: String,
    pub config: BuilderConfig,
    /// Builder-specific settings; the entry matching the resolved builder is bound
    pub settings: Vec<BuilderSettings>,
}

impl Application {
    pub fn new(builder: impl Into<String>, config: BuilderConfig) -> Self {
        Self {
            name: config.app_name.clone(),
            builder: builder.into(),
            deployer: DEFAULT_DEPLOYER.to_string(),
            config,
            settings: Vec::new(),
        }
    }

    pub fn with_builder(&self, builder: &str) -> Self {
        Self {
            builder: builder.to_string(),
            ..self.clone()
        }
    }

    pub fn with_deployer(mut self, deployer: impl Into<String>) -> Self {
        self.deployer = deployer.into();
        self
    }

    pub fn with_settings(mut self, settings: BuilderSettings) -> Self {
        self.settings.push(settings);
        self
    }

    /// The configuration to bind to `builder`, carrying its matching settings
    pub fn config_for(&self, builder: &str) -> BuilderConfig {
        let mut config = self.config.clone();
        let inline = config.settings.take().filter(|s| s.applies_to(builder));
        config.settings = self
            .settings
            .iter()
            .find(|s| s.applies_to(builder))
            .cloned()
            .or(inline);
        config
    }
}

/// Resolves builders from the registry, injects secrets, builds and deploys
pub struct LifecycleExecutor {
    registry: Arc<BuilderRegistry>,
    secrets: Arc<dyn SecretProvider>,
}

impl LifecycleExecutor {
    pub fn new(registry: Arc<BuilderRegistry>, secrets: Arc<dyn SecretProvider>) -> Self {
        Self { registry, secrets }
    }

    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    /// Builds `app` with its configured builder
    pub async fn build_only(
        &self,
        cancel: &CancellationToken,
        app: &Application,
        sinks: &mut OutputSinks,
    ) -> Result<Artifact, BuildError> {
        let mut builder = self.registry.create(&app.builder)?;

        let mut config = app.config_for(&app.builder);
        config.validate()?;

        let secrets = self
            .secrets
            .secrets(&app.name)
            .await
            .map_err(|e| BuildError::Secrets {
                app: app.name.clone(),
                message: e.to_string(),
            })?;
        debug!(app = %app.name, count = secrets.len(), "Injecting secrets");
        config.merge_env(secrets);

        builder.set_configuration(Some(config))?;
        builder.build(cancel, sinks).await
    }

    /// Builds `app`, then hands the artifact to its deployer
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        app: &Application,
        sinks: &mut OutputSinks,
    ) -> Result<Artifact, BuildError> {
        let artifact = self.build_only(cancel, app, sinks).await?;
        self.deploy(cancel, app, &artifact).await?;
        Ok(artifact)
    }

    /// Runs only the deploy half for an already built artifact
    pub async fn deploy(
        &self,
        cancel: &CancellationToken,
        app: &Application,
        artifact: &Artifact,
    ) -> Result<(), BuildError> {
        let mut deployer = self.registry.create(&app.deployer)?;
        deployer.set_configuration(Some(app.config_for(&app.deployer)))?;

        info!(deployer = %app.deployer, artifact = %artifact.id, "Deploying");
        deployer.deploy(cancel, artifact).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::StaticPortDetector;
    use crate::builders::{Builder, DockerSettings};
    use crate::lifecycle::StaticSecretProvider;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Records the configuration it was built with
    struct RecordingBuilder {
        seen: Arc<Mutex<Option<BuilderConfig>>>,
        config: Option<BuilderConfig>,
    }

    #[async_trait]
    impl Builder for RecordingBuilder {
        fn name(&self) -> &str {
            "recording"
        }

        fn configuration(&self) -> Result<BuilderConfig, BuildError> {
            Ok(self.config.clone().unwrap_or_default())
        }

        fn set_configuration(&mut self, config: Option<BuilderConfig>) -> Result<(), BuildError> {
            self.config = config;
            Ok(())
        }

        async fn build(
            &self,
            _cancel: &CancellationToken,
            _sinks: &mut OutputSinks,
        ) -> Result<Artifact, BuildError> {
            let config = self.config.clone().unwrap_or_default();
            *self.seen.lock().unwrap() = Some(config.clone());
            Ok(Artifact::new("recording", &config.app_name, &config.tag, &config.context))
        }
    }

    fn executor_with_recorder(
        secrets: BTreeMap<String, String>,
    ) -> (LifecycleExecutor, Arc<Mutex<Option<BuilderConfig>>>) {
        let seen = Arc::new(Mutex::new(None));
        let mut registry = BuilderRegistry::with_defaults(Arc::new(StaticPortDetector::default()));
        let recorder_seen = seen.clone();
        registry.register("recording", move || {
            Box::new(RecordingBuilder {
                seen: recorder_seen.clone(),
                config: None,
            })
        });
        let executor = LifecycleExecutor::new(
            Arc::new(registry),
            Arc::new(StaticSecretProvider::new(secrets)),
        );
        (executor, seen)
    }

    #[tokio::test]
    async fn test_build_only_merges_secrets_over_env() {
        let mut secrets = BTreeMap::new();
        secrets.insert("DATABASE_URL".to_string(), "postgres://secret".to_string());
        secrets.insert("MODE".to_string(), "from-secret".to_string());
        let (executor, seen) = executor_with_recorder(secrets);

        let app = Application::new(
            "recording",
            BuilderConfig::new("web").with_env("MODE", "from-config"),
        );
        executor
            .build_only(&CancellationToken::new(), &app, &mut OutputSinks::default())
            .await
            .unwrap();

        let config = seen.lock().unwrap().clone().unwrap();
        assert_eq!(config.env["DATABASE_URL"], "postgres://secret");
        assert_eq!(config.env["MODE"], "from-secret");
    }

    #[tokio::test]
    async fn test_unknown_builder_is_configuration_error() {
        let (executor, _) = executor_with_recorder(BTreeMap::new());
        let app = Application::new("kaniko", BuilderConfig::new("web"));
        let err = executor
            .build_only(&CancellationToken::new(), &app, &mut OutputSinks::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownBuilder { .. }));
    }

    #[tokio::test]
    async fn test_empty_app_name_fails_before_build() {
        let (executor, seen) = executor_with_recorder(BTreeMap::new());
        let app = Application::new("recording", BuilderConfig::default());
        let err = executor
            .build_only(&CancellationToken::new(), &app, &mut OutputSinks::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
        assert!(seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execute_deploys_with_noop() {
        let (executor, _) = executor_with_recorder(BTreeMap::new());
        let app = Application::new("noop", BuilderConfig::new("web"));
        let artifact = executor
            .execute(&CancellationToken::new(), &app, &mut OutputSinks::default())
            .await
            .unwrap();
        assert!(artifact.id.starts_with("noop-web-"));
    }

    #[tokio::test]
    async fn test_execute_with_non_deploying_deployer_fails() {
        let (executor, _) = executor_with_recorder(BTreeMap::new());
        let app = Application::new("noop", BuilderConfig::new("web")).with_deployer("railpack");
        let err = executor
            .execute(&CancellationToken::new(), &app, &mut OutputSinks::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::DeployFailed { .. }));
    }

    #[test]
    fn test_config_for_picks_matching_settings() {
        let app = Application::new("railpack", BuilderConfig::new("web"))
            .with_settings(BuilderSettings::Docker(DockerSettings::default()));
        assert!(app.config_for("railpack").settings.is_none());
        assert!(matches!(
            app.config_for("csdocker").settings,
            Some(BuilderSettings::Docker(_))
        ));
    }
}
