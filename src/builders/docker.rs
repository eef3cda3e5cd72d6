//! Dockerfile-driven builders: plain `docker build` and the container-native
//! `csdocker` variant built on `docker buildx`

use super::process::{self, resolve_invocation, BuildCommand};
use super::{Builder, BuilderConfig, BuilderSettings, ConfigSlot, OutputSinks};
use crate::artifact::{Artifact, PortDetector};
use crate::error::BuildError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerFlavor {
    /// `docker build`
    Docker,
    /// `docker buildx build --load`
    ContainerNative,
}

impl DockerFlavor {
    pub fn name(&self) -> &'static str {
        match self {
            DockerFlavor::Docker => "docker",
            DockerFlavor::ContainerNative => "csdocker",
        }
    }
}

pub struct DockerBuilder {
    flavor: DockerFlavor,
    slot: ConfigSlot,
    detector: Arc<dyn PortDetector>,
}

impl DockerBuilder {
    pub fn new(flavor: DockerFlavor, detector: Arc<dyn PortDetector>) -> Self {
        Self {
            flavor,
            slot: ConfigSlot::default(),
            detector,
        }
    }

    /// Env entries are forwarded as build args; explicit build args win on conflict.
    pub fn command(flavor: DockerFlavor, config: &BuilderConfig) -> BuildCommand {
        let mut command = match flavor {
            DockerFlavor::Docker => BuildCommand::new("docker").arg("build"),
            DockerFlavor::ContainerNative => BuildCommand::new("docker")
                .args(["buildx", "build", "--load"]),
        };

        command = command
            .arg("-t")
            .arg(format!("{}:{}", config.app_name, config.tag));

        if let Some(BuilderSettings::Docker(settings)) = &config.settings {
            if let Some(dockerfile) = &settings.dockerfile {
                command = command.arg("-f").arg(dockerfile.clone());
            }
            if let Some(platform) = &settings.platform {
                command = command.arg("--platform").arg(platform.clone());
            }
            if let Some(target) = &settings.target {
                command = command.arg("--target").arg(target.clone());
            }
            if settings.no_cache {
                command = command.arg("--no-cache");
            }
        }

        let mut build_args = config.env.clone();
        build_args.extend(config.build_args.clone());

        command
            .key_value_flags("--build-arg", &build_args)
            .target(resolve_invocation(&config.context))
    }
}

#[async_trait]
impl Builder for DockerBuilder {
    fn name(&self) -> &str {
        self.flavor.name()
    }

    fn configuration(&self) -> Result<BuilderConfig, BuildError> {
        Ok(self.slot.get())
    }

    fn set_configuration(&mut self, config: Option<BuilderConfig>) -> Result<(), BuildError> {
        self.slot.set(self.flavor.name(), config)
    }

    async fn build(
        &self,
        cancel: &CancellationToken,
        sinks: &mut OutputSinks,
    ) -> Result<Artifact, BuildError> {
        let name = self.flavor.name();
        let config = self.slot.require(name)?;
        let command = Self::command(self.flavor, config);
        let output = process::run_command(name, &command, cancel, sinks).await?;
        Ok(super::finish_artifact(name, config, &command, &output, self.detector.as_ref()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::DockerSettings;
    use std::path::PathBuf;

    #[test]
    fn test_plain_docker_command() {
        let config = BuilderConfig::new("web")
            .with_build_arg("NODE_ENV", "production")
            .with_env("NODE_ENV", "development")
            .with_env("API_URL", "http://api");
        let command = DockerBuilder::command(DockerFlavor::Docker, &config);
        assert_eq!(
            command.args,
            vec![
                "build",
                "-t",
                "web:latest",
                "--build-arg",
                "API_URL=http://api",
                "--build-arg",
                "NODE_ENV=production",
                "."
            ]
        );
        assert_eq!(command.working_dir, None);
    }

    #[test]
    fn test_container_native_command_in_subdirectory() {
        let config = BuilderConfig::new("api")
            .with_context("apps/api")
            .with_settings(BuilderSettings::Docker(DockerSettings {
                dockerfile: Some("Dockerfile.prod".to_string()),
                platform: Some("linux/amd64".to_string()),
                ..Default::default()
            }));
        let command = DockerBuilder::command(DockerFlavor::ContainerNative, &config);
        assert_eq!(
            command.args,
            vec![
                "buildx",
                "build",
                "--load",
                "-t",
                "api:latest",
                "-f",
                "Dockerfile.prod",
                "--platform",
                "linux/amd64",
                "."
            ]
        );
        assert_eq!(command.working_dir, Some(PathBuf::from("apps/api")));
    }

    #[test]
    fn test_flavor_names() {
        assert_eq!(DockerFlavor::Docker.name(), "docker");
        assert_eq!(DockerFlavor::ContainerNative.name(), "csdocker");
    }
}
