//! Subcommand handlers
//!
//! Each handler returns the process exit code. Reports go to stdout; logs,
//! build output in machine-readable modes and error hints go to stderr.

use super::commands::{BuildArgs, ConfigArgs, StatusArgs};
use super::output::{BuildPlan, BuildReport, OutputFormat, OutputFormatter, StatusReport};
use crate::artifact::DockerImagePortDetector;
use crate::builders::{BuilderRegistry, OutputSinks};
use crate::config::{ConfigError, ShipyardConfig};
use crate::detection::ProjectDetector;
use crate::error::BuildError;
use crate::lifecycle::{
    EnvFileSecretProvider, FallbackRunner, LifecycleExecutor, SecretProvider,
    StaticSecretProvider,
};
use crate::progress::LoggingHandler;
use crate::project::{self, Overrides, ProjectError, ProjectFile};
use crate::remote::{
    DeploymentStatus, FailureDetails, RemoteBuildOrchestrator, RemoteBuildService, RemoteError,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    InvalidPath(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Output(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn exit_code(&self) -> i32 {
        match self {
            HandlerError::Config(_) | HandlerError::Project(_) | HandlerError::InvalidPath(_) => 2,
            HandlerError::Build(e) => e.exit_code(),
            HandlerError::Remote(e) => e.exit_code(),
            HandlerError::Output(_) => 1,
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            HandlerError::Remote(e) => e.help_message(),
            HandlerError::Config(_) => {
                Some("Please check your SHIPYARD_* environment variables.".to_string())
            }
            HandlerError::Build(BuildError::UnknownBuilder { .. }) => Some(
                "Available builders: railpack, nixpacks, csdocker, docker, noop".to_string(),
            ),
            _ => None,
        }
    }
}

fn report(result: Result<String, HandlerError>) -> i32 {
    match result {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            error!("{}", e);
            if let Some(hint) = e.hint() {
                eprintln!("\n{}", hint);
            }
            e.exit_code()
        }
    }
}

pub async fn handle_build(args: &BuildArgs) -> i32 {
    report(run_build(args).await)
}

pub async fn handle_status(args: &StatusArgs) -> i32 {
    report(run_status(args).await)
}

pub fn handle_config(args: &ConfigArgs) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());
    report(
        loaded_config()
            .map_err(HandlerError::from)
            .and_then(|config| Ok(formatter.format_config(&config)?)),
    )
}

fn loaded_config() -> Result<ShipyardConfig, ConfigError> {
    let config = ShipyardConfig::default();
    config.validate()?;
    debug!(%config, "Loaded configuration");
    Ok(config)
}

fn source_dir(path: Option<&Path>) -> Result<PathBuf, HandlerError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => env::current_dir().map_err(|e| {
            HandlerError::InvalidPath(format!("Failed to get current directory: {}", e))
        })?,
    };

    if !path.is_dir() {
        return Err(HandlerError::InvalidPath(format!(
            "Source path is not a directory: {}",
            path.display()
        )));
    }

    path.canonicalize().map_err(|e| {
        HandlerError::InvalidPath(format!(
            "Failed to canonicalize {}: {}",
            path.display(),
            e
        ))
    })
}

/// Cancels the returned token on Ctrl-C
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling");
                trigger.cancel();
            }
            Err(e) => debug!(error = %e, "Failed to listen for interrupt"),
        }
    });
    cancel
}

async fn run_build(args: &BuildArgs) -> Result<String, HandlerError> {
    let config = loaded_config()?;
    let dir = source_dir(args.path.as_deref())?;
    debug!("Source directory: {}", dir.display());

    let file = ProjectFile::load(&dir)?;
    let overrides = Overrides {
        app_name: args.app.clone(),
        builder: args.builder.clone(),
        tag: args.tag.clone(),
        service: args.service.clone(),
        env: args.env_map(),
        build_args: args.build_arg_map(),
    };
    let resolved = project::resolve(&dir, file.as_ref(), &overrides)?;

    let detector = ProjectDetector::new();
    let detection = detector.detect(&dir);
    let chain = detector.chain_for(&dir, resolved.explicit_builder.as_deref().unwrap_or(""));
    let fallback = config.fallback_enabled && !args.no_fallback;

    let format: OutputFormat = args.format.into();
    let formatter = OutputFormatter::new(format);

    if args.dry_run {
        let plan = BuildPlan {
            path: dir.display().to_string(),
            app: resolved.application.name.clone(),
            chain: if fallback {
                chain
            } else {
                chain.into_iter().take(1).collect()
            },
            reason: detection.reason.to_string(),
            fallback_enabled: fallback,
            remote: args.remote,
            service: resolved.service.clone(),
            deployer: resolved.application.deployer.clone(),
        };
        return Ok(formatter.format_plan(&plan)?);
    }

    let cancel = cancel_on_interrupt();

    if args.remote {
        let service_id = resolved.service.clone().ok_or_else(|| {
            RemoteError::Configuration(
                "remote builds need a service id (--service or [app].service)".to_string(),
            )
        })?;
        let service: Arc<dyn RemoteBuildService> = Arc::new(config.create_remote_service()?);
        let orchestrator = RemoteBuildOrchestrator::new(
            service,
            config.status_poller(),
            Arc::new(LoggingHandler),
        );

        info!(service = %service_id, "Starting remote build");
        let mut sink = log_sink(format);
        let deployment = orchestrator
            .run(&cancel, &dir, &service_id, sink.as_mut())
            .await?;
        return Ok(formatter.format_remote(&deployment)?);
    }

    let secrets: Arc<dyn SecretProvider> = match &args.env_file {
        Some(path) => Arc::new(EnvFileSecretProvider::new(path.clone())),
        None => Arc::new(StaticSecretProvider::default()),
    };
    let registry = BuilderRegistry::with_defaults(Arc::new(DockerImagePortDetector));
    let executor = Arc::new(LifecycleExecutor::new(Arc::new(registry), secrets));
    let runner = FallbackRunner::new(executor, Arc::new(LoggingHandler)).with_fallback(fallback);

    let mut sinks = build_sinks(format);
    let app = &resolved.application;
    let outcome = if args.deploy {
        runner.build_and_deploy(&cancel, app, &chain, &mut sinks).await?
    } else {
        runner.build(&cancel, app, &chain, &mut sinks).await?
    };

    Ok(formatter.format_build(&BuildReport {
        app: app.name.clone(),
        builder: outcome.builder,
        attempts: outcome.attempts,
        deployed: args.deploy,
        artifact: outcome.artifact,
    })?)
}

/// Build tool output; kept off stdout when stdout carries JSON or YAML
fn build_sinks(format: OutputFormat) -> OutputSinks {
    match format {
        OutputFormat::Human => OutputSinks::stdio(),
        OutputFormat::Json | OutputFormat::Yaml => OutputSinks::new(
            Box::new(tokio::io::stderr()),
            Box::new(tokio::io::stderr()),
        ),
    }
}

fn log_sink(format: OutputFormat) -> Box<dyn AsyncWrite + Send + Unpin> {
    match format {
        OutputFormat::Human => Box::new(tokio::io::stdout()),
        OutputFormat::Json | OutputFormat::Yaml => Box::new(tokio::io::stderr()),
    }
}

async fn run_status(args: &StatusArgs) -> Result<String, HandlerError> {
    let config = loaded_config()?;
    let service = config.create_remote_service()?;
    let formatter = OutputFormatter::new(args.format.into());

    let report = fetch_status(&service, &args.deployment_id).await?;
    Ok(formatter.format_status(&report)?)
}

/// Current status of `deployment_id`, with the failure report when it failed
pub async fn fetch_status(
    service: &dyn RemoteBuildService,
    deployment_id: &str,
) -> Result<StatusReport, RemoteError> {
    let raw = service.status(deployment_id).await?;
    let status = raw.parse::<DeploymentStatus>().ok();

    let details = match status {
        Some(DeploymentStatus::Failed) => Some(
            service
                .details(deployment_id)
                .await
                .unwrap_or_else(|e| FailureDetails::unavailable(deployment_id, &e.to_string())),
        ),
        _ => None,
    };

    Ok(StatusReport {
        deployment_id: deployment_id.to_string(),
        status: status.map(|s| s.to_string()).unwrap_or(raw),
        details,
    })
}
