//! shipyard - build-and-deploy orchestration
//!
//! Detects how a source directory should be built, runs the build with one
//! of several pluggable builders, falls back along an ordered chain when a
//! builder fails, and optionally builds remotely by uploading a source
//! archive and following the deployment until it finishes.
//!
//! # Example Usage
//!
//! ```no_run
//! use shipyard::artifact::StaticPortDetector;
//! use shipyard::builders::{BuilderConfig, BuilderRegistry, OutputSinks};
//! use shipyard::detection::ProjectDetector;
//! use shipyard::lifecycle::{Application, FallbackRunner, LifecycleExecutor, StaticSecretProvider};
//! use shipyard::progress::LoggingHandler;
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), shipyard::BuildError> {
//! let chain = ProjectDetector::new().chain_for(Path::new("."), "");
//! let registry = BuilderRegistry::with_defaults(Arc::new(StaticPortDetector::default()));
//! let executor = LifecycleExecutor::new(
//!     Arc::new(registry),
//!     Arc::new(StaticSecretProvider::default()),
//! );
//! let runner = FallbackRunner::new(Arc::new(executor), Arc::new(LoggingHandler));
//!
//! let app = Application::new("", BuilderConfig::new("web"));
//! let outcome = runner
//!     .build(&CancellationToken::new(), &app, &chain, &mut OutputSinks::stdio())
//!     .await?;
//! println!("{} built {}", outcome.builder, outcome.artifact.image);
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`detection`]: marker-file detection of the builder chain
//! - [`builders`]: the builder capability, its variants and the registry
//! - [`lifecycle`]: per-application build and deploy, and the fallback loop
//! - [`remote`]: archive, upload, trigger and watch a remote build
//! - [`artifact`]: build output descriptor and port detection

pub mod artifact;
pub mod builders;
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod lifecycle;
pub mod progress;
pub mod project;
pub mod remote;
pub mod util;

pub use artifact::{Artifact, PortDetector};
pub use builders::{Builder, BuilderConfig, BuilderRegistry, OutputSinks};
pub use config::{ConfigError, ShipyardConfig};
pub use detection::{Detection, DetectionReason, ProjectDetector};
pub use error::BuildError;
pub use lifecycle::{Application, FallbackOutcome, FallbackRunner, LifecycleExecutor};
pub use progress::{BuildEvent, LoggingHandler, NoOpHandler, ProgressHandler};
pub use remote::{RemoteBuildOrchestrator, RemoteDeployment, RemoteError};
pub use util::{init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
