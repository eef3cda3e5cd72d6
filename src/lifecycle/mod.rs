//! Application lifecycle: resolve a builder, inject secrets, build, deploy
//!
//! [`LifecycleExecutor`] runs one builder for one application.
//! [`FallbackRunner`] wraps it and walks a fallback chain sequentially.

mod executor;
mod fallback;
mod secrets;

pub use executor::{Application, LifecycleExecutor, DEFAULT_DEPLOYER};
pub use fallback::{FallbackOutcome, FallbackRunner};
pub use secrets::{parse_env_file, EnvFileSecretProvider, SecretProvider, StaticSecretProvider};
