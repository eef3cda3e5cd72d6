//! Progress reporting for builds and remote deployments

mod handler;
mod logging;

pub use handler::{BuildEvent, NoOpHandler, ProgressHandler, RemoteStep};
pub use logging::LoggingHandler;
