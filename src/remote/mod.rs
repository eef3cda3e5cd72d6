//! Remote builds: upload the source and let the managed service build it

pub mod archive;
pub mod client;
pub mod error;
mod mock;
pub mod orchestrator;
pub mod poll;
pub mod sse;
pub mod status;

pub use archive::{create_archive, SourceArchive};
pub use client::{HttpRemoteService, LogReader, RemoteBuildService, UploadSession};
pub use error::{RemoteError, RemoteResult};
pub use mock::MockRemoteService;
pub use orchestrator::{RemoteBuildOrchestrator, RemoteDeployment};
pub use poll::StatusPoller;
pub use status::{DeploymentRecord, DeploymentStatus, FailureDetails};
