//! Progress handler trait and events

use std::fmt;
use std::time::Duration;

/// Steps of a remote build, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStep {
    Archive,
    InitUpload,
    Transfer,
    Finalize,
    Trigger,
    Observe,
}

impl fmt::Display for RemoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteStep::Archive => "archive",
            RemoteStep::InitUpload => "init-upload",
            RemoteStep::Transfer => "transfer",
            RemoteStep::Finalize => "finalize",
            RemoteStep::Trigger => "trigger",
            RemoteStep::Observe => "observe",
        };
        f.write_str(name)
    }
}

/// Events emitted while building and deploying
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// The fallback chain to be attempted
    ChainResolved {
        chain: Vec<String>,
        fallback_enabled: bool,
    },

    /// A builder attempt is starting (1-based)
    AttemptStarted {
        builder: String,
        attempt: usize,
        total: usize,
    },

    /// A builder attempt failed
    AttemptFailed {
        builder: String,
        error: String,
        remaining: usize,
        next: Option<String>,
    },

    /// A builder produced an artifact
    BuildSucceeded {
        builder: String,
        artifact_id: String,
        duration: Duration,
    },

    /// A remote build step started
    RemoteStepStarted { step: RemoteStep },

    /// A remote build step finished
    RemoteStepComplete { step: RemoteStep, duration: Duration },

    /// A status poll returned
    StatusObserved {
        deployment_id: String,
        status: String,
    },
}

/// Trait for handling progress events
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &BuildEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &BuildEvent) {}
}
