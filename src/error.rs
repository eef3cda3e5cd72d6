//! Errors raised by local builds and the lifecycle executor

use thiserror::Error;

/// Errors that can occur while resolving, configuring or running a builder
#[derive(Debug, Error)]
pub enum BuildError {
    /// Missing or invalid configuration; never retried
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested builder is not registered
    #[error("Unknown builder '{name}'{}", suggestion_suffix(.suggestion))]
    UnknownBuilder {
        name: String,
        suggestion: Option<String>,
    },

    /// The build tool ran and failed
    #[error("Builder '{builder}' failed: {message}{}", output_suffix(.output))]
    BuildFailed {
        builder: String,
        message: String,
        output: String,
    },

    /// The build was cancelled by the caller
    #[error("Builder '{builder}' was cancelled")]
    Cancelled { builder: String },

    /// Every builder in the fallback chain failed; carries the last failure only
    #[error("All {attempts} builder attempt(s) failed; last error: {last}")]
    ChainExhausted {
        attempts: usize,
        #[source]
        last: Box<BuildError>,
    },

    /// The secret provider could not supply environment entries
    #[error("Failed to load secrets for '{app}': {message}")]
    Secrets { app: String, message: String },

    /// The deploy capability failed
    #[error("Deploy with '{deployer}' failed: {message}")]
    DeployFailed { deployer: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub fn config(message: impl Into<String>) -> Self {
        BuildError::Configuration(message.into())
    }

    /// Whether the fallback loop may move on to the next builder after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, BuildError::BuildFailed { .. } | BuildError::Io(_))
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Configuration(_)
            | BuildError::UnknownBuilder { .. }
            | BuildError::Secrets { .. } => 2,
            BuildError::ChainExhausted { last, .. } => match last.as_ref() {
                BuildError::Configuration(_) | BuildError::UnknownBuilder { .. } => 2,
                _ => 1,
            },
            _ => 1,
        }
    }
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{}'?)", name),
        None => String::new(),
    }
}

fn output_suffix(output: &str) -> String {
    if output.trim().is_empty() {
        String::new()
    } else {
        format!("\n--- build output (tail) ---\n{}", output.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_builder_with_suggestion() {
        let err = BuildError::UnknownBuilder {
            name: "railpak".to_string(),
            suggestion: Some("railpack".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Unknown builder 'railpak' (did you mean 'railpack'?)"
        );
    }

    #[test]
    fn test_build_failed_includes_output_tail() {
        let err = BuildError::BuildFailed {
            builder: "nixpacks".to_string(),
            message: "exit status 1".to_string(),
            output: "error: no start command\n".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("nixpacks"));
        assert!(msg.contains("no start command"));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(BuildError::BuildFailed {
            builder: "a".into(),
            message: "x".into(),
            output: String::new()
        }
        .is_retryable());
        assert!(!BuildError::config("missing app name").is_retryable());
        assert!(!BuildError::Cancelled {
            builder: "a".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_chain_exhausted_keeps_last_source() {
        use std::error::Error;

        let err = BuildError::ChainExhausted {
            attempts: 2,
            last: Box::new(BuildError::BuildFailed {
                builder: "b".into(),
                message: "boom".into(),
                output: String::new(),
            }),
        };
        let source = err.source().expect("source").to_string();
        assert!(source.contains("'b'"));
        assert_eq!(err.exit_code(), 1);
    }
}
