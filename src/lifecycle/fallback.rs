//! Fallback-chain retry around the lifecycle executor

use super::{Application, LifecycleExecutor};
use crate::artifact::Artifact;
use crate::builders::OutputSinks;
use crate::error::BuildError;
use crate::progress::{BuildEvent, ProgressHandler};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of a successful chain run
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub artifact: Artifact,
    /// The builder that produced the artifact
    pub builder: String,
    /// Attempts made, including the successful one
    pub attempts: usize,
}

/// Tries builders in chain order, one at a time, until one succeeds
pub struct FallbackRunner {
    executor: Arc<LifecycleExecutor>,
    progress: Arc<dyn ProgressHandler>,
    enabled: bool,
}

impl FallbackRunner {
    pub fn new(executor: Arc<LifecycleExecutor>, progress: Arc<dyn ProgressHandler>) -> Self {
        Self {
            executor,
            progress,
            enabled: true,
        }
    }

    /// With fallback disabled only the first chain entry is attempted
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn fallback_enabled(&self) -> bool {
        self.enabled
    }

    /// The entries that will actually be attempted for `chain`
    pub fn effective_chain<'a>(&self, chain: &'a [String]) -> &'a [String] {
        if self.enabled {
            chain
        } else {
            &chain[..chain.len().min(1)]
        }
    }

    /// Builds `app` with each builder of `chain` in turn.
    ///
    /// Stops at the first success. Configuration errors and cancellation end
    /// the loop immediately. When every entry fails the returned error wraps
    /// the last attempt's error only.
    pub async fn build(
        &self,
        cancel: &CancellationToken,
        app: &Application,
        chain: &[String],
        sinks: &mut OutputSinks,
    ) -> Result<FallbackOutcome, BuildError> {
        let chain = self.effective_chain(chain);
        if chain.is_empty() {
            return Err(BuildError::config("no builders to attempt"));
        }

        self.progress.on_progress(&BuildEvent::ChainResolved {
            chain: chain.to_vec(),
            fallback_enabled: self.enabled,
        });

        let total = chain.len();
        let mut last_error = None;

        for (index, builder) in chain.iter().enumerate() {
            let attempt = index + 1;
            self.progress.on_progress(&BuildEvent::AttemptStarted {
                builder: builder.clone(),
                attempt,
                total,
            });

            let start = Instant::now();
            match self
                .executor
                .build_only(cancel, &app.with_builder(builder), sinks)
                .await
            {
                Ok(artifact) => {
                    self.progress.on_progress(&BuildEvent::BuildSucceeded {
                        builder: builder.clone(),
                        artifact_id: artifact.id.clone(),
                        duration: start.elapsed(),
                    });
                    return Ok(FallbackOutcome {
                        artifact,
                        builder: builder.clone(),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    let remaining = total - attempt;
                    let retryable = e.is_retryable();
                    self.progress.on_progress(&BuildEvent::AttemptFailed {
                        builder: builder.clone(),
                        error: e.to_string(),
                        remaining,
                        next: if retryable {
                            chain.get(attempt).cloned()
                        } else {
                            None
                        },
                    });

                    if !retryable {
                        debug!(builder = %builder, "Error is not retryable, stopping chain");
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) if total == 1 => Err(last),
            Some(last) => Err(BuildError::ChainExhausted {
                attempts: total,
                last: Box::new(last),
            }),
            None => Err(BuildError::config("no builders to attempt")),
        }
    }

    /// Runs the chain, then deploys the artifact with the application's deployer
    pub async fn build_and_deploy(
        &self,
        cancel: &CancellationToken,
        app: &Application,
        chain: &[String],
        sinks: &mut OutputSinks,
    ) -> Result<FallbackOutcome, BuildError> {
        let outcome = self.build(cancel, app, chain, sinks).await?;
        self.executor
            .deploy(cancel, &app.with_builder(&outcome.builder), &outcome.artifact)
            .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::StaticPortDetector;
    use crate::builders::{Builder, BuilderConfig, BuilderRegistry};
    use crate::lifecycle::StaticSecretProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Succeed,
        Fail,
        Misconfigured,
    }

    struct ScriptedBuilder {
        name: String,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
        config: Option<BuilderConfig>,
    }

    #[async_trait]
    impl Builder for ScriptedBuilder {
        fn name(&self) -> &str {
            &self.name
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            let config = self.config.clone().unwrap_or_default();
            match self.behaviour {
                Behaviour::Succeed => Ok(Artifact::new(
                    &self.name,
                    &config.app_name,
                    &config.tag,
                    &config.context,
                )),
                Behaviour::Fail => Err(BuildError::BuildFailed {
                    builder: self.name.clone(),
                    message: format!("{} exploded", self.name),
                    output: String::new(),
                }),
                Behaviour::Misconfigured => Err(BuildError::config("bad settings")),
            }
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<BuildEvent>>,
    }

    impl RecordingHandler {
        fn failures(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    BuildEvent::AttemptFailed { builder, .. } => Some(builder.clone()),
                    _ => None,
                })
                .collect()
        }

        fn attempts(&self) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| matches!(e, BuildEvent::AttemptStarted { .. }))
                .count()
        }
    }

    impl ProgressHandler for RecordingHandler {
        fn on_progress(&self, event: &BuildEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    struct Fixture {
        runner: FallbackRunner,
        handler: Arc<RecordingHandler>,
        calls: Arc<AtomicUsize>,
    }

    fn fixture(builders: &[(&str, Behaviour)]) -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = BuilderRegistry::with_defaults(Arc::new(StaticPortDetector::default()));
        for (name, behaviour) in builders {
            let name = name.to_string();
            let behaviour = *behaviour;
            let calls = calls.clone();
            registry.register(name.clone(), move || {
                Box::new(ScriptedBuilder {
                    name: name.clone(),
                    behaviour,
                    calls: calls.clone(),
                    config: None,
                })
            });
        }
        let executor = Arc::new(LifecycleExecutor::new(
            Arc::new(registry),
            Arc::new(StaticSecretProvider::default()),
        ));
        let handler = Arc::new(RecordingHandler::default());
        Fixture {
            runner: FallbackRunner::new(executor, handler.clone()),
            handler,
            calls,
        }
    }

    fn chain(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn app() -> Application {
        Application::new("", BuilderConfig::new("web"))
    }

    #[tokio::test]
    async fn test_third_builder_succeeds_after_two_failures() {
        let f = fixture(&[
            ("a", Behaviour::Fail),
            ("b", Behaviour::Fail),
            ("c", Behaviour::Succeed),
        ]);
        let outcome = f
            .runner
            .build(
                &CancellationToken::new(),
                &app(),
                &chain(&["a", "b", "c"]),
                &mut OutputSinks::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.builder, "c");
        assert!(outcome.artifact.id.starts_with("c-web-"));
        assert_eq!(f.calls.load(Ordering::SeqCst), 3);
        assert_eq!(f.handler.failures(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_exhausted_chain_wraps_last_error() {
        let f = fixture(&[("a", Behaviour::Fail), ("b", Behaviour::Fail)]);
        let err = f
            .runner
            .build(
                &CancellationToken::new(),
                &app(),
                &chain(&["a", "b"]),
                &mut OutputSinks::default(),
            )
            .await
            .unwrap_err();

        match err {
            BuildError::ChainExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.to_string().contains("b exploded"));
                assert!(!last.to_string().contains("a exploded"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(f.handler.failures().len(), 2);
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let f = fixture(&[("a", Behaviour::Succeed), ("b", Behaviour::Succeed)]);
        let outcome = f
            .runner
            .build(
                &CancellationToken::new(),
                &app(),
                &chain(&["a", "b"]),
                &mut OutputSinks::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.builder, "a");
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_fallback_attempts_only_first() {
        let mut f = fixture(&[("a", Behaviour::Fail), ("b", Behaviour::Succeed)]);
        f.runner = f.runner.with_fallback(false);
        let err = f
            .runner
            .build(
                &CancellationToken::new(),
                &app(),
                &chain(&["a", "b"]),
                &mut OutputSinks::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::BuildFailed { .. }));
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.handler.attempts(), 1);
    }

    #[tokio::test]
    async fn test_configuration_error_is_not_retried() {
        let f = fixture(&[("a", Behaviour::Misconfigured), ("b", Behaviour::Succeed)]);
        let err = f
            .runner
            .build(
                &CancellationToken::new(),
                &app(),
                &chain(&["a", "b"]),
                &mut OutputSinks::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_chain_is_configuration_error() {
        let f = fixture(&[]);
        let err = f
            .runner
            .build(
                &CancellationToken::new(),
                &app(),
                &[],
                &mut OutputSinks::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_build_and_deploy_uses_noop_deployer() {
        let f = fixture(&[("a", Behaviour::Fail), ("b", Behaviour::Succeed)]);
        let outcome = f
            .runner
            .build_and_deploy(
                &CancellationToken::new(),
                &app(),
                &chain(&["a", "b"]),
                &mut OutputSinks::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
    }
}
