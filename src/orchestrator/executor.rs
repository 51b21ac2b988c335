//! Step executor: runs one step against its handler with bounded retry.
//!
//! Protocol, per step:
//! - while `retry_count < max_retries`: mark RUNNING and call the handler
//! - success: write the output to the context under the capability's key,
//!   mark COMPLETED
//! - failure: bump `retry_count`, record the error; if attempts remain mark
//!   RETRYING and wait `base_delay * 2^(retry_count - 1)`, else mark FAILED
//!
//! The context is only touched by a successful attempt. Cancellation is
//! observed before each attempt, while the handler runs and during backoff.
//! Every status change is reported to a [`StepObserver`] as it happens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TransitionError;
use crate::handlers::HandlerRegistry;
use crate::task::{Context, Step, StepStatus};

/// Error recorded on a step abandoned because its consumer went away.
pub const CANCELLED_MESSAGE: &str = "execution cancelled";

/// Error recorded on a step whose attempt budget is zero.
pub const NO_ATTEMPTS_MESSAGE: &str = "no attempts allowed (max_retries is 0)";

/// Receives a snapshot of the step after each of its status changes.
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn step_changed(&self, step: &Step);
}

/// Discards every change.
#[async_trait]
impl StepObserver for () {
    async fn step_changed(&self, _step: &Step) {}
}

/// How a call to [`StepExecutor::execute_with_retry`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// Every attempt failed.
    Failed,
    Cancelled,
}

/// Delay before the attempt that follows failure number `retry_count` (1-based).
pub fn backoff_delay(base: Duration, retry_count: u32) -> Duration {
    let shift = retry_count.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << shift)
}

pub struct StepExecutor {
    handlers: Arc<HandlerRegistry>,
    base_delay: Duration,
}

impl StepExecutor {
    pub fn new(handlers: Arc<HandlerRegistry>, base_delay: Duration) -> Self {
        Self {
            handlers,
            base_delay,
        }
    }

    /// Run `step` until it completes, exhausts its retries or is cancelled.
    ///
    /// Errors only when the step is in a state that cannot be run (e.g. it
    /// already finished).
    pub async fn execute_with_retry(
        &self,
        step: &mut Step,
        context: &mut Context,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, TransitionError> {
        self.execute_observed(step, context, cancel, &()).await
    }

    /// [`Self::execute_with_retry`], reporting every status change to `observer`.
    pub async fn execute_observed(
        &self,
        step: &mut Step,
        context: &mut Context,
        cancel: &CancellationToken,
        observer: &dyn StepObserver,
    ) -> Result<StepOutcome, TransitionError> {
        let handler = self.handlers.get(step.capability).clone();

        while step.retry_count < step.max_retries {
            if cancel.is_cancelled() {
                return Self::abandon(step, observer).await;
            }

            advance(step, StepStatus::Running, observer).await?;
            debug!(
                step_id = %step.step_id,
                capability = %step.capability,
                attempt = step.retry_count + 1,
                "Executing step"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = handler.handle(step, context) => Some(result),
            };

            match result {
                None => return Self::abandon(step, observer).await,
                Some(Ok(output)) => {
                    context.insert(step.capability.context_key(), output.clone());
                    step.output = Some(output);
                    advance(step, StepStatus::Completed, observer).await?;
                    info!(step_id = %step.step_id, attempts = step.retry_count + 1, "Step completed");
                    return Ok(StepOutcome::Completed);
                }
                Some(Err(e)) => {
                    step.retry_count += 1;
                    step.error = Some(e.to_string());

                    if step.retry_count < step.max_retries {
                        advance(step, StepStatus::Retrying, observer).await?;
                        let delay = backoff_delay(self.base_delay, step.retry_count);
                        warn!(
                            step_id = %step.step_id,
                            error = %e,
                            retry_attempt = step.retry_count + 1,
                            retry_in_ms = delay.as_millis() as u64,
                            "Step failed, retrying"
                        );
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Self::abandon(step, observer).await,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        advance(step, StepStatus::Failed, observer).await?;
                        error!(
                            step_id = %step.step_id,
                            error = %e,
                            attempts = step.retry_count,
                            "Step failed after exhausting retries"
                        );
                        return Ok(StepOutcome::Failed);
                    }
                }
            }
        }

        // Only reachable with a zero attempt budget.
        step.error = Some(NO_ATTEMPTS_MESSAGE.to_string());
        advance(step, StepStatus::Failed, observer).await?;
        error!(step_id = %step.step_id, "Step has no attempts allowed");
        Ok(StepOutcome::Failed)
    }

    async fn abandon(
        step: &mut Step,
        observer: &dyn StepObserver,
    ) -> Result<StepOutcome, TransitionError> {
        step.error = Some(CANCELLED_MESSAGE.to_string());
        advance(step, StepStatus::Failed, observer).await?;
        warn!(step_id = %step.step_id, "Step abandoned: execution cancelled");
        Ok(StepOutcome::Cancelled)
    }
}

async fn advance(
    step: &mut Step,
    target: StepStatus,
    observer: &dyn StepObserver,
) -> Result<(), TransitionError> {
    step.transition_to(target)?;
    observer.step_changed(step).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::config::HandlerConfig;
    use crate::error::HandlerError;
    use crate::handlers::StepHandler;
    use crate::task::Capability;

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl StepHandler for Flaky {
        fn capability(&self) -> Capability {
            Capability::Retrieve
        }

        async fn handle(&self, _step: &Step, _context: &Context) -> Result<String, HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(HandlerError::Failed(format!("attempt {call} failed")))
            } else {
                Ok("retrieved".to_string())
            }
        }
    }

    fn executor(failures: u32) -> (StepExecutor, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let handlers = HandlerRegistry::builder()
            .register(Arc::new(Flaky {
                failures,
                calls: calls.clone(),
            }))
            .with_builtin_defaults(&HandlerConfig::instant())
            .build()
            .unwrap();
        (
            StepExecutor::new(Arc::new(handlers), Duration::from_millis(100)),
            calls,
        )
    }

    fn retrieve_step() -> Step {
        Step::new("step_001", Capability::Retrieve, "fetch").with_input("query", "q")
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_shift_is_capped() {
        assert_eq!(
            backoff_delay(Duration::from_secs(1), 200),
            Duration::from_secs(1 << 31)
        );
        assert_eq!(backoff_delay(Duration::MAX, 5), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success() {
        let (executor, calls) = executor(0);
        let mut step = retrieve_step();
        let mut context = Context::new();

        let outcome = executor
            .execute_with_retry(&mut step, &mut context, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.retry_count, 0);
        assert!(!step.was_retried());
        assert_eq!(context.get("retrieved_context"), Some("retrieved"));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_failures_with_backoff() {
        let (executor, calls) = executor(2);
        let mut step = retrieve_step();
        let mut context = Context::new();
        let started = Instant::now();

        let outcome = executor
            .execute_with_retry(&mut step, &mut context, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(step.retry_count, 2);
        // 100ms after the first failure, 200ms after the second
        assert_eq!(started.elapsed(), Duration::from_millis(300));
        let statuses: Vec<StepStatus> = step.transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            statuses,
            [
                StepStatus::Running,
                StepStatus::Retrying,
                StepStatus::Running,
                StepStatus::Retrying,
                StepStatus::Running,
                StepStatus::Completed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries() {
        let (executor, calls) = executor(u32::MAX);
        let mut step = retrieve_step();
        let mut context = Context::new();
        let started = Instant::now();

        let outcome = executor
            .execute_with_retry(&mut step, &mut context, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(step.retry_count, step.max_retries);
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("attempt 3 failed"));
        assert!(context.is_empty());
        // no wait after the final failure
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let (executor, calls) = executor(u32::MAX);
        let executor = Arc::new(executor);
        let cancel = CancellationToken::new();

        let run = {
            let executor = executor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut step = retrieve_step();
                let mut context = Context::new();
                let outcome = executor
                    .execute_with_retry(&mut step, &mut context, &cancel)
                    .await
                    .unwrap();
                (outcome, step)
            })
        };

        // inside the first 100ms backoff
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let (outcome, step) = run.await.unwrap();
        assert_eq!(outcome, StepOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some(CANCELLED_MESSAGE));
    }

    /// Keeps every snapshot it is handed.
    #[derive(Default)]
    struct Recorder(std::sync::Mutex<Vec<Step>>);

    #[async_trait]
    impl StepObserver for Recorder {
        async fn step_changed(&self, step: &Step) {
            self.0.lock().unwrap().push(step.clone());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_each_transition_with_progress() {
        let (executor, _) = executor(1);
        let recorder = Recorder::default();
        let mut step = retrieve_step();

        executor
            .execute_observed(&mut step, &mut Context::new(), &CancellationToken::new(), &recorder)
            .await
            .unwrap();

        let seen = recorder.0.lock().unwrap();
        let statuses: Vec<StepStatus> = seen.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            [
                StepStatus::Running,
                StepStatus::Retrying,
                StepStatus::Running,
                StepStatus::Completed,
            ]
        );
        // the retrying snapshot already carries the failed attempt
        assert_eq!(seen[1].retry_count, 1);
        assert_eq!(seen[1].error.as_deref(), Some("attempt 1 failed"));
        assert_eq!(seen[3].output.as_deref(), Some("retrieved"));
    }

    #[tokio::test]
    async fn zero_budget_fails_with_explicit_error() {
        let (executor, calls) = executor(0);
        let mut step = retrieve_step().with_max_retries(0);

        let outcome = executor
            .execute_with_retry(&mut step, &mut Context::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some(NO_ATTEMPTS_MESSAGE));
    }

    #[tokio::test]
    async fn finished_step_cannot_rerun() {
        let (executor, _) = executor(0);
        let mut step = retrieve_step();
        let mut context = Context::new();
        let cancel = CancellationToken::new();
        executor
            .execute_with_retry(&mut step, &mut context, &cancel)
            .await
            .unwrap();

        assert!(
            executor
                .execute_with_retry(&mut step, &mut context, &cancel)
                .await
                .is_err()
        );
    }
}
