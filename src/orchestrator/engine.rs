//! Task orchestrator: drives planning and step execution, streaming progress.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::executor::{CANCELLED_MESSAGE, StepExecutor, StepObserver, StepOutcome};
use super::planner::{Planner, StaticPlanner};
use crate::config::{HandlerConfig, OrchestratorConfig};
use crate::error::{OrchestrationError, TaskError};
use crate::handlers::HandlerRegistry;
use crate::task::{
    Capability, Context, InMemoryTaskRegistry, Step, StreamEvent, Task, TaskInput, TaskRegistry,
    TaskStatus, TaskSummary,
};

/// Events of one execution, in emission order. Ends after the terminal event.
pub type EventStream = ReceiverStream<StreamEvent>;

/// The producer holds at most one event the consumer has not taken yet.
const EVENT_BUFFER: usize = 1;

/// Owns task lifecycles. Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct TaskOrchestrator {
    registry: Arc<dyn TaskRegistry>,
    planner: Arc<dyn Planner>,
    executor: Arc<StepExecutor>,
    config: Arc<OrchestratorConfig>,
}

impl TaskOrchestrator {
    pub fn new(
        registry: Arc<dyn TaskRegistry>,
        planner: Arc<dyn Planner>,
        handlers: HandlerRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        let executor = StepExecutor::new(Arc::new(handlers), config.retry_base_delay);
        Self {
            registry,
            planner,
            executor: Arc::new(executor),
            config: Arc::new(config),
        }
    }

    /// In-memory registry, static planner and the built-in handlers.
    pub fn with_builtins(config: OrchestratorConfig, handlers: HandlerConfig) -> Self {
        let planner = StaticPlanner::new(handlers.planning_latency, config.max_retries);
        Self::new(
            Arc::new(InMemoryTaskRegistry::new()),
            Arc::new(planner),
            HandlerRegistry::builtin(&handlers),
            config,
        )
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Register a new PENDING task and return its identifier.
    pub async fn create_task(&self, input: TaskInput) -> String {
        let task = Task::new(input);
        let task_id = task.task_id.clone();
        self.registry.insert(task).await;
        info!(task_id = %task_id, "Created task");
        task_id
    }

    pub async fn get_task_state(&self, task_id: &str) -> Option<Task> {
        self.registry.get(task_id).await
    }

    /// Summaries of every known task, in creation order.
    pub async fn list_tasks(&self) -> Vec<TaskSummary> {
        self.registry
            .list()
            .await
            .iter()
            .map(|task| task.summary(self.config.summary_input_chars))
            .collect()
    }

    /// Run the task's plan from scratch, streaming progress events.
    ///
    /// Unknown or already-executing tasks yield a single ERROR event. The
    /// producer blocks on each emission until the consumer takes the
    /// previous event; dropping the stream cancels the execution.
    pub fn execute_task(&self, task_id: &str) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let this = self.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move { this.drive(task_id, tx).await });
        ReceiverStream::new(rx)
    }

    async fn drive(self, task_id: String, tx: mpsc::Sender<StreamEvent>) {
        let cancel = CancellationToken::new();
        // Stops the watcher (and releases its sender) once this execution ends.
        let _done = cancel.clone().drop_guard();
        watch_consumer(tx.clone(), cancel.clone());

        let input = match self.claim(&task_id).await {
            Ok(input) => input,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Execution rejected");
                let _ = tx.send(StreamEvent::error(&task_id, e.to_string())).await;
                return;
            }
        };

        match self.run(&task_id, &input, &tx, &cancel).await {
            Ok(()) => {}
            Err(OrchestrationError::Cancelled) => {
                warn!(task_id = %task_id, "Event consumer went away, execution cancelled");
                self.mark_failed(&task_id, CANCELLED_MESSAGE).await;
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Task execution failed");
                let message = e.to_string();
                self.mark_failed(&task_id, &message).await;
                let _ = tx.send(StreamEvent::error(&task_id, message)).await;
            }
        }
    }

    /// Reset the task for a new attempt and move it to ANALYZING.
    async fn claim(&self, task_id: &str) -> Result<String, TaskError> {
        self.with_task(task_id, |task| -> Result<String, TaskError> {
            task.begin_execution()?;
            Ok(task.user_input.clone())
        })
        .await?
    }

    async fn run(
        &self,
        task_id: &str,
        input: &str,
        tx: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        let mut plan = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled),
            plan = self.planner.plan(input, task_id) => plan?,
        };
        let total_steps = plan.len();
        info!(task_id = %task_id, steps = total_steps, "Task analyzed");

        let stored = plan.clone();
        self.with_task(task_id, move |task| {
            task.execution_plan = Some(stored);
            task.transition_to(TaskStatus::Executing, None)
        })
        .await??;

        let mut context = Context::new();
        for (index, step) in plan.steps_mut().enumerate() {
            if cancel.is_cancelled() {
                return Err(OrchestrationError::Cancelled);
            }

            self.with_task(task_id, |task| task.current_step_index = index)
                .await?;
            self.emit(tx, StreamEvent::step_started(task_id, step, index + 1, total_steps))
                .await?;

            let mirror = StoredStep {
                orchestrator: self,
                task_id,
                index,
            };
            let outcome = self
                .executor
                .execute_observed(step, &mut context, cancel, &mirror)
                .await?;

            match outcome {
                StepOutcome::Completed => {
                    self.emit(
                        tx,
                        StreamEvent::partial_output(task_id, step, self.config.step_preview_chars),
                    )
                    .await?;
                    self.emit(tx, StreamEvent::step_completed(task_id, step)).await?;
                }
                StepOutcome::Failed => {
                    let message = format!(
                        "Step {} failed: {}",
                        step.step_id,
                        step.error.as_deref().unwrap_or_default()
                    );
                    self.with_task(task_id, move |task| task.fail(message))
                        .await??;
                    self.emit(tx, StreamEvent::step_failed(task_id, step)).await?;
                    return Ok(());
                }
                StepOutcome::Cancelled => return Err(OrchestrationError::Cancelled),
            }
        }

        let final_output = context
            .get(Capability::Generate.context_key())
            .unwrap_or_default()
            .to_string();
        let stored = final_output.clone();
        self.with_task(task_id, move |task| task.complete(stored))
            .await??;
        info!(task_id = %task_id, "Task completed");

        self.emit(
            tx,
            StreamEvent::task_completed(
                task_id,
                &final_output,
                self.config.final_preview_chars,
                total_steps,
            ),
        )
        .await
    }

    /// Hand one event to the consumer, waiting until it has room.
    async fn emit(
        &self,
        tx: &mpsc::Sender<StreamEvent>,
        event: StreamEvent,
    ) -> Result<(), OrchestrationError> {
        tx.send(event)
            .await
            .map_err(|_| OrchestrationError::Cancelled)
    }

    async fn mark_failed(&self, task_id: &str, message: &str) {
        let message = message.to_string();
        let result = self
            .with_task(task_id, move |task| {
                if task.status.is_terminal() {
                    return Ok(());
                }
                task.fail(message)
            })
            .await
            .map_err(OrchestrationError::from)
            .and_then(|r| r.map_err(OrchestrationError::from));
        if let Err(e) = result {
            warn!(task_id = %task_id, error = %e, "Could not mark task failed");
        }
    }

    /// Apply `f` to the stored task and return its result.
    async fn with_task<R, F>(&self, task_id: &str, f: F) -> Result<R, TaskError>
    where
        R: Send,
        F: FnOnce(&mut Task) -> R + Send,
    {
        let mut out = None;
        self.registry
            .update(task_id, Box::new(|task: &mut Task| out = Some(f(task))))
            .await?;
        out.ok_or_else(|| TaskError::NotFound {
            id: task_id.to_string(),
        })
    }
}

/// Mirrors each step transition into the stored task as it happens.
struct StoredStep<'a> {
    orchestrator: &'a TaskOrchestrator,
    task_id: &'a str,
    index: usize,
}

#[async_trait]
impl StepObserver for StoredStep<'_> {
    async fn step_changed(&self, step: &Step) {
        let snapshot = step.clone();
        let index = self.index;
        if let Err(e) = self
            .orchestrator
            .with_task(self.task_id, move |task| task.record_step(index, snapshot))
            .await
        {
            warn!(task_id = %self.task_id, error = %e, "Could not record step state");
        }
    }
}

/// Cancel `cancel` once the receiving half of `tx` is dropped.
fn watch_consumer(tx: mpsc::Sender<StreamEvent>, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tx.closed() => cancel.cancel(),
            _ = cancel.cancelled() => {}
        }
    });
}
