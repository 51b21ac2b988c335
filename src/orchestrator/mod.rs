//! Orchestration: planning, step execution with retry, and the task driver.
//!
//! - `planner`: turns task text into an `ExecutionPlan`
//! - `executor`: runs one step with bounded retry and exponential backoff
//! - `engine`: `TaskOrchestrator`, which drives plans and streams events

pub mod engine;
pub mod executor;
pub mod planner;

pub use engine::{EventStream, TaskOrchestrator};
pub use executor::{CANCELLED_MESSAGE, StepExecutor, StepOutcome, backoff_delay};
pub use planner::{Planner, StaticPlanner};
