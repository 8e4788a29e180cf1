//! Task-level orchestration: configuration, sequential expert runs and the
//! persisted TaskSummary.

pub mod config;
mod report;
mod runner;

pub use config::{DEFAULT_TASK_OUTPUT, TaskConfig, TaskConfigError, TaskReferences};
pub use report::{ScopeOutcome, ScopeReport, TaskSummary, aggregate_scope, render_human_summary};
pub use runner::TaskRunner;
