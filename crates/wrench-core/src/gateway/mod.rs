//! Contracts between the core and its two external collaborators.
//!
//! ```text
//! Orchestrator ──PlanRequest──────► PlannerGateway  ──raw text──► parse_* ──► PlannedStep
//!              ──ExecutionRequest─► ExecutorGateway ──raw text──► ExecutorOutcome::classify
//! ```
//!
//! Gateways return the raw response text; all interpretation happens on
//! the core side so every implementation gets the same parsing rules.

pub mod deadline;
pub mod executor;
pub mod planner;

use anyhow::Result;
use async_trait::async_trait;

pub use deadline::DeadlineExecutor;
pub use executor::{ExecutionRequest, ExecutorOutcome, PlanLine};
pub use planner::{
    Classification, CompletedStep, InitialPlan, PlanRequest, PlannedStep, parse_initial_plan,
    parse_replacement_steps,
};

/// Produces plans from ticket text.
#[async_trait]
pub trait PlannerGateway: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Ask for a plan. Errors are transport faults; format problems are
    /// detected by the caller when parsing the returned text.
    async fn plan(&self, request: &PlanRequest) -> Result<String>;
}

/// Performs, or declines to perform, a single plan step.
#[async_trait]
pub trait ExecutorGateway: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    async fn execute(&self, request: &ExecutionRequest) -> Result<String>;
}

// Both gateways are stored as `Arc<dyn _>` by the orchestrator.
const _: () = {
    fn _assert_planner_object_safe(_: &dyn PlannerGateway) {}
    fn _assert_executor_object_safe(_: &dyn ExecutorGateway) {}
};

/// Strip a surrounding Markdown code fence (```` ``` ```` or ```` ```json ````)
/// and whitespace, if present.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") up to the first newline.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
