//! Error taxonomy surfaced by the orchestrator and escalation desk.

use wrench_db::models::VocabularyError;

/// A planner response that cannot be turned into a plan.
///
/// Raised before anything is written, so a malformed planning response
/// never leaves a partial work order or plan behind.
#[derive(Debug, thiserror::Error)]
pub enum PlannerFormatError {
    #[error("planner response is not a JSON plan object: {0}")]
    NotJson(#[from] serde_json::Error),

    #[error("planner response is not a JSON object")]
    NotObject,

    #[error("planner response is missing required key {0:?}")]
    MissingKey(&'static str),

    #[error("planner classification out of vocabulary: {0}")]
    OutOfVocabulary(#[from] VocabularyError),

    #[error("planner returned an empty step list")]
    EmptyPlan,

    #[error("planner step at position {0} has an empty description")]
    BlankStep(usize),
}

/// Errors returned by core operations.
#[derive(Debug, thiserror::Error)]
pub enum WrenchError {
    #[error(transparent)]
    PlannerFormat(#[from] PlannerFormatError),

    #[error("planner call failed: {0:#}")]
    PlannerTransport(anyhow::Error),

    #[error("executor call failed at step {step_number}: {cause:#}")]
    ExecutorTransport {
        step_number: i32,
        cause: anyhow::Error,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl WrenchError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidTransition(message.into())
    }

    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlannerFormat(_) => "planner_format",
            Self::PlannerTransport(_) => "planner_transport",
            Self::ExecutorTransport { .. } => "executor_transport",
            Self::NotFound { .. } => "not_found",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Store(_) => "store",
        }
    }
}
