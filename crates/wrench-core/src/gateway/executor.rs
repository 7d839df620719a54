//! Execution requests and classification of executor responses.

use std::fmt::Write;

use serde_json::{Value, json};
use uuid::Uuid;
use wrench_db::models::{PlanStep, StepStatus, WorkOrder};

use super::planner::Classification;
use super::strip_code_fence;

/// One line of the plan as shown to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLine {
    pub step_number: i32,
    pub description: String,
    pub status: StepStatus,
}

/// Everything the executor sees for a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub work_order_id: Uuid,
    pub title: String,
    pub description: String,
    pub classification: Classification,
    pub step_id: Uuid,
    pub step_number: i32,
    pub step_description: String,
    /// The full plan in step_number order, including the current step.
    pub plan: Vec<PlanLine>,
}

impl ExecutionRequest {
    pub fn new(order: &WorkOrder, step: &PlanStep, plan: &[PlanStep]) -> Self {
        Self {
            work_order_id: order.id,
            title: order.title.clone(),
            description: order.description.clone(),
            classification: Classification::of(order),
            step_id: step.id,
            step_number: step.step_number,
            step_description: step.description.clone(),
            plan: plan
                .iter()
                .map(|s| PlanLine {
                    step_number: s.step_number,
                    description: s.description.clone(),
                    status: s.status,
                })
                .collect(),
        }
    }

    /// Render the request as the text block handed to the executor.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Work order {}: {}", self.work_order_id, self.title);
        let _ = writeln!(out, "Description: {}", self.description);
        let _ = writeln!(
            out,
            "Classification: priority={} category={} expertise={}",
            self.classification.priority,
            self.classification.category,
            self.classification.estimated_expertise_level
        );
        let _ = writeln!(out, "\nPlan:");
        for line in &self.plan {
            let marker = if line.step_number == self.step_number {
                ">"
            } else {
                " "
            };
            let _ = writeln!(
                out,
                "{marker} {}. [{}] {}",
                line.step_number, line.status, line.description
            );
        }
        let _ = writeln!(
            out,
            "\nCurrent step {} ({}): {}",
            self.step_number, self.step_id, self.step_description
        );
        out
    }
}

/// Executor verdict for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorOutcome {
    /// A technician must perform the step. `trace` records any actions the
    /// executor already took before deferring.
    Deferred {
        reason: String,
        trace: Option<String>,
    },
    /// The executor performed the step; `log_text` is its report.
    Completed { log_text: String },
}

impl ExecutorOutcome {
    /// Classify a raw executor response.
    ///
    /// Only a JSON object with `"executor": "technician"` and a `reason`
    /// key (optionally inside a fenced code block) is a deferral; a string
    /// `trace` key is kept alongside the reason. Anything else, including
    /// text that is not JSON at all, is a completed step whose log is the
    /// trimmed response.
    pub fn classify(raw: &str) -> Self {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(strip_code_fence(raw)) {
            let to_technician = map.get("executor").and_then(Value::as_str) == Some("technician");
            if let (true, Some(reason)) = (to_technician, map.get("reason")) {
                let reason = match reason {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let trace = map
                    .get("trace")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned);
                return Self::Deferred { reason, trace };
            }
        }
        Self::Completed {
            log_text: raw.trim().to_owned(),
        }
    }

    /// The canonical deferral payload for `reason`.
    pub fn deferral(reason: &str) -> String {
        json!({ "executor": "technician", "reason": reason }).to_string()
    }

    /// A deferral payload carrying the log of actions already taken.
    pub fn deferral_with_trace(reason: &str, trace: &str) -> String {
        json!({ "executor": "technician", "reason": reason, "trace": trace }).to_string()
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }
}
