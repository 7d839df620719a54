//! Issue recovery: replace the unexecuted tail of a plan.
//!
//! The planner is consulted before anything is deleted, and the delete and
//! insert commit together, so a failed or malformed planning response
//! leaves the existing plan untouched.

use uuid::Uuid;

use wrench_db::models::{LogSource, LogType, PlanStep, StepStatus};

use crate::error::WrenchError;
use crate::gateway::{Classification, CompletedStep, PlanRequest, parse_replacement_steps};
use crate::orchestrator::Orchestrator;

impl Orchestrator {
    /// Discard every step numbered `from_step_number` or higher and replace
    /// them with a fresh sub-plan for `issue`, numbered contiguously from
    /// `from_step_number`.
    ///
    /// Successful steps below `from_step_number` are handed to the planner
    /// as context. A `completed` work order is reopened.
    pub async fn regenerate(
        &self,
        work_order_id: Uuid,
        issue: &str,
        from_step_number: i32,
    ) -> Result<Vec<PlanStep>, WrenchError> {
        if from_step_number < 1 {
            return Err(WrenchError::invalid(format!(
                "step numbers start at 1, got {from_step_number}"
            )));
        }
        let order = self.load_work_order(work_order_id).await?;
        let steps = self.store.list_steps(work_order_id).await?;
        if !steps.iter().any(|s| s.step_number == from_step_number) {
            return Err(WrenchError::invalid(format!(
                "work order {work_order_id} has no step {from_step_number}"
            )));
        }

        let completed: Vec<CompletedStep> = steps
            .iter()
            .filter(|s| s.step_number < from_step_number && s.status == StepStatus::Success)
            .map(|s| CompletedStep {
                step_number: s.step_number,
                description: s.description.clone(),
                result: s.result.clone(),
            })
            .collect();

        let request = PlanRequest::Regenerate {
            title: order.title.clone(),
            description: order.description.clone(),
            classification: Classification::of(&order),
            completed,
            issue: issue.to_owned(),
            floor: from_step_number,
        };

        let replacement = match self.planner.plan(&request).await {
            Ok(raw) => parse_replacement_steps(&raw, from_step_number).map_err(WrenchError::from),
            Err(cause) => Err(WrenchError::PlannerTransport(cause)),
        };
        let replacement = match replacement {
            Ok(steps) => steps,
            Err(err) => {
                tracing::error!(
                    work_order_id = %work_order_id,
                    from_step_number,
                    error = %err,
                    "plan regeneration failed"
                );
                self.log(
                    &order,
                    None,
                    LogSource::Agent,
                    LogType::Error,
                    format!("Plan regeneration from step {from_step_number} failed"),
                    err.to_string(),
                )
                .await?;
                return Err(err);
            }
        };

        let (order, inserted) = self
            .store
            .replace_tail(work_order_id, from_step_number, &replacement)
            .await?
            .ok_or_else(|| WrenchError::not_found("work order", work_order_id))?;

        let removed = steps
            .iter()
            .filter(|s| s.step_number >= from_step_number)
            .count();
        let last = from_step_number + inserted.len() as i32 - 1;
        self.log(
            &order,
            None,
            LogSource::Technician,
            LogType::Warning,
            format!("Issue reported at step {from_step_number}: {issue}"),
            format!(
                "Replaced {removed} steps with {} new steps ({from_step_number}..={last})",
                inserted.len()
            ),
        )
        .await?;
        tracing::info!(
            work_order_id = %work_order_id,
            from_step_number,
            removed,
            inserted = inserted.len(),
            status = %order.status,
            "plan regenerated"
        );

        Ok(inserted)
    }
}
