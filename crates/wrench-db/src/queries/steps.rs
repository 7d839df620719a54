//! Database query functions for the `plan_steps` table.
//!
//! Every status change is a conditional `UPDATE ... WHERE status = ...`
//! returning the updated row, so two writers racing on the same step see
//! exactly one winner. A `None` return means the guard did not match.

use anyhow::{Context, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::PlanStep;

/// Insert a step in `pending` status with an `undecided` executor.
pub async fn insert_step<'e, E>(
    executor: E,
    work_order_id: Uuid,
    step_number: i32,
    description: &str,
) -> Result<PlanStep>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PlanStep>(
        "INSERT INTO plan_steps (work_order_id, step_number, description) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(work_order_id)
    .bind(step_number)
    .bind(description)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert step {step_number} for work order {work_order_id}"))
}

/// Fetch a single step by ID.
pub async fn get_step<'e, E>(executor: E, id: Uuid) -> Result<Option<PlanStep>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PlanStep>("SELECT * FROM plan_steps WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("failed to fetch step {id}"))
}

/// List the steps of a work order in execution order.
pub async fn list_steps_for_work_order<'e, E>(executor: E, work_order_id: Uuid) -> Result<Vec<PlanStep>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PlanStep>(
        "SELECT * FROM plan_steps WHERE work_order_id = $1 ORDER BY step_number ASC",
    )
    .bind(work_order_id)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to list steps for work order {work_order_id}"))
}

/// Check-and-set `pending -> in_progress`.
///
/// Only succeeds when no other step of the same work order is in progress
/// and every lower-numbered step is terminal.
pub async fn start_step<'e, E>(executor: E, id: Uuid) -> Result<Option<PlanStep>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PlanStep>(
        "UPDATE plan_steps s \
         SET status = 'in_progress' \
         WHERE s.id = $1 \
           AND s.status = 'pending' \
           AND NOT EXISTS ( \
               SELECT 1 FROM plan_steps o \
               WHERE o.work_order_id = s.work_order_id \
                 AND o.id <> s.id \
                 AND (o.status = 'in_progress' \
                      OR (o.step_number < s.step_number AND o.status = 'pending')) \
           ) \
         RETURNING s.*",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to start step {id}"))
}

/// `in_progress -> success`, performed by the agent.
pub async fn complete_step<'e, E>(executor: E, id: Uuid, result: &str) -> Result<Option<PlanStep>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PlanStep>(
        "UPDATE plan_steps \
         SET status = 'success', executor = 'agent', result = $2, executed_at = now() \
         WHERE id = $1 AND status = 'in_progress' \
         RETURNING *",
    )
    .bind(id)
    .bind(result)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to complete step {id}"))
}

/// Hand an in-progress step to a technician. The status stays
/// `in_progress` until the technician reports back.
pub async fn defer_step<'e, E>(executor: E, id: Uuid, reason: &str) -> Result<Option<PlanStep>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PlanStep>(
        "UPDATE plan_steps \
         SET executor = 'technician', result = $2 \
         WHERE id = $1 AND status = 'in_progress' \
         RETURNING *",
    )
    .bind(id)
    .bind(reason)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to defer step {id}"))
}

/// `in_progress -> failure`, recording the error as the step result.
pub async fn fail_step<'e, E>(executor: E, id: Uuid, error: &str) -> Result<Option<PlanStep>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PlanStep>(
        "UPDATE plan_steps \
         SET status = 'failure', result = $2, executed_at = now() \
         WHERE id = $1 AND status = 'in_progress' \
         RETURNING *",
    )
    .bind(id)
    .bind(error)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to mark step {id} as failed"))
}

/// Record that a technician finished a step out-of-band.
///
/// Accepts a technician-deferred step (`in_progress`) or a `failure` the
/// technician repaired by hand. The result text is replaced only when a
/// note is given.
pub async fn resume_step<'e, E>(executor: E, id: Uuid, note: Option<&str>) -> Result<Option<PlanStep>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PlanStep>(
        "UPDATE plan_steps \
         SET status = 'success', executor = 'technician', \
             result = COALESCE($2, result), executed_at = now() \
         WHERE id = $1 \
           AND ((status = 'in_progress' AND executor = 'technician') OR status = 'failure') \
         RETURNING *",
    )
    .bind(id)
    .bind(note)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to resume step {id}"))
}

/// Delete every step of a work order numbered `from_step_number` or higher.
/// Returns the number of rows removed.
pub async fn delete_steps_from<'e, E>(
    executor: E,
    work_order_id: Uuid,
    from_step_number: i32,
) -> Result<u64>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "DELETE FROM plan_steps WHERE work_order_id = $1 AND step_number >= $2",
    )
    .bind(work_order_id)
    .bind(from_step_number)
    .execute(executor)
    .await
    .with_context(|| {
        format!("failed to delete steps >= {from_step_number} for work order {work_order_id}")
    })?;

    Ok(result.rows_affected())
}

/// Step counts by status for a work order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepProgress {
    pub pending: i64,
    pub in_progress: i64,
    pub success: i64,
    pub failure: i64,
    pub total: i64,
}

impl StepProgress {
    /// Build progress counts from a slice of steps.
    pub fn from_steps(steps: &[PlanStep]) -> Self {
        use crate::models::StepStatus;

        let mut progress = Self::default();
        for step in steps {
            match step.status {
                StepStatus::Pending => progress.pending += 1,
                StepStatus::InProgress => progress.in_progress += 1,
                StepStatus::Success => progress.success += 1,
                StepStatus::Failure => progress.failure += 1,
            }
            progress.total += 1;
        }
        progress
    }
}

/// Get a summary of step counts by status.
pub async fn get_step_progress(pool: &PgPool, work_order_id: Uuid) -> Result<StepProgress> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) \
         FROM plan_steps \
         WHERE work_order_id = $1 \
         GROUP BY status",
    )
    .bind(work_order_id)
    .fetch_all(pool)
    .await
    .context("failed to get step progress")?;

    let mut progress = StepProgress::default();
    for (status, count) in &rows {
        match status.as_str() {
            "pending" => progress.pending = *count,
            "in_progress" => progress.in_progress = *count,
            "success" => progress.success = *count,
            "failure" => progress.failure = *count,
            _ => {}
        }
        progress.total += count;
    }
    Ok(progress)
}
