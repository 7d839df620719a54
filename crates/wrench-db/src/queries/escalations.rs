//! Database query functions for the `escalation_messages` table.

use anyhow::{Context, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{EscalationMessage, EscalationSource, EscalationStatus};

/// Parameters for raising an escalation.
#[derive(Debug, Clone)]
pub struct NewEscalation {
    pub work_order_id: Uuid,
    pub related_step: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub message: String,
    pub source: EscalationSource,
}

/// Insert an escalation in `sent` status.
pub async fn insert_escalation<'e, E>(executor: E, new: &NewEscalation) -> Result<EscalationMessage>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, EscalationMessage>(
        "INSERT INTO escalation_messages (work_order_id, related_step, technician_id, message, source) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(new.work_order_id)
    .bind(new.related_step)
    .bind(new.technician_id)
    .bind(&new.message)
    .bind(new.source)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert escalation for work order {}", new.work_order_id))
}

/// Fetch an escalation by ID.
pub async fn get_escalation(pool: &PgPool, id: Uuid) -> Result<Option<EscalationMessage>> {
    sqlx::query_as::<_, EscalationMessage>("SELECT * FROM escalation_messages WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch escalation {id}"))
}

/// All escalations for a work order, oldest first.
pub async fn list_escalations_for_work_order(
    pool: &PgPool,
    work_order_id: Uuid,
) -> Result<Vec<EscalationMessage>> {
    sqlx::query_as::<_, EscalationMessage>(
        "SELECT * FROM escalation_messages \
         WHERE work_order_id = $1 \
         ORDER BY created_at ASC",
    )
    .bind(work_order_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list escalations for work order {work_order_id}"))
}

/// Escalations across all work orders that are not yet resolved.
pub async fn list_open_escalations(pool: &PgPool) -> Result<Vec<EscalationMessage>> {
    sqlx::query_as::<_, EscalationMessage>(
        "SELECT * FROM escalation_messages \
         WHERE status <> 'resolved' \
         ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list open escalations")
}

/// Move an escalation from `from` to `to` with optimistic locking on the
/// current status. Returns `None` if the status did not match.
pub async fn transition_escalation_status(
    pool: &PgPool,
    id: Uuid,
    from: EscalationStatus,
    to: EscalationStatus,
) -> Result<Option<EscalationMessage>> {
    sqlx::query_as::<_, EscalationMessage>(
        "UPDATE escalation_messages \
         SET status = $1 \
         WHERE id = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(to)
    .bind(id)
    .bind(from)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to move escalation {id} from {from} to {to}"))
}
