//! Database query functions for the `agent_logs` table.

use anyhow::{Context, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{AgentLog, LogSource, LogType};

/// Parameters for appending a log entry.
#[derive(Debug, Clone)]
pub struct NewAgentLog {
    pub work_order_id: Uuid,
    pub related_step: Option<Uuid>,
    pub agent_action: String,
    pub result: String,
    pub source: LogSource,
    pub log_type: LogType,
}

/// Append a log entry. Log rows are never updated afterwards.
pub async fn insert_agent_log<'e, E>(executor: E, new: &NewAgentLog) -> Result<AgentLog>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AgentLog>(
        "INSERT INTO agent_logs (work_order_id, related_step, agent_action, result, source, log_type) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(new.work_order_id)
    .bind(new.related_step)
    .bind(&new.agent_action)
    .bind(&new.result)
    .bind(new.source)
    .bind(new.log_type)
    .fetch_one(executor)
    .await
    .with_context(|| {
        format!(
            "failed to insert {} log for work order {}",
            new.log_type, new.work_order_id
        )
    })
}

/// Fetch a single log entry.
pub async fn get_agent_log(pool: &PgPool, id: Uuid) -> Result<Option<AgentLog>> {
    sqlx::query_as::<_, AgentLog>("SELECT * FROM agent_logs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch log {id}"))
}

/// All log entries for a work order, newest first.
pub async fn list_logs_for_work_order(pool: &PgPool, work_order_id: Uuid) -> Result<Vec<AgentLog>> {
    sqlx::query_as::<_, AgentLog>(
        "SELECT * FROM agent_logs \
         WHERE work_order_id = $1 \
         ORDER BY recorded_at DESC, id DESC",
    )
    .bind(work_order_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list logs for work order {work_order_id}"))
}

/// Log entries attached to a single step, oldest first.
pub async fn list_logs_for_step(pool: &PgPool, step_id: Uuid) -> Result<Vec<AgentLog>> {
    sqlx::query_as::<_, AgentLog>(
        "SELECT * FROM agent_logs WHERE related_step = $1 ORDER BY recorded_at ASC",
    )
    .bind(step_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list logs for step {step_id}"))
}
