//! Database query functions for the `work_orders` table.

use anyhow::{Context, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Category, ExpertiseLevel, Priority, WorkOrder, WorkOrderStatus};

/// Parameters for inserting a classified work order.
#[derive(Debug, Clone)]
pub struct NewWorkOrder {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    pub estimated_expertise_level: ExpertiseLevel,
}

/// Insert a new work order in `pending` status.
pub async fn insert_work_order<'e, E>(executor: E, new: &NewWorkOrder) -> Result<WorkOrder>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, WorkOrder>(
        "INSERT INTO work_orders (title, description, priority, category, estimated_expertise_level) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.priority)
    .bind(new.category)
    .bind(new.estimated_expertise_level)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert work order {:?}", new.title))
}

/// Fetch a work order by ID.
pub async fn get_work_order<'e, E>(executor: E, id: Uuid) -> Result<Option<WorkOrder>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, WorkOrder>("SELECT * FROM work_orders WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("failed to fetch work order {id}"))
}

/// List all work orders, newest first.
pub async fn list_work_orders(pool: &PgPool) -> Result<Vec<WorkOrder>> {
    sqlx::query_as::<_, WorkOrder>("SELECT * FROM work_orders ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
        .context("failed to list work orders")
}

/// Move a work order to `to` if its current status is one of `from`.
///
/// Returns `None` when the work order does not exist or its status did not
/// match. Always bumps `updated_at` on success.
pub async fn transition_work_order_status<'e, E>(
    executor: E,
    id: Uuid,
    from: &[WorkOrderStatus],
    to: WorkOrderStatus,
) -> Result<Option<WorkOrder>>
where
    E: PgExecutor<'e>,
{
    let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
    sqlx::query_as::<_, WorkOrder>(
        "UPDATE work_orders \
         SET status = $1, updated_at = now() \
         WHERE id = $2 AND status = ANY($3) \
         RETURNING *",
    )
    .bind(to)
    .bind(id)
    .bind(&from)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to move work order {id} to {to}"))
}

/// Bump `updated_at` without changing anything else.
pub async fn touch_work_order<'e, E>(executor: E, id: Uuid) -> Result<Option<WorkOrder>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, WorkOrder>(
        "UPDATE work_orders SET updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to touch work order {id}"))
}

/// Set the assigned technician of a work order.
pub async fn assign_technician(
    pool: &PgPool,
    id: Uuid,
    technician_id: Uuid,
) -> Result<Option<WorkOrder>> {
    sqlx::query_as::<_, WorkOrder>(
        "UPDATE work_orders \
         SET assigned_technician = $1, updated_at = now() \
         WHERE id = $2 \
         RETURNING *",
    )
    .bind(technician_id)
    .bind(id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to assign technician {technician_id} to work order {id}"))
}
