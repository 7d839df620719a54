//! Database query functions for the `technicians` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ExpertiseLevel, Technician, TechnicianStatus};

/// Insert a technician in `available` status.
pub async fn insert_technician(
    pool: &PgPool,
    name: &str,
    skill_level: ExpertiseLevel,
) -> Result<Technician> {
    sqlx::query_as::<_, Technician>(
        "INSERT INTO technicians (name, skill_level) VALUES ($1, $2) RETURNING *",
    )
    .bind(name)
    .bind(skill_level)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert technician {name:?}"))
}

/// Fetch a technician by ID.
pub async fn get_technician(pool: &PgPool, id: Uuid) -> Result<Option<Technician>> {
    sqlx::query_as::<_, Technician>("SELECT * FROM technicians WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch technician {id}"))
}

/// List technicians alphabetically.
pub async fn list_technicians(pool: &PgPool) -> Result<Vec<Technician>> {
    sqlx::query_as::<_, Technician>("SELECT * FROM technicians ORDER BY name ASC")
        .fetch_all(pool)
        .await
        .context("failed to list technicians")
}

/// Update a technician's availability.
pub async fn update_technician_status(
    pool: &PgPool,
    id: Uuid,
    status: TechnicianStatus,
) -> Result<Option<Technician>> {
    sqlx::query_as::<_, Technician>(
        "UPDATE technicians SET current_status = $1 WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to update technician {id}"))
}
