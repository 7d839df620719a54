//! Database query functions for the `inventory_items` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::InventoryItem;

/// Fields for a new stock line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInventoryItem {
    pub name: String,
    pub quantity: i32,
    pub location: String,
    pub unit_cost_cents: Option<i64>,
}

pub async fn insert_inventory_item(pool: &PgPool, new: &NewInventoryItem) -> Result<InventoryItem> {
    sqlx::query_as::<_, InventoryItem>(
        "INSERT INTO inventory_items (name, quantity, location, unit_cost_cents) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(&new.name)
    .bind(new.quantity)
    .bind(&new.location)
    .bind(new.unit_cost_cents)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert inventory item {:?}", new.name))
}

pub async fn get_inventory_item(pool: &PgPool, id: Uuid) -> Result<Option<InventoryItem>> {
    sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch inventory item {id}"))
}

/// All stock, alphabetically.
pub async fn list_inventory_items(pool: &PgPool) -> Result<Vec<InventoryItem>> {
    sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items ORDER BY name ASC, location ASC")
        .fetch_all(pool)
        .await
        .context("failed to list inventory items")
}

/// Case-insensitive substring search on name and location. `None` (or an
/// empty string) matches everything for that field.
pub async fn search_inventory_items(
    pool: &PgPool,
    name: Option<&str>,
    location: Option<&str>,
) -> Result<Vec<InventoryItem>> {
    sqlx::query_as::<_, InventoryItem>(
        "SELECT * FROM inventory_items \
         WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%') \
           AND ($2::text IS NULL OR location ILIKE '%' || $2 || '%') \
         ORDER BY name ASC, location ASC",
    )
    .bind(name.filter(|n| !n.is_empty()))
    .bind(location.filter(|l| !l.is_empty()))
    .fetch_all(pool)
    .await
    .context("failed to search inventory items")
}

/// Add `delta` (possibly negative) to the quantity, clamping at zero.
pub async fn adjust_inventory_quantity(
    pool: &PgPool,
    id: Uuid,
    delta: i32,
) -> Result<Option<InventoryItem>> {
    sqlx::query_as::<_, InventoryItem>(
        "UPDATE inventory_items \
         SET quantity = GREATEST(0, quantity + $2), updated_at = now() \
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(delta)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to adjust quantity of inventory item {id}"))
}

pub async fn set_inventory_reserved(
    pool: &PgPool,
    id: Uuid,
    reserved: bool,
) -> Result<Option<InventoryItem>> {
    sqlx::query_as::<_, InventoryItem>(
        "UPDATE inventory_items SET reserved = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(reserved)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to update reservation of inventory item {id}"))
}
