//! Query functions, one module per table.
//!
//! Functions that participate in multi-statement transactions are generic
//! over [`sqlx::PgExecutor`] so they accept either `&PgPool` or
//! `&mut *transaction`.

pub mod agent_logs;
pub mod escalations;
pub mod inventory;
pub mod steps;
pub mod technicians;
pub mod work_orders;
