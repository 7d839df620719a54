//! Persistence layer for wrench: schema migrations, row models, and query
//! functions over PostgreSQL.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
