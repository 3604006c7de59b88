//! # Postgres
//!
//! PostgreSQL persistence for the availability engine: connection pool,
//! embedded migrations and the `Store` implementation.

/// Connection pool and migrations
pub mod database;

/// sqlx-backed store
mod pg_store;
pub use pg_store::*;
