//! Database module for the PostgreSQL store.
//!
//! This module provides connectivity, schema bootstrap, row models, and
//! queries for PostgreSQL using SQLx.

pub mod models;
pub mod pool;
pub mod queries;
pub mod schema;

pub use pool::{create_pool, DbPool};
pub use schema::ensure_schema;
