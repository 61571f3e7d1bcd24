//! Store Gateway: typed Postgres access to tasks, relationships, impacts,
//! parallelism analyses, execution waves, and build-agent instances.
//!
//! Every higher component (`pto-core`) goes through this crate; no
//! component touches `sqlx` directly. See `pool::run_migrations` for the
//! schema bootstrap and `queries::*` for the per-table access functions.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
