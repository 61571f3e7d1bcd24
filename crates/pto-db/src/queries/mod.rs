//! One query module per table family, following this crate's established
//! idiom: typed `sqlx::query_as` reads, typed `sqlx::query` writes, an
//! `anyhow::Result` return with `.context()` at every fallible call.

pub mod acceptance_criteria;
pub mod analysis;
pub mod executions;
pub mod impacts;
pub mod relationships;
pub mod task_lists;
pub mod tasks;
pub mod test_commands;
pub mod waves;
pub mod workers;
