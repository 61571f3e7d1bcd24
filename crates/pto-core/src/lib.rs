//! Core analysis and orchestration logic for the Parallel Task Orchestrator.
//!
//! Implements the seven components spec.md S4 describes: the Conflict
//! Detector ([`conflict`]), Graph Analyzer ([`graph`]), Parallelism
//! Calculator ([`parallelism`]), Conflict Resolver ([`resolver`]), Readiness
//! Evaluator ([`readiness`]), Worker contract ([`worker`]), and Worker
//! Orchestrator ([`orchestrator`]). Persistence lives in `pto-db`; this crate
//! holds the pure analysis logic and the async control flow built on top of
//! it.

pub mod conflict;
pub mod error;
pub mod events;
pub mod graph;
pub mod orchestrator;
pub mod parallelism;
pub mod readiness;
pub mod resolver;
pub mod worker;

pub use error::PtoError;
