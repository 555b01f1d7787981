//! Observability
//!
//! Structured audit events for every grading and upload decision.

pub mod audit;
