//! Observability
//!
//! Structured audit events for every verification request.

pub mod audit;
