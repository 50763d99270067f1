//! Verdicts
//!
//! The value handed back to callers, and the mapping from engine errors to
//! learner-facing failure classes.

pub mod verdict;
