//! Utilities
//!
//! Output capture and bounded stream collection.

pub mod output;
