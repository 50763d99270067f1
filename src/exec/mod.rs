//! Execution control
//!
//! Builds submissions into compiled units and invokes their members.

pub mod builder;
pub mod executor;
pub mod invoker;
