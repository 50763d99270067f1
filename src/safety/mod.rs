//! Safety and cleanup
//!
//! Run-scoped workspaces: one directory per compilation, removed with its owner.

pub mod workspace;
