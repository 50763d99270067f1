//! Language-agnostic runtime core.
//!
//! Shared vocabulary (source units, values, member handles) and the
//! `CompiledModule` contract that every loaded submission satisfies,
//! whether it lives in-process or behind a probe process.

pub mod module;
pub mod native;
pub mod probe;
pub mod types;
