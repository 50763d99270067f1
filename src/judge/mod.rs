//! Toolchain adapters.
//!
//! The engine stays language-agnostic. Adapters define how a submission is
//! written, compiled and loaded as a `CompiledModule`.

pub mod adapter;
pub mod languages;
pub mod registry;
