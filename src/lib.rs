//! dojobox: a verification engine for learner submissions
//!
//! A submission is compiled in a private workspace, loaded, and probed by
//! a scenario: an ordered list of steps that stops at the first failure.
//! Every step appends learner-facing lines to the verdict.
//!
//! # Architecture
//!
//! ## Core ([`core`])
//! - [`core::types`]: Source units, member handles and values
//! - [`core::module`]: The `CompiledModule` contract
//! - [`core::native`]: In-process modules built from Rust closures
//! - [`core::probe`]: Modules hosted by an external probe process
//!
//! ## Execution ([`exec`])
//! - [`exec::executor`]: Bounded external tool runs
//! - [`exec::builder`]: Workspace, compile and load
//! - [`exec::invoker`]: Member invocation with output capture
//!
//! ## Toolchains ([`judge`])
//! - [`judge::adapter`]: Toolchain adapter contract
//! - [`judge::languages`]: Java and native adapters
//! - [`judge::registry`]: Adapter lookup by language name
//!
//! ## Pipeline ([`pipeline`])
//! - [`pipeline::steps`]: Reusable verification steps
//! - [`pipeline::scenarios`]: Named scenario catalog
//!
//! ## Verdict ([`verdict`]), Safety ([`safety`]), Observability ([`observability`])
//!
//! ## Configuration ([`config`]) and Utilities ([`utils`])

pub mod core;

pub mod exec;

pub mod judge;

pub mod pipeline;

pub mod verdict;

pub mod safety;

pub mod observability;

pub mod config;

pub mod utils;

pub mod engine;

// CLI entrypoint wiring for the dojobox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
pub use engine::Engine;
pub use verdict::verdict::{FailureKind, Verdict};
