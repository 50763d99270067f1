//! Configuration
//!
//! Engine settings, loading, validation, and the shared error taxonomy.

pub mod config;
pub mod types;
pub mod validator;
