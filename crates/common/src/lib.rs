//! Common types and utilities for the exchange crates.
//!
//! This crate provides the validated identifiers and the error taxonomy
//! shared by `config`, `observability`, and `matching-core`.
//!
//! # Modules
//!
//! - [`error`] - Common error types
//! - [`types`] - Shared domain types (`InstrumentId`, `UserId`, `Side`)

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
