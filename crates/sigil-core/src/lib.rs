//! Core configuration, compiled access patterns, and error types for Sigil.
//!
//! This crate holds the pieces shared by the signature verifier and the
//! access/authorization gates: the [`SigilConfig`] loaded from a JSON file and
//! environment variables, the [`Pattern`] and [`PatternSet`] regex wrappers
//! used for path, IP, and per-account ACL matching, and the [`SigilError`]
//! type for configuration failures.

mod config;
mod error;
mod pattern;

pub use config::{AccessConfig, SigilConfig, SignatureConfig};
pub use error::{SigilError, SigilResult};
pub use pattern::{Pattern, PatternSet};
