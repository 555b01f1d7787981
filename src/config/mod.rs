//! Configuration
//!
//! Shared types and errors, JSON file defaults, and startup validation.

pub mod file;
pub mod types;
pub mod validator;

pub use file::{FileConfig, GradeOverrides, RollupOverrides};
pub use types::{GradeConfig, GradeError, Result, RollupConfig};
