//! Banked C Compiler - Common Types and Utilities
//!
//! This crate defines data types that are shared across multiple compiler
//! phases: the C type model, error types, source locations, and label
//! generation.

pub mod error;
pub mod source_loc;
pub mod types;

pub use error::CompilerError;
pub use source_loc::SourceLocation;
pub use types::{CType, LabelGenerator};
