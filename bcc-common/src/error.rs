//! Error handling for the Banked C compiler
//!
//! This module defines the user-facing error types shared across compiler
//! phases. Backend-internal errors (spot and codegen errors) live in the
//! crates that raise them.

use crate::source_loc::SourceLocation;
use thiserror::Error;

/// Compile errors surfaced to the user
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilerError {
    #[error("use of undeclared identifier `{name}`")]
    UndeclaredIdentifier {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("redeclaration of `{name}`")]
    RedeclaredIdentifier {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("internal compiler error: {message}")]
    Internal { message: String },
}

impl CompilerError {
    pub fn undeclared(name: impl Into<String>) -> Self {
        CompilerError::UndeclaredIdentifier {
            name: name.into(),
            location: None,
        }
    }

    pub fn redeclared(name: impl Into<String>) -> Self {
        CompilerError::RedeclaredIdentifier {
            name: name.into(),
            location: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_the_name() {
        let err = CompilerError::undeclared("count");
        assert_eq!(err.to_string(), "use of undeclared identifier `count`");

        let err = CompilerError::redeclared("count");
        assert_eq!(err.to_string(), "redeclaration of `count`");
    }
}
