//! Common types used throughout the compiler
//!
//! This module defines the C type model shared by the IL and code
//! generation phases, plus the label generator used when emitting
//! assembly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label identifier for code generation
pub type LabelId = u32;

/// A C type, as seen by the IL and backend.
///
/// The machine is 16-bit with banked addressing: `int` is two bytes, `long`
/// is four, and pointers come in a near (in-bank, two byte) and far
/// (banked, four byte) flavor. Code generation mostly cares about
/// `size_in_bytes`; structural equality matters where full type matching
/// does (literal deduplication).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CType {
    Void,
    /// _Bool (one byte)
    Bool,
    /// char (one byte)
    Char { signed: bool },
    /// short and int (two bytes, the native word)
    Int { signed: bool },
    /// long (four bytes, stored as two words)
    Long { signed: bool },
    /// Pointer within the current bank (two bytes)
    NearPointer(Box<CType>),
    /// Banked pointer (four bytes: low word address, high word bank)
    FarPointer(Box<CType>),
    /// Function type; a bare function value is a two-byte in-bank address
    Function {
        ret: Box<CType>,
        params: Vec<CType>,
    },
    Struct {
        name: String,
        fields: Vec<(String, CType)>,
    },
}

impl CType {
    /// The result of sizeof on this type
    pub fn size_in_bytes(&self) -> u32 {
        match self {
            CType::Void => 0,
            CType::Bool | CType::Char { .. } => 1,
            CType::Int { .. } => 2,
            CType::Long { .. } => 4,
            CType::NearPointer(_) => 2,
            CType::FarPointer(_) => 4,
            CType::Function { .. } => 2,
            CType::Struct { fields, .. } => {
                fields.iter().map(|(_, t)| t.size_in_bytes()).sum()
            }
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, CType::Void)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, CType::Function { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::NearPointer(_) | CType::FarPointer(_))
    }

    /// The type this pointer refers to, if this is a pointer
    pub fn pointee(&self) -> Option<&CType> {
        match self {
            CType::NearPointer(t) | CType::FarPointer(t) => Some(t),
            _ => None,
        }
    }

    /// The function type reached by calling a value of this type: the type
    /// itself for a function, the pointee for a pointer to function.
    pub fn function_type(&self) -> Option<&CType> {
        match self {
            CType::Function { .. } => Some(self),
            CType::NearPointer(t) | CType::FarPointer(t) if t.is_function() => Some(t),
            _ => None,
        }
    }

    /// Return type of a function type
    pub fn return_type(&self) -> Option<&CType> {
        match self {
            CType::Function { ret, .. } => Some(ret),
            _ => None,
        }
    }

    /// Convenience constructor for the default signed int
    pub fn int() -> Self {
        CType::Int { signed: true }
    }

    /// Convenience constructor for signed char
    pub fn char() -> Self {
        CType::Char { signed: true }
    }

    /// Convenience constructor for signed long
    pub fn long() -> Self {
        CType::Long { signed: true }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Void => write!(f, "void"),
            CType::Bool => write!(f, "_Bool"),
            CType::Char { signed: true } => write!(f, "char"),
            CType::Char { signed: false } => write!(f, "unsigned char"),
            CType::Int { signed: true } => write!(f, "int"),
            CType::Int { signed: false } => write!(f, "unsigned int"),
            CType::Long { signed: true } => write!(f, "long"),
            CType::Long { signed: false } => write!(f, "unsigned long"),
            CType::NearPointer(t) => write!(f, "{t} *"),
            CType::FarPointer(t) => write!(f, "{t} far *"),
            CType::Function { ret, params } => {
                write!(f, "{ret} (")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            CType::Struct { name, .. } => write!(f, "struct {name}"),
        }
    }
}

/// Label generator for code generation
#[derive(Debug, Clone, Default)]
pub struct LabelGenerator {
    next_id: LabelId,
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Generate a new unique label
    pub fn new_label(&mut self) -> String {
        let label = format!("L{}", self.next_id);
        self.next_id += 1;
        label
    }

    /// Generate a new label with a prefix
    pub fn new_label_with_prefix(&mut self, prefix: &str) -> String {
        let label = format!("{}_{}", prefix, self.next_id);
        self.next_id += 1;
        label
    }
}
