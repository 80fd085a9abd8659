//! IL values
//!
//! Values are created once by IL generation and referenced by every
//! instruction that touches them, so they live in a per-function arena and
//! are handled through opaque `ValueId`s. Identity is handle identity:
//! two temporaries are never the same value even with identical types.
//! Literals are the exception: they are interned on (type, value) at
//! construction, so equal literals share one handle and can be merged
//! during storage allocation.

use bcc_common::{CType, CompilerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque handle to a value in a `ValueArena`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueId(u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// What kind of value a handle refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Intermediate result with no identity beyond its handle
    Temp,

    /// Compile-time constant in a canonical textual form
    Literal { text: String },

    /// A C variable. The frame offset is a placeholder until storage
    /// allocation assigns real layout.
    Variable { frame_offset: i32 },
}

#[derive(Debug, Clone)]
struct ValueData {
    ctype: CType,
    kind: ValueKind,
}

/// Per-function arena owning all IL values
#[derive(Debug, Default)]
pub struct ValueArena {
    values: Vec<ValueData>,
    literals: HashMap<(CType, String), ValueId>,
}

impl ValueArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, data: ValueData) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(data);
        id
    }

    /// A fresh temporary of the given type
    pub fn new_temp(&mut self, ctype: CType) -> ValueId {
        self.push(ValueData {
            ctype,
            kind: ValueKind::Temp,
        })
    }

    /// The literal with the given type and canonical text.
    ///
    /// Interned: constructing the same (type, value) twice returns the
    /// same handle, so equal literals compare and hash equal.
    pub fn new_literal(&mut self, ctype: CType, text: impl Into<String>) -> ValueId {
        let text = text.into();
        if let Some(&id) = self.literals.get(&(ctype.clone(), text.clone())) {
            return id;
        }
        let id = self.push(ValueData {
            ctype: ctype.clone(),
            kind: ValueKind::Literal { text: text.clone() },
        });
        self.literals.insert((ctype, text), id);
        id
    }

    /// A fresh variable of the given type
    pub fn new_variable(&mut self, ctype: CType) -> ValueId {
        self.push(ValueData {
            ctype,
            kind: ValueKind::Variable { frame_offset: 0 },
        })
    }

    pub fn ctype(&self, id: ValueId) -> &CType {
        &self.values[id.0 as usize].ctype
    }

    pub fn kind(&self, id: ValueId) -> &ValueKind {
        &self.values[id.0 as usize].kind
    }

    pub fn size(&self, id: ValueId) -> u32 {
        self.ctype(id).size_in_bytes()
    }

    pub fn is_literal(&self, id: ValueId) -> bool {
        matches!(self.kind(id), ValueKind::Literal { .. })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Symbol table for the AST -> IL phase
///
/// Maps identifier names to their values (always variables today). One
/// table per lexical scope in the full compiler; the core uses one flat
/// table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    table: HashMap<String, ValueId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an identifier, creating its variable value in `values`.
    pub fn add(
        &mut self,
        name: &str,
        ctype: CType,
        values: &mut ValueArena,
    ) -> Result<ValueId, CompilerError> {
        if self.table.contains_key(name) {
            return Err(CompilerError::redeclared(name));
        }
        let id = values.new_variable(ctype);
        self.table.insert(name.to_string(), id);
        Ok(id)
    }

    /// Look up a declared identifier.
    pub fn lookup(&self, name: &str) -> Result<ValueId, CompilerError> {
        self.table
            .get(name)
            .copied()
            .ok_or_else(|| CompilerError::undeclared(name))
    }
}
