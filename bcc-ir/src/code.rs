//! IL instruction sequences
//!
//! `ILCode` owns the ordered, append-only instruction list generated for
//! one function. Its structural equality compares two sequences modulo
//! value identity and exists purely for test assertions.

use crate::instr::Instr;
use crate::value::ValueId;
use std::collections::{HashMap, HashSet};

/// The IL generated for one function
#[derive(Debug, Clone, Default)]
pub struct ILCode {
    instrs: Vec<Instr>,
}

impl ILCode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction
    pub fn add(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn instructions_mut(&mut self) -> &mut Vec<Instr> {
        &mut self.instrs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instr> {
        self.instrs.iter()
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Pretty-print for debugging. Not stable; test with
    /// `structurally_equal` instead.
    pub fn display(&self) -> String {
        self.instrs
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether two sequences are the same shape: equal length, the same
    /// instruction kind at each position, and a consistent one-to-one
    /// correspondence between the values they reference. The same value on
    /// one side must always map to the same value on the other, no value
    /// may be claimed twice, and absent operands only match absent
    /// operands.
    pub fn structurally_equal(&self, other: &ILCode) -> bool {
        if self.instrs.len() != other.instrs.len() {
            return false;
        }

        let mut forward: HashMap<ValueId, ValueId> = HashMap::new();
        let mut claimed: HashSet<ValueId> = HashSet::new();

        let mut corresponds = |a: Option<ValueId>, b: Option<ValueId>| -> bool {
            match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => {
                    if let Some(&mapped) = forward.get(&a) {
                        mapped == b
                    } else if claimed.contains(&b) {
                        false
                    } else {
                        forward.insert(a, b);
                        claimed.insert(b);
                        true
                    }
                }
                _ => false,
            }
        };

        for (lhs, rhs) in self.instrs.iter().zip(&other.instrs) {
            if lhs.kind() != rhs.kind() {
                return false;
            }
            if lhs.targets() != rhs.targets() || lhs.label_name() != rhs.label_name() {
                return false;
            }

            let lhs_ops = lhs.operands();
            let rhs_ops = rhs.operands();
            if lhs_ops.len() != rhs_ops.len() {
                return false;
            }
            for (a, b) in lhs_ops.into_iter().zip(rhs_ops) {
                if !corresponds(a, b) {
                    return false;
                }
            }
        }
        true
    }
}

impl<'a> IntoIterator for &'a ILCode {
    type Item = &'a Instr;
    type IntoIter = std::slice::Iter<'a, Instr>;

    fn into_iter(self) -> Self::IntoIter {
        self.instrs.iter()
    }
}
