//! Peephole optimization over IL
//!
//! A registry of (pattern, rewrite) rules runs over the instruction
//! sequence after IL generation and before register allocation. Patterns
//! match positionally by instruction kind; a matched rewrite may still
//! reject on structural grounds. On success the sequence is spliced in
//! place and the scan steps back one position to retry patterns over the
//! new adjacency. Every rewrite strictly shortens the sequence, which
//! bounds the pass at O(n) applications.

use crate::code::ILCode;
use crate::instr::{CallInstr, Instr, InstrKind};
use crate::value::ValueArena;
use log::debug;

/// A rewrite: splice `instrs` around `at` and report success, or leave the
/// sequence untouched and report rejection.
pub type RewriteFn = fn(instrs: &mut Vec<Instr>, at: usize, values: &ValueArena) -> bool;

pub struct PeepholeRule {
    pub name: &'static str,
    pub pattern: Vec<InstrKind>,
    pub rewrite: RewriteFn,
}

/// The rule registry and scan driver
#[derive(Default)]
pub struct Peephole {
    rules: Vec<PeepholeRule>,
}

impl Peephole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_rules() -> Self {
        let mut peephole = Self::new();
        peephole.register(
            "direct-call",
            &[InstrKind::AddrOf, InstrKind::Call],
            collapse_direct_call,
        );
        peephole
    }

    pub fn register(&mut self, name: &'static str, pattern: &[InstrKind], rewrite: RewriteFn) {
        self.rules.push(PeepholeRule {
            name,
            pattern: pattern.to_vec(),
            rewrite,
        });
    }

    /// Run the rules to completion over `code`
    pub fn run(&self, code: &mut ILCode, values: &ValueArena) {
        let instrs = code.instructions_mut();
        let mut i = 0;
        while i < instrs.len() {
            let mut applied = false;
            for rule in &self.rules {
                if i + rule.pattern.len() > instrs.len() {
                    continue;
                }
                let shape_match = rule
                    .pattern
                    .iter()
                    .zip(instrs[i..].iter())
                    .all(|(kind, instr)| kind.matches(instr));
                if !shape_match {
                    continue;
                }
                if !(rule.rewrite)(instrs, i, values) {
                    continue;
                }
                debug!("peephole `{}` applied at {}", rule.name, i);
                // A rewrite can create a new adjacency just before this
                // position; step back and retry.
                i = i.saturating_sub(1);
                applied = true;
                break;
            }
            if !applied {
                i += 1;
            }
        }
    }
}

/// Taking the address of a function and calling through the result
/// collapses into a direct call, skipping the address materialization.
/// Only applies when the addressed value is itself of function type; a
/// function-pointer variable stays an indirect call.
fn collapse_direct_call(instrs: &mut Vec<Instr>, at: usize, values: &ValueArena) -> bool {
    let (addr, call) = match (&instrs[at], &instrs[at + 1]) {
        (Instr::AddrOf(addr), Instr::Call(call)) => (addr, call),
        _ => return false,
    };
    if !values.ctype(addr.var).is_function() {
        return false;
    }
    if call.func() != addr.output {
        return false;
    }

    let direct = CallInstr::new(values, addr.var, call.args().to_vec(), call.ret());
    instrs.splice(at..at + 2, [Instr::Call(direct)]);
    true
}
