//! Banked C Compiler - Intermediate Language
//!
//! This crate defines the IL sitting between AST lowering and final
//! assembly: typed values and the symbol table, the instruction sequence,
//! the per-instruction code-generation contract, and the peephole pass
//! that rewrites instruction sequences before register allocation.
//!
//! The global register allocator is a consumer of this crate: it reads
//! each instruction's inputs, outputs, clobbers and placement preferences,
//! solves for a value-to-spot assignment, and then asks every instruction
//! to emit itself against that assignment.

pub mod code;
pub mod instr;
pub mod peephole;
pub mod value;

mod emit_tests;

pub use code::ILCode;
pub use instr::{
    mul_strategy, AddrOfInstr, BinInstr, CallInstr, CondJumpInstr, EmitCtx, Instr, InstrKind,
    JumpInstr, LabelInstr, MulInstr, MulStrategy, ReturnInstr, SetInstr, SpotMap, UnInstr,
};
pub use peephole::{Peephole, PeepholeRule, RewriteFn};
pub use value::{SymbolTable, ValueArena, ValueId, ValueKind};
