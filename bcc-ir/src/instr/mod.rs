//! IL instructions
//!
//! Every instruction kind implements one contract: it declares the values
//! it reads and writes, the spots it destroys, and its placement
//! preferences and conflicts, and it emits final assembly once the
//! register allocator has fixed a spot for every value. Instructions never
//! choose spots themselves.
//!
//! The kinds form a closed set, so the contract is a plain enum with
//! per-kind payload structs rather than a trait object hierarchy.

pub mod control;
pub mod math;
pub mod value_ops;

pub use control::{CallInstr, CondJumpInstr, JumpInstr, LabelInstr, ReturnInstr};
pub use math::{mul_strategy, BinInstr, MulInstr, MulStrategy, UnInstr};
pub use value_ops::{AddrOfInstr, SetInstr};

use crate::value::{ValueArena, ValueId};
use bcc_codegen::{AsmCode, AsmInst, CodegenError, Spot};
use std::collections::HashMap;
use std::fmt;

/// The allocator's final value-to-spot assignment
pub type SpotMap = HashMap<ValueId, Spot>;

/// Everything an instruction needs to emit itself
///
/// `get_temp_register(excluding, preferring)` yields a register not bound
/// to any currently live value, never one of `excluding`, and one of
/// `preferring` when possible. `home_spots` holds each value's long-term
/// (spill) storage location.
pub struct EmitCtx<'a> {
    pub values: &'a ValueArena,
    pub spotmap: &'a SpotMap,
    pub home_spots: &'a SpotMap,
    pub get_temp_register: &'a mut dyn FnMut(&[Spot], &[Spot]) -> Spot,
    pub out: &'a mut AsmCode,
}

impl EmitCtx<'_> {
    pub fn spot(&self, value: ValueId) -> Spot {
        self.spotmap
            .get(&value)
            .cloned()
            .expect("register allocation left a value without a spot")
    }

    pub fn home_spot(&self, value: ValueId) -> Spot {
        self.home_spots
            .get(&value)
            .cloned()
            .expect("value has no home spot")
    }

    pub fn temp_register(&mut self, excluding: &[Spot], preferring: &[Spot]) -> Spot {
        (self.get_temp_register)(excluding, preferring)
    }
}

/// Move `src` to `dst` through a relay register, one word at a time for
/// widths beyond a register.
pub(crate) fn emit_relay_move(
    out: &mut AsmCode,
    dst: &Spot,
    src: &Spot,
    size: u32,
    relay: &Spot,
) -> Result<(), CodegenError> {
    if size <= 2 {
        out.add(AsmInst::Mov {
            dst: relay.clone(),
            src: src.clone(),
            size,
        });
        out.add(AsmInst::Mov {
            dst: dst.clone(),
            src: relay.clone(),
            size,
        });
    } else {
        let mut offset = 0;
        while (offset as u32) < size {
            let src_word = if offset == 0 {
                src.clone()
            } else {
                src.shift(offset, None)?
            };
            let dst_word = if offset == 0 {
                dst.clone()
            } else {
                dst.shift(offset, None)?
            };
            out.add(AsmInst::Mov {
                dst: relay.clone(),
                src: src_word,
                size: 2,
            });
            out.add(AsmInst::Mov {
                dst: dst_word,
                src: relay.clone(),
                size: 2,
            });
            offset += 2;
        }
    }
    Ok(())
}

/// Instruction kind tag, used as a peephole pattern element.
///
/// The trailing entries are pattern groups: `CondJump` matches either
/// conditional jump, `Arith` matches the whole arithmetic family, `Any`
/// matches everything. A group never appears as a concrete instruction's
/// own kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrKind {
    Label,
    Jump,
    JumpZero,
    JumpNotZero,
    Return,
    Call,
    Set,
    AddrOf,
    Add,
    Sub,
    Mul,
    ShiftLeft,
    ShiftRight,
    Div,
    Mod,
    Neg,
    Not,
    // Pattern groups
    CondJump,
    Arith,
    Any,
}

impl InstrKind {
    /// Whether this pattern element matches the given instruction
    pub fn matches(self, instr: &Instr) -> bool {
        let kind = instr.kind();
        match self {
            InstrKind::Any => true,
            InstrKind::CondJump => {
                matches!(kind, InstrKind::JumpZero | InstrKind::JumpNotZero)
            }
            InstrKind::Arith => matches!(
                kind,
                InstrKind::Add
                    | InstrKind::Sub
                    | InstrKind::Mul
                    | InstrKind::ShiftLeft
                    | InstrKind::ShiftRight
                    | InstrKind::Div
                    | InstrKind::Mod
                    | InstrKind::Neg
                    | InstrKind::Not
            ),
            exact => exact == kind,
        }
    }
}

/// One IL instruction
#[derive(Debug, Clone)]
pub enum Instr {
    Label(LabelInstr),
    Jump(JumpInstr),
    JumpZero(CondJumpInstr),
    JumpNotZero(CondJumpInstr),
    Return(ReturnInstr),
    Call(CallInstr),
    Set(SetInstr),
    AddrOf(AddrOfInstr),
    Add(BinInstr),
    Sub(BinInstr),
    Mul(MulInstr),
    ShiftLeft(BinInstr),
    ShiftRight(BinInstr),
    Div(BinInstr),
    Mod(BinInstr),
    Neg(UnInstr),
    Not(UnInstr),
}

impl Instr {
    pub fn kind(&self) -> InstrKind {
        match self {
            Instr::Label(_) => InstrKind::Label,
            Instr::Jump(_) => InstrKind::Jump,
            Instr::JumpZero(_) => InstrKind::JumpZero,
            Instr::JumpNotZero(_) => InstrKind::JumpNotZero,
            Instr::Return(_) => InstrKind::Return,
            Instr::Call(_) => InstrKind::Call,
            Instr::Set(_) => InstrKind::Set,
            Instr::AddrOf(_) => InstrKind::AddrOf,
            Instr::Add(_) => InstrKind::Add,
            Instr::Sub(_) => InstrKind::Sub,
            Instr::Mul(_) => InstrKind::Mul,
            Instr::ShiftLeft(_) => InstrKind::ShiftLeft,
            Instr::ShiftRight(_) => InstrKind::ShiftRight,
            Instr::Div(_) => InstrKind::Div,
            Instr::Mod(_) => InstrKind::Mod,
            Instr::Neg(_) => InstrKind::Neg,
            Instr::Not(_) => InstrKind::Not,
        }
    }

    /// Values read, in fixed order. `None` marks an optional operand slot.
    pub fn inputs(&self) -> Vec<Option<ValueId>> {
        match self {
            Instr::Label(_) | Instr::Jump(_) => vec![],
            Instr::JumpZero(j) | Instr::JumpNotZero(j) => vec![Some(j.cond)],
            Instr::Return(r) => vec![r.value],
            Instr::Call(c) => {
                let mut inputs = vec![Some(c.func())];
                inputs.extend(c.args().iter().map(|&a| Some(a)));
                inputs
            }
            Instr::Set(s) => vec![Some(s.arg)],
            Instr::AddrOf(a) => vec![Some(a.var)],
            Instr::Add(b)
            | Instr::Sub(b)
            | Instr::ShiftLeft(b)
            | Instr::ShiftRight(b)
            | Instr::Div(b)
            | Instr::Mod(b) => vec![Some(b.arg1), Some(b.arg2)],
            Instr::Mul(m) => vec![Some(m.arg1), Some(m.arg2)],
            Instr::Neg(u) | Instr::Not(u) => vec![Some(u.arg)],
        }
    }

    /// Values written
    pub fn outputs(&self) -> Vec<ValueId> {
        match self {
            Instr::Label(_)
            | Instr::Jump(_)
            | Instr::JumpZero(_)
            | Instr::JumpNotZero(_)
            | Instr::Return(_) => vec![],
            Instr::Call(c) => c.outputs(),
            Instr::Set(s) => vec![s.output],
            Instr::AddrOf(a) => vec![a.output],
            Instr::Add(b)
            | Instr::Sub(b)
            | Instr::ShiftLeft(b)
            | Instr::ShiftRight(b)
            | Instr::Div(b)
            | Instr::Mod(b) => vec![b.output],
            Instr::Mul(m) => vec![m.output],
            Instr::Neg(u) | Instr::Not(u) => vec![u.output],
        }
    }

    /// Spots destroyed as a side effect, beyond the declared outputs
    pub fn clobbers(&self) -> Vec<Spot> {
        match self {
            Instr::Return(r) => r.clobbers(),
            Instr::Call(c) => c.clobbers(),
            Instr::Mul(m) => m.clobbers(),
            Instr::ShiftLeft(_) | Instr::ShiftRight(_) => math::shift_clobbers(),
            Instr::Div(_) | Instr::Mod(_) => math::div_mod_clobbers(),
            _ => vec![],
        }
    }

    /// Preferred spots per value, most preferred first
    pub fn abs_spot_pref(&self) -> HashMap<ValueId, Vec<Spot>> {
        match self {
            Instr::Return(r) => r.abs_spot_pref(),
            Instr::Call(c) => c.abs_spot_pref(),
            Instr::Add(b) | Instr::Sub(b) => math::add_sub_abs_pref(b),
            Instr::Mul(m) => m.abs_spot_pref(),
            Instr::ShiftLeft(b) | Instr::ShiftRight(b) => math::shift_abs_pref(b),
            Instr::Div(b) => math::div_mod_abs_pref(b, false),
            Instr::Mod(b) => math::div_mod_abs_pref(b, true),
            _ => HashMap::new(),
        }
    }

    /// Output values that should share a spot with an input value
    pub fn rel_spot_pref(&self) -> HashMap<ValueId, Vec<ValueId>> {
        match self {
            Instr::Set(s) => HashMap::from([(s.output, vec![s.arg])]),
            Instr::Add(b) | Instr::Sub(b) => {
                HashMap::from([(b.output, vec![b.arg1, b.arg2])])
            }
            Instr::ShiftLeft(b) | Instr::ShiftRight(b) => {
                HashMap::from([(b.output, vec![b.arg1])])
            }
            Instr::Neg(u) | Instr::Not(u) => HashMap::from([(u.output, vec![u.arg])]),
            _ => HashMap::new(),
        }
    }

    /// Spots a value must not occupy
    pub fn abs_spot_conf(&self) -> HashMap<ValueId, Vec<Spot>> {
        match self {
            Instr::Call(c) => c.abs_spot_conf(),
            Instr::ShiftLeft(b) | Instr::ShiftRight(b) => math::shift_abs_conf(b),
            Instr::Div(b) | Instr::Mod(b) => math::div_mod_abs_conf(b),
            _ => HashMap::new(),
        }
    }

    /// Values whose pointee memory is read
    pub fn indirect_read(&self) -> Vec<ValueId> {
        match self {
            Instr::Call(c) => c.args().to_vec(),
            _ => vec![],
        }
    }

    /// Values whose pointee memory is written
    pub fn indirect_write(&self) -> Vec<ValueId> {
        match self {
            Instr::Call(c) => c.args().to_vec(),
            _ => vec![],
        }
    }

    /// Jump targets, for control-flow-graph construction
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Instr::Jump(j) => vec![j.target.as_str()],
            Instr::JumpZero(j) | Instr::JumpNotZero(j) => vec![j.target.as_str()],
            _ => vec![],
        }
    }

    /// The label this instruction defines, if it is a label
    pub fn label_name(&self) -> Option<&str> {
        match self {
            Instr::Label(l) => Some(l.name.as_str()),
            _ => None,
        }
    }

    /// Append this instruction's final assembly to the output.
    ///
    /// `ctx.spotmap` is the allocator's finished assignment; emission only
    /// reads it and never second-guesses it.
    pub fn emit(&self, ctx: &mut EmitCtx) -> Result<(), CodegenError> {
        match self {
            Instr::Label(l) => l.emit(ctx),
            Instr::Jump(j) => j.emit(ctx),
            Instr::JumpZero(j) => j.emit(ctx, true),
            Instr::JumpNotZero(j) => j.emit(ctx, false),
            Instr::Return(r) => r.emit(ctx),
            Instr::Call(c) => c.emit(ctx),
            Instr::Set(s) => s.emit(ctx),
            Instr::AddrOf(a) => a.emit(ctx),
            Instr::Add(b) => math::emit_add_sub(b, ctx, true),
            Instr::Sub(b) => math::emit_add_sub(b, ctx, false),
            Instr::Mul(m) => m.emit(ctx),
            Instr::ShiftLeft(b) => math::emit_shift(b, ctx, true),
            Instr::ShiftRight(b) => math::emit_shift(b, ctx, false),
            Instr::Div(b) => math::emit_div_mod(b, ctx, false),
            Instr::Mod(b) => math::emit_div_mod(b, ctx, true),
            Instr::Neg(u) => math::emit_neg_not(u, ctx, true),
            Instr::Not(u) => math::emit_neg_not(u, ctx, false),
        }
    }

    /// Operand slots in fixed order (outputs, then inputs), for the
    /// structural-equality check in `ILCode`.
    pub(crate) fn operands(&self) -> Vec<Option<ValueId>> {
        let mut slots: Vec<Option<ValueId>> = match self {
            // A call's result slot is optional and must line up even when
            // absent.
            Instr::Call(c) => vec![c.ret()],
            _ => self.outputs().into_iter().map(Some).collect(),
        };
        slots.extend(self.inputs());
        slots
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Label(l) => write!(f, "{}:", l.name),
            Instr::Jump(j) => write!(f, "jump {}", j.target),
            Instr::JumpZero(j) => write!(f, "jump {} if {} == 0", j.target, j.cond),
            Instr::JumpNotZero(j) => write!(f, "jump {} if {} != 0", j.target, j.cond),
            Instr::Return(r) => match r.value {
                Some(value) => write!(f, "return {value}"),
                None => write!(f, "return"),
            },
            Instr::Call(c) => {
                match c.ret() {
                    Some(ret) => write!(f, "{ret} = call {}(", c.func())?,
                    None => write!(f, "call {}(", c.func())?,
                }
                for (i, arg) in c.args().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Instr::Set(s) => write!(f, "{} = {}", s.output, s.arg),
            Instr::AddrOf(a) => write!(f, "{} = &{}", a.output, a.var),
            Instr::Add(b) => write!(f, "{} = {} + {}", b.output, b.arg1, b.arg2),
            Instr::Sub(b) => write!(f, "{} = {} - {}", b.output, b.arg1, b.arg2),
            Instr::Mul(m) => write!(f, "{} = {} * {}", m.output, m.arg1, m.arg2),
            Instr::ShiftLeft(b) => write!(f, "{} = {} << {}", b.output, b.arg1, b.arg2),
            Instr::ShiftRight(b) => write!(f, "{} = {} >> {}", b.output, b.arg1, b.arg2),
            Instr::Div(b) => write!(f, "{} = {} / {}", b.output, b.arg1, b.arg2),
            Instr::Mod(b) => write!(f, "{} = {} % {}", b.output, b.arg1, b.arg2),
            Instr::Neg(u) => write!(f, "{} = -{}", u.output, u.arg),
            Instr::Not(u) => write!(f, "{} = ~{}", u.output, u.arg),
        }
    }
}
