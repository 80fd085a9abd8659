//! Arithmetic instructions
//!
//! Add and subtract share one emission path built around a scratch
//! register. Multiply, the shifts, and divide/modulo all go through fixed
//! external routines with pinned operand registers, because the target has
//! no general multiply or divide instruction.

use crate::instr::EmitCtx;
use crate::value::{ValueArena, ValueId};
use bcc_codegen::{AsmInst, CodegenError, Spot, A, X, Y};
use log::trace;
use std::collections::HashMap;
use std::mem;

/// External routine multiplying the two wide scratch cells
pub const WIDE_MULTIPLY_ROUTINE: &str = "MULT32";
/// External routine computing `A * Y -> A` for two words
pub const NARROW_MULTIPLY_ROUTINE: &str = "MULT16";
/// External routine computing `A(16) * Y(8) -> A`
pub const MIXED_MULTIPLY_ROUTINE: &str = "MULT168";
/// External routines computing `A << X -> A` and `A >> X -> A`
pub const LEFT_SHIFT_ROUTINE: &str = "LSHIFT16";
pub const RIGHT_SHIFT_ROUTINE: &str = "RSHIFT16";
/// External routine computing `A / X -> A` with the remainder in `Y`
pub const DIVMOD_ROUTINE: &str = "DIVMOD16";

/// Frame offsets of the scratch cell pair reserved for wide multiplication
pub const WIDE_MUL_LHS_OFFSET: i32 = 0x06;
pub const WIDE_MUL_RHS_OFFSET: i32 = 0x0A;

fn wide_mul_cells() -> (Spot, Spot) {
    (
        Spot::frame_cell(WIDE_MUL_LHS_OFFSET),
        Spot::frame_cell(WIDE_MUL_RHS_OFFSET),
    )
}

/// Two-input, one-output arithmetic payload shared by add, subtract, the
/// shifts, and divide/modulo. Output and inputs carry one type; promotion
/// is the front end's responsibility.
#[derive(Debug, Clone)]
pub struct BinInstr {
    pub output: ValueId,
    pub arg1: ValueId,
    pub arg2: ValueId,
}

impl BinInstr {
    pub fn new(output: ValueId, arg1: ValueId, arg2: ValueId) -> Self {
        Self { output, arg1, arg2 }
    }
}

/// One-input, one-output payload for negate and bitwise not
#[derive(Debug, Clone)]
pub struct UnInstr {
    pub output: ValueId,
    pub arg: ValueId,
}

impl UnInstr {
    pub fn new(output: ValueId, arg: ValueId) -> Self {
        Self { output, arg }
    }
}

/// An immediate too wide to appear as a direct operand
fn is_wide_immediate(spot: &Spot, size: u32) -> bool {
    spot.is_immediate() && size > 2
}

pub(crate) fn add_sub_abs_pref(bin: &BinInstr) -> HashMap<ValueId, Vec<Spot>> {
    HashMap::from([(bin.output, vec![A])])
}

/// Shared emission for add and subtract.
///
/// Picks a scratch register, preferring to land on one operand's existing
/// spot so the operation updates in place. The target has no
/// reverse-subtract, so when only the second operand's spot was reusable
/// the result is computed in flipped order and negated afterwards.
pub(crate) fn emit_add_sub(
    bin: &BinInstr,
    ctx: &mut EmitCtx,
    commutative: bool,
) -> Result<(), CodegenError> {
    let size = ctx.values.size(bin.arg1);
    let arg1_spot = ctx.spot(bin.arg1);
    let arg2_spot = ctx.spot(bin.arg2);
    let out_spot = ctx.spot(bin.output);

    let inst = |dst: Spot, src: Spot| {
        if commutative {
            AsmInst::Add { dst, src, size }
        } else {
            AsmInst::Sub { dst, src, size }
        }
    };

    let temp = ctx.temp_register(&[], &[out_spot.clone(), arg1_spot.clone(), arg2_spot.clone()]);

    if temp == arg1_spot {
        if !is_wide_immediate(&arg2_spot, size) {
            ctx.out.add(inst(temp.clone(), arg2_spot));
        } else {
            let temp2 = ctx.temp_register(&[temp.clone()], &[]);
            ctx.out.add(AsmInst::Mov {
                dst: temp2.clone(),
                src: arg2_spot,
                size,
            });
            ctx.out.add(inst(temp.clone(), temp2));
        }
    } else if temp == arg2_spot {
        if !is_wide_immediate(&arg1_spot, size) {
            ctx.out.add(inst(temp.clone(), arg1_spot));
        } else {
            let temp2 = ctx.temp_register(&[temp.clone()], &[]);
            ctx.out.add(AsmInst::Mov {
                dst: temp2.clone(),
                src: arg1_spot,
                size,
            });
            ctx.out.add(inst(temp.clone(), temp2));
        }

        // Operand order was flipped to reuse this spot.
        if !commutative {
            ctx.out.add(AsmInst::Neg {
                dst: temp.clone(),
                size,
            });
        }
    } else {
        let wide1 = is_wide_immediate(&arg1_spot, size);
        let wide2 = is_wide_immediate(&arg2_spot, size);
        if !wide2 {
            ctx.out.add(AsmInst::Mov {
                dst: temp.clone(),
                src: arg1_spot,
                size,
            });
            ctx.out.add(inst(temp.clone(), arg2_spot));
        } else if !wide1 {
            ctx.out.add(AsmInst::Mov {
                dst: temp.clone(),
                src: arg2_spot,
                size,
            });
            ctx.out.add(inst(temp.clone(), arg1_spot));
            if !commutative {
                ctx.out.add(AsmInst::Neg {
                    dst: temp.clone(),
                    size,
                });
            }
        } else {
            unreachable!("constant folding removes immediate-immediate arithmetic");
        }
    }

    if temp != out_spot {
        ctx.out.add(AsmInst::Mov {
            dst: out_spot,
            src: temp,
            size,
        });
    }
    Ok(())
}

/// How a multiplication is implemented, selected purely by operand sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulStrategy {
    /// An operand is wider than a register: operands and result live in
    /// the fixed wide scratch cells, multiplied by an external routine.
    Wide,
    /// Both operands are register-wide words.
    Narrow,
    /// Asymmetric word-by-byte product. The front end does not currently
    /// produce this shape; it shares the narrow emission path.
    MixedNarrow,
}

/// Strategy for the given operand sizes, independent of operand order.
pub fn mul_strategy(size1: u32, size2: u32) -> MulStrategy {
    let (wider, narrower) = (size1.max(size2), size1.min(size2));
    if wider > 2 {
        MulStrategy::Wide
    } else if narrower == 2 {
        MulStrategy::Narrow
    } else {
        MulStrategy::MixedNarrow
    }
}

/// Multiply
///
/// Operand order is canonicalized at construction: a literal operand
/// becomes the second, otherwise the wider operand comes first.
#[derive(Debug, Clone)]
pub struct MulInstr {
    pub output: ValueId,
    pub arg1: ValueId,
    pub arg2: ValueId,
    strategy: MulStrategy,
}

impl MulInstr {
    pub fn new(values: &ValueArena, output: ValueId, mut arg1: ValueId, mut arg2: ValueId) -> Self {
        if values.is_literal(arg1)
            || (!values.is_literal(arg2) && values.size(arg1) < values.size(arg2))
        {
            mem::swap(&mut arg1, &mut arg2);
        }
        let strategy = mul_strategy(values.size(arg1), values.size(arg2));
        Self {
            output,
            arg1,
            arg2,
            strategy,
        }
    }

    pub fn strategy(&self) -> MulStrategy {
        self.strategy
    }

    fn routine(&self) -> &'static str {
        match self.strategy {
            MulStrategy::Wide => WIDE_MULTIPLY_ROUTINE,
            MulStrategy::Narrow => NARROW_MULTIPLY_ROUTINE,
            MulStrategy::MixedNarrow => MIXED_MULTIPLY_ROUTINE,
        }
    }

    /// Where the routine leaves the product
    fn result_spot(&self) -> Spot {
        match self.strategy {
            MulStrategy::Wide => Spot::frame_cell(WIDE_MUL_LHS_OFFSET),
            MulStrategy::Narrow | MulStrategy::MixedNarrow => A,
        }
    }

    pub(crate) fn clobbers(&self) -> Vec<Spot> {
        let (lhs_cell, rhs_cell) = wide_mul_cells();
        match self.strategy {
            MulStrategy::Wide => vec![A, Y, lhs_cell, rhs_cell],
            MulStrategy::Narrow | MulStrategy::MixedNarrow => vec![A, Y],
        }
    }

    pub(crate) fn abs_spot_pref(&self) -> HashMap<ValueId, Vec<Spot>> {
        let (lhs_cell, rhs_cell) = wide_mul_cells();
        match self.strategy {
            MulStrategy::Wide => HashMap::from([
                (self.output, vec![lhs_cell.clone()]),
                (self.arg1, vec![lhs_cell.clone(), rhs_cell.clone()]),
                (self.arg2, vec![lhs_cell, rhs_cell]),
            ]),
            MulStrategy::Narrow | MulStrategy::MixedNarrow => HashMap::from([
                (self.output, vec![A]),
                (self.arg1, vec![A]),
                (self.arg2, vec![Y]),
            ]),
        }
    }

    pub(crate) fn emit(&self, ctx: &mut EmitCtx) -> Result<(), CodegenError> {
        let arg1_spot = ctx.spot(self.arg1);
        let arg2_spot = ctx.spot(self.arg2);
        let out_spot = ctx.spot(self.output);
        trace!(
            "multiply via {} ({:?})",
            self.routine(),
            self.strategy
        );

        match self.strategy {
            MulStrategy::Wide => {
                let (lhs_cell, rhs_cell) = wide_mul_cells();
                // The product is commutative, so operands already split
                // across the two cells are fine either way round.
                let split = (arg1_spot == lhs_cell && arg2_spot == rhs_cell)
                    || (arg1_spot == rhs_cell && arg2_spot == lhs_cell);
                if !split {
                    // Keep whichever operand already sits in a cell there.
                    let (t1, t2) = if arg2_spot == lhs_cell || arg1_spot == rhs_cell {
                        (rhs_cell, lhs_cell)
                    } else {
                        (lhs_cell, rhs_cell)
                    };
                    if arg1_spot != t1 {
                        ctx.out.add(AsmInst::Mov {
                            dst: t1,
                            src: arg1_spot,
                            size: ctx.values.size(self.arg1),
                        });
                    }
                    if arg2_spot != t2 {
                        ctx.out.add(AsmInst::Mov {
                            dst: t2,
                            src: arg2_spot,
                            size: ctx.values.size(self.arg2),
                        });
                    }
                }
            }
            MulStrategy::Narrow | MulStrategy::MixedNarrow => {
                // The pinned registers are declared clobbered, so previous
                // contents need no saving.
                if arg1_spot != A {
                    ctx.out.add(AsmInst::Mov {
                        dst: A,
                        src: arg1_spot,
                        size: ctx.values.size(self.arg1),
                    });
                }
                if arg2_spot != Y {
                    ctx.out.add(AsmInst::Mov {
                        dst: Y,
                        src: arg2_spot,
                        size: ctx.values.size(self.arg2),
                    });
                }
            }
        }

        ctx.out.add(AsmInst::Call {
            target: Spot::imm(self.routine()),
            size: 2,
        });

        let result = self.result_spot();
        if out_spot != result {
            ctx.out.add(AsmInst::Mov {
                dst: out_spot,
                src: result,
                size: ctx.values.size(self.output),
            });
        }
        Ok(())
    }
}

pub(crate) fn shift_clobbers() -> Vec<Spot> {
    vec![A, X]
}

pub(crate) fn shift_abs_pref(bin: &BinInstr) -> HashMap<ValueId, Vec<Spot>> {
    HashMap::from([
        (bin.output, vec![A]),
        (bin.arg1, vec![A]),
        (bin.arg2, vec![X]),
    ])
}

/// The shift count must not sit in `A`, where the shifted value lands
/// first.
pub(crate) fn shift_abs_conf(bin: &BinInstr) -> HashMap<ValueId, Vec<Spot>> {
    HashMap::from([(bin.arg2, vec![A])])
}

/// Shifts go through external routines with the value in `A` and the
/// count in `X`.
pub(crate) fn emit_shift(bin: &BinInstr, ctx: &mut EmitCtx, left: bool) -> Result<(), CodegenError> {
    let size = ctx.values.size(bin.arg1);
    let arg1_spot = ctx.spot(bin.arg1);
    let arg2_spot = ctx.spot(bin.arg2);
    let out_spot = ctx.spot(bin.output);

    if arg1_spot != A {
        ctx.out.add(AsmInst::Mov {
            dst: A,
            src: arg1_spot,
            size,
        });
    }
    if arg2_spot != X {
        ctx.out.add(AsmInst::Mov {
            dst: X,
            src: arg2_spot,
            size: ctx.values.size(bin.arg2),
        });
    }
    ctx.out.add(AsmInst::Call {
        target: Spot::imm(if left {
            LEFT_SHIFT_ROUTINE
        } else {
            RIGHT_SHIFT_ROUTINE
        }),
        size: 2,
    });
    if out_spot != A {
        ctx.out.add(AsmInst::Mov {
            dst: out_spot,
            src: A,
            size,
        });
    }
    Ok(())
}

pub(crate) fn div_mod_clobbers() -> Vec<Spot> {
    vec![A, X, Y]
}

pub(crate) fn div_mod_abs_pref(bin: &BinInstr, want_remainder: bool) -> HashMap<ValueId, Vec<Spot>> {
    let result = if want_remainder { Y } else { A };
    HashMap::from([(bin.output, vec![result]), (bin.arg1, vec![A])])
}

/// The divisor must not sit in `A`, where the dividend lands first.
pub(crate) fn div_mod_abs_conf(bin: &BinInstr) -> HashMap<ValueId, Vec<Spot>> {
    HashMap::from([(bin.arg2, vec![A])])
}

/// Divide and modulo share the external routine: dividend in `A`, divisor
/// in `X`, quotient back in `A`, remainder in `Y`.
pub(crate) fn emit_div_mod(
    bin: &BinInstr,
    ctx: &mut EmitCtx,
    want_remainder: bool,
) -> Result<(), CodegenError> {
    let size = ctx.values.size(bin.arg1);
    let arg1_spot = ctx.spot(bin.arg1);
    let arg2_spot = ctx.spot(bin.arg2);
    let out_spot = ctx.spot(bin.output);

    if arg1_spot != A {
        ctx.out.add(AsmInst::Mov {
            dst: A,
            src: arg1_spot,
            size,
        });
    }
    if arg2_spot != X {
        ctx.out.add(AsmInst::Mov {
            dst: X,
            src: arg2_spot,
            size: ctx.values.size(bin.arg2),
        });
    }
    ctx.out.add(AsmInst::Call {
        target: Spot::imm(DIVMOD_ROUTINE),
        size: 2,
    });

    let result = if want_remainder { Y } else { A };
    if out_spot != result {
        ctx.out.add(AsmInst::Mov {
            dst: out_spot,
            src: result,
            size: ctx.values.size(bin.output),
        });
    }
    Ok(())
}

/// Negate and bitwise-not update the output in place after an optional
/// copy.
pub(crate) fn emit_neg_not(un: &UnInstr, ctx: &mut EmitCtx, negate: bool) -> Result<(), CodegenError> {
    let size = ctx.values.size(un.arg);
    let out_spot = ctx.spot(un.output);
    let arg_spot = ctx.spot(un.arg);

    if out_spot != arg_spot {
        ctx.out.add(AsmInst::Mov {
            dst: out_spot.clone(),
            src: arg_spot,
            size,
        });
    }
    ctx.out.add(if negate {
        AsmInst::Neg {
            dst: out_spot,
            size,
        }
    } else {
        AsmInst::Not {
            dst: out_spot,
            size,
        }
    });
    Ok(())
}
