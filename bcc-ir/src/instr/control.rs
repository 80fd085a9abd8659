//! Control-flow instructions: labels, jumps, return, and function calls

use crate::instr::{emit_relay_move, EmitCtx};
use crate::value::{ValueArena, ValueId};
use bcc_codegen::{AsmInst, CodegenError, JumpTarget, Spot, A, DP, X, Y};
use log::{debug, trace};
use std::collections::HashMap;

/// Low word slot of the indirect-call trampoline
pub const TRAMPOLINE_LO: &str = "TRAMPOLINE_LO";
/// High word slot of the indirect-call trampoline
pub const TRAMPOLINE_HI: &str = "TRAMPOLINE_HI";
/// Entry point that performs a banked call through both trampoline slots
pub const CALL_TRAMPOLINE: &str = "CALL_TRAMPOLINE";

/// Frame offset where a call's wide (more than one register) return value
/// is delivered.
pub const WIDE_RETURN_OFFSET: i32 = 0x06;

/// A bare label
#[derive(Debug, Clone)]
pub struct LabelInstr {
    pub name: String,
}

impl LabelInstr {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub(crate) fn emit(&self, ctx: &mut EmitCtx) -> Result<(), CodegenError> {
        ctx.out.add(AsmInst::Label(self.name.clone()));
        Ok(())
    }
}

/// Unconditional jump to a label
#[derive(Debug, Clone)]
pub struct JumpInstr {
    pub target: String,
}

impl JumpInstr {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub(crate) fn emit(&self, ctx: &mut EmitCtx) -> Result<(), CodegenError> {
        ctx.out
            .add(AsmInst::Jmp(JumpTarget::Label(self.target.clone())));
        Ok(())
    }
}

/// Conditional jump to a label; the branch sense (zero / not zero) is
/// carried by the instruction kind.
#[derive(Debug, Clone)]
pub struct CondJumpInstr {
    pub cond: ValueId,
    pub target: String,
}

impl CondJumpInstr {
    pub fn new(cond: ValueId, target: impl Into<String>) -> Self {
        Self {
            cond,
            target: target.into(),
        }
    }

    pub(crate) fn emit(&self, ctx: &mut EmitCtx, jump_if_zero: bool) -> Result<(), CodegenError> {
        let size = ctx.values.size(self.cond);
        let cond_spot = ctx.spot(self.cond);

        // An immediate cannot be compared directly; land it in a scratch
        // register first.
        let cond_spot = if cond_spot.is_immediate() {
            let r = ctx.temp_register(&[], &[]);
            ctx.out.add(AsmInst::Mov {
                dst: r.clone(),
                src: cond_spot,
                size,
            });
            r
        } else {
            cond_spot
        };

        ctx.out.add(AsmInst::Cmp {
            lhs: cond_spot,
            rhs: Spot::imm_int(0),
            size,
        });
        ctx.out.add(if jump_if_zero {
            AsmInst::Je(self.target.clone())
        } else {
            AsmInst::Jne(self.target.clone())
        });
        Ok(())
    }
}

/// Return from the current function
///
/// A value, when present, must end up in `A` before the epilogue runs.
#[derive(Debug, Clone)]
pub struct ReturnInstr {
    pub value: Option<ValueId>,
}

impl ReturnInstr {
    pub fn new(value: Option<ValueId>) -> Self {
        Self { value }
    }

    pub(crate) fn clobbers(&self) -> Vec<Spot> {
        vec![A]
    }

    pub(crate) fn abs_spot_pref(&self) -> HashMap<ValueId, Vec<Spot>> {
        match self.value {
            Some(value) => HashMap::from([(value, vec![A])]),
            None => HashMap::new(),
        }
    }

    pub(crate) fn emit(&self, ctx: &mut EmitCtx) -> Result<(), CodegenError> {
        if let Some(value) = self.value {
            let spot = ctx.spot(value);
            if spot != A {
                ctx.out.add(AsmInst::Mov {
                    dst: A,
                    src: spot,
                    size: ctx.values.size(value),
                });
            }
        }

        // Epilogue: restore the caller's frame base, then return.
        ctx.out.add(AsmInst::Pop { dst: DP, size: 2 });
        ctx.out.add(AsmInst::Ret);
        Ok(())
    }
}

/// The register carrying argument copies to memory destinations, and
/// whether its current contents must be saved around the copies.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RelayPlan {
    pub reg: Spot,
    pub save_restore: bool,
}

/// Decide which register relays argument values into memory argument
/// slots. Prefers `Y` when it is not itself an argument destination, then
/// any argument-destination register that does not yet hold its final
/// value (it will be overwritten afterwards anyway), and as a last resort
/// `Y` saved on the stack around the copies.
pub(crate) fn plan_arg_relay(arg_spots: &[Spot], current: &[Spot]) -> RelayPlan {
    if !arg_spots.contains(&Y) {
        return RelayPlan {
            reg: Y,
            save_restore: false,
        };
    }
    for (dst, cur) in arg_spots.iter().zip(current) {
        if dst.is_register() && dst != cur {
            return RelayPlan {
                reg: dst.clone(),
                save_restore: false,
            };
        }
    }
    RelayPlan {
        reg: Y,
        save_restore: true,
    }
}

/// Call a function
///
/// `func` is either a function value or a pointer to one; `args` must
/// match the parameter types the callee expects; `ret`, when the callee is
/// non-void, receives the return value. Per-argument target spots come
/// from the calling convention and must be assigned before the allocator
/// queries this instruction.
#[derive(Debug, Clone)]
pub struct CallInstr {
    func: ValueId,
    args: Vec<ValueId>,
    ret: Option<ValueId>,
    func_is_ptr: bool,
    void_return: bool,
    ret_size: u32,
    ret_spot: Option<Spot>,
    arg_spots: Option<Vec<Spot>>,
}

impl CallInstr {
    pub fn new(
        values: &ValueArena,
        func: ValueId,
        args: Vec<ValueId>,
        ret: Option<ValueId>,
    ) -> Self {
        let func_ctype = values.ctype(func);
        let func_is_ptr = func_ctype.is_pointer();
        let func_type = func_ctype
            .function_type()
            .expect("call target is not a function or function pointer");
        let ret_type = func_type
            .return_type()
            .expect("function type carries no return type");

        let void_return = ret_type.is_void();
        let ret_size = ret_type.size_in_bytes();
        let ret_spot = if void_return {
            None
        } else if ret_size <= 2 {
            Some(A)
        } else {
            Some(Spot::frame_cell(WIDE_RETURN_OFFSET))
        };

        Self {
            func,
            args,
            ret,
            func_is_ptr,
            void_return,
            ret_size,
            ret_spot,
            arg_spots: None,
        }
    }

    pub fn func(&self) -> ValueId {
        self.func
    }

    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    pub fn ret(&self) -> Option<ValueId> {
        self.ret.filter(|_| !self.void_return)
    }

    /// Install the per-argument target spots produced by
    /// `bcc_codegen::assign_param_spots`.
    pub fn set_arg_spots(&mut self, spots: Vec<Spot>) {
        assert_eq!(
            spots.len(),
            self.args.len(),
            "one target spot per argument"
        );
        self.arg_spots = Some(spots);
    }

    fn arg_spots(&self) -> &[Spot] {
        self.arg_spots
            .as_deref()
            .expect("argument spots not assigned before use")
    }

    pub(crate) fn outputs(&self) -> Vec<ValueId> {
        self.ret().into_iter().collect()
    }

    /// Everything a call destroys: the caller-saved registers, every
    /// argument spot, and the return spot.
    pub(crate) fn clobbers(&self) -> Vec<Spot> {
        let mut spots = vec![A, X, Y];
        for spot in self.arg_spots() {
            if !spots.contains(spot) {
                spots.push(spot.clone());
            }
        }
        if let Some(ret_spot) = &self.ret_spot {
            if !spots.contains(ret_spot) {
                spots.push(ret_spot.clone());
            }
        }
        spots
    }

    pub(crate) fn abs_spot_pref(&self) -> HashMap<ValueId, Vec<Spot>> {
        let mut prefs = HashMap::new();
        if let (Some(ret), Some(ret_spot)) = (self.ret(), &self.ret_spot) {
            prefs.insert(ret, vec![ret_spot.clone()]);
        }
        for (&arg, spot) in self.args.iter().zip(self.arg_spots()) {
            prefs.insert(arg, vec![spot.clone()]);
        }
        prefs
    }

    /// The function pointer must not share a register with any argument
    /// destination, or the argument moves would overwrite it before the
    /// dispatch.
    pub(crate) fn abs_spot_conf(&self) -> HashMap<ValueId, Vec<Spot>> {
        HashMap::from([(self.func, self.arg_spots().to_vec())])
    }

    pub(crate) fn emit(&self, ctx: &mut EmitCtx) -> Result<(), CodegenError> {
        let func_spot = ctx.spot(self.func);
        let arg_spots = self.arg_spots().to_vec();
        let current: Vec<Spot> = self.args.iter().map(|&a| ctx.spot(a)).collect();

        self.emit_argument_placement(ctx, &arg_spots, &current)?;
        self.emit_dispatch(ctx, &func_spot, &arg_spots)?;

        // Result relocation.
        if let (Some(ret), Some(ret_spot)) = (self.ret(), &self.ret_spot) {
            let ret_dst = ctx.spot(ret);
            if ret_dst != *ret_spot {
                ctx.out.add(AsmInst::Mov {
                    dst: ret_dst,
                    src: ret_spot.clone(),
                    size: self.ret_size,
                });
            }
        }
        Ok(())
    }

    fn emit_argument_placement(
        &self,
        ctx: &mut EmitCtx,
        arg_spots: &[Spot],
        current: &[Spot],
    ) -> Result<(), CodegenError> {
        // Memory-destination arguments go first, through a relay register
        // chosen up front.
        let needs_relay = self
            .args
            .iter()
            .zip(arg_spots)
            .zip(current)
            .any(|((_, dst), cur)| !dst.is_register() && cur != dst);

        if needs_relay {
            let plan = plan_arg_relay(arg_spots, current);
            trace!(
                "relaying stack arguments through {} (save: {})",
                plan.reg,
                plan.save_restore
            );
            if plan.save_restore {
                ctx.out.add(AsmInst::Push {
                    src: plan.reg.clone(),
                    size: 2,
                });
            }
            for ((&arg, dst), cur) in self.args.iter().zip(arg_spots).zip(current) {
                if dst.is_register() || cur == dst {
                    continue;
                }
                emit_relay_move(ctx.out, dst, cur, ctx.values.size(arg), &plan.reg)?;
            }
            if plan.save_restore {
                ctx.out.add(AsmInst::Pop {
                    dst: plan.reg.clone(),
                    size: 2,
                });
            }
        }

        // Register-destination arguments move directly.
        for ((&arg, dst), cur) in self.args.iter().zip(arg_spots).zip(current) {
            if !dst.is_register() || cur == dst {
                continue;
            }
            ctx.out.add(AsmInst::Mov {
                dst: dst.clone(),
                src: cur.clone(),
                size: ctx.values.size(arg),
            });
        }
        Ok(())
    }

    fn emit_dispatch(
        &self,
        ctx: &mut EmitCtx,
        func_spot: &Spot,
        arg_spots: &[Spot],
    ) -> Result<(), CodegenError> {
        // A pointer whose spot is a literal holds a compile-time-constant
        // address and can be called directly; only a genuinely
        // runtime-valued pointer needs the trampoline.
        let calling_a_pointer = self.func_is_ptr && !func_spot.is_immediate();
        if !calling_a_pointer {
            ctx.out.add(AsmInst::Call {
                target: func_spot.to_immediate()?,
                size: ctx.values.size(self.func),
            });
            return Ok(());
        }

        let fp_size = ctx.values.size(self.func);
        let preserve_y = arg_spots.contains(&Y);
        debug!("indirect call through trampoline, pointer size {fp_size}");

        if fp_size == 2 {
            // Store the pointer in the trampoline slot, push a return
            // address one instruction past the indirect jump, and jump
            // through the slot; the pushed address makes the jump behave
            // like a call.
            if preserve_y {
                ctx.out.add(AsmInst::Push { src: Y, size: 2 });
            }
            ctx.out.add(AsmInst::Mov {
                dst: Y,
                src: func_spot.clone(),
                size: 2,
            });
            ctx.out.add(AsmInst::Mov {
                dst: Spot::named(TRAMPOLINE_LO),
                src: Y,
                size: 2,
            });
            if preserve_y {
                ctx.out.add(AsmInst::Pop { dst: Y, size: 2 });
            }

            let label = ctx.out.new_label();
            ctx.out.add(AsmInst::Push {
                src: Spot::imm(format!("({label})-1")),
                size: 2,
            });
            ctx.out.add(AsmInst::Jmp(JumpTarget::Indirect(Spot::named(
                TRAMPOLINE_LO,
            ))));
            ctx.out.add(AsmInst::Label(label));
        } else {
            // A banked pointer: store both halves and let the wide-call
            // entry point read them.
            if preserve_y {
                ctx.out.add(AsmInst::Push { src: Y, size: 2 });
            }
            ctx.out.add(AsmInst::Mov {
                dst: Y,
                src: func_spot.clone(),
                size: 2,
            });
            ctx.out.add(AsmInst::Mov {
                dst: Spot::named(TRAMPOLINE_LO),
                src: Y,
                size: 2,
            });
            ctx.out.add(AsmInst::Mov {
                dst: Y,
                src: func_spot.shift(2, None)?,
                size: 2,
            });
            ctx.out.add(AsmInst::Mov {
                dst: Spot::named(TRAMPOLINE_HI),
                src: Y,
                size: 2,
            });
            if preserve_y {
                ctx.out.add(AsmInst::Pop { dst: Y, size: 2 });
            }
            ctx.out.add(AsmInst::Call {
                target: Spot::imm(CALL_TRAMPOLINE),
                size: 4,
            });
        }
        Ok(())
    }
}
