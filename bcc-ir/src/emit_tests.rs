//! Unit tests for instruction emission against a fixed spot assignment

#[cfg(test)]
mod tests {
    use crate::instr::control::{CALL_TRAMPOLINE, TRAMPOLINE_HI, TRAMPOLINE_LO};
    use crate::instr::math::{
        DIVMOD_ROUTINE, LEFT_SHIFT_ROUTINE, NARROW_MULTIPLY_ROUTINE, WIDE_MULTIPLY_ROUTINE,
    };
    use crate::instr::{
        AddrOfInstr, BinInstr, CallInstr, CondJumpInstr, EmitCtx, Instr, MulInstr, MulStrategy,
        ReturnInstr, SetInstr, SpotMap, UnInstr,
    };
    use crate::value::{ValueArena, ValueId};
    use bcc_codegen::{
        assign_param_spots, AsmCode, AsmInst, JumpTarget, Spot, A, DP, GENERAL_REGISTERS, X, Y,
    };
    use bcc_common::CType;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// Emit one instruction with a deterministic scratch-register chooser:
    /// the first preferred register not excluded, else the first free
    /// general register.
    fn emit(instr: &Instr, values: &ValueArena, spotmap: &SpotMap, homes: &SpotMap) -> Vec<AsmInst> {
        let mut out = AsmCode::new();
        let mut get_reg = |excluding: &[Spot], preferring: &[Spot]| {
            preferring
                .iter()
                .find(|s| s.is_register() && !excluding.contains(s))
                .or_else(|| GENERAL_REGISTERS.iter().find(|s| !excluding.contains(s)))
                .cloned()
                .expect("no scratch register available")
        };
        let mut ctx = EmitCtx {
            values,
            spotmap,
            home_spots: homes,
            get_temp_register: &mut get_reg,
            out: &mut out,
        };
        instr.emit(&mut ctx).unwrap();
        out.instructions().to_vec()
    }

    fn spots(pairs: &[(ValueId, Spot)]) -> SpotMap {
        pairs.iter().cloned().collect()
    }

    fn int_function() -> CType {
        CType::Function {
            ret: Box::new(CType::int()),
            params: vec![CType::int()],
        }
    }

    fn mov(dst: Spot, src: Spot, size: u32) -> AsmInst {
        AsmInst::Mov { dst, src, size }
    }

    // --- calls -----------------------------------------------------------

    #[test]
    fn test_constant_pointer_calls_directly() {
        // A function pointer whose spot is a literal holds a known address;
        // the trampoline must not be used.
        let mut values = ValueArena::new();
        let func = values.new_temp(CType::NearPointer(Box::new(int_function())));
        let arg = values.new_temp(CType::int());
        let ret = values.new_temp(CType::int());

        let mut call = CallInstr::new(&values, func, vec![arg], Some(ret));
        call.set_arg_spots(assign_param_spots(&[2]));

        let spotmap = spots(&[(func, Spot::imm("blink")), (arg, A), (ret, A)]);
        let insts = emit(&Instr::Call(call), &values, &spotmap, &HashMap::new());

        assert_eq!(
            insts,
            vec![AsmInst::Call {
                target: Spot::imm("blink"),
                size: 2
            }]
        );
    }

    #[test]
    fn test_direct_function_call() {
        let mut values = ValueArena::new();
        let func = values.new_temp(int_function());
        let arg = values.new_temp(CType::int());
        let ret = values.new_temp(CType::int());

        let mut call = CallInstr::new(&values, func, vec![arg], Some(ret));
        call.set_arg_spots(assign_param_spots(&[2]));

        // Argument not yet in place, result wanted elsewhere.
        let spotmap = spots(&[(func, Spot::named("helper")), (arg, X), (ret, Y)]);
        let insts = emit(&Instr::Call(call), &values, &spotmap, &HashMap::new());

        assert_eq!(
            insts,
            vec![
                mov(A, X, 2),
                AsmInst::Call {
                    target: Spot::imm("helper"),
                    size: 2
                },
                mov(Y, A, 2),
            ]
        );
    }

    #[test]
    fn test_runtime_near_pointer_uses_jump_trampoline() {
        let mut values = ValueArena::new();
        let func = values.new_temp(CType::NearPointer(Box::new(int_function())));
        let arg = values.new_temp(CType::int());
        let ret = values.new_temp(CType::int());

        let mut call = CallInstr::new(&values, func, vec![arg], Some(ret));
        call.set_arg_spots(assign_param_spots(&[2]));

        let spotmap = spots(&[(func, Spot::frame_cell(-2)), (arg, A), (ret, A)]);
        let insts = emit(&Instr::Call(call), &values, &spotmap, &HashMap::new());

        assert_eq!(
            insts,
            vec![
                mov(Y, Spot::frame_cell(-2), 2),
                mov(Spot::named(TRAMPOLINE_LO), Y, 2),
                AsmInst::Push {
                    src: Spot::imm("(ret_0)-1"),
                    size: 2
                },
                AsmInst::Jmp(JumpTarget::Indirect(Spot::named(TRAMPOLINE_LO))),
                AsmInst::Label("ret_0".to_string()),
            ]
        );
    }

    #[test]
    fn test_runtime_far_pointer_stores_both_trampoline_slots() {
        let mut values = ValueArena::new();
        let func = values.new_temp(CType::FarPointer(Box::new(int_function())));
        let arg = values.new_temp(CType::int());
        let ret = values.new_temp(CType::int());

        let mut call = CallInstr::new(&values, func, vec![arg], Some(ret));
        call.set_arg_spots(assign_param_spots(&[2]));

        let spotmap = spots(&[(func, Spot::frame_cell(-4)), (arg, A), (ret, A)]);
        let insts = emit(&Instr::Call(call), &values, &spotmap, &HashMap::new());

        assert_eq!(
            insts,
            vec![
                mov(Y, Spot::frame_cell(-4), 2),
                mov(Spot::named(TRAMPOLINE_LO), Y, 2),
                mov(Y, Spot::frame_cell(-2), 2),
                mov(Spot::named(TRAMPOLINE_HI), Y, 2),
                AsmInst::Call {
                    target: Spot::imm(CALL_TRAMPOLINE),
                    size: 4
                },
            ]
        );
    }

    #[test]
    fn test_trampoline_preserves_y_argument() {
        // Y carries the third argument, so the trampoline staging must
        // save and restore it.
        let mut values = ValueArena::new();
        let func_ty = CType::NearPointer(Box::new(CType::Function {
            ret: Box::new(CType::int()),
            params: vec![CType::int(), CType::int(), CType::int()],
        }));
        let func = values.new_temp(func_ty);
        let args: Vec<ValueId> = (0..3).map(|_| values.new_temp(CType::int())).collect();
        let ret = values.new_temp(CType::int());

        let mut call = CallInstr::new(&values, func, args.clone(), Some(ret));
        call.set_arg_spots(assign_param_spots(&[2, 2, 2]));

        let spotmap = spots(&[
            (func, Spot::frame_cell(-2)),
            (args[0], A),
            (args[1], X),
            (args[2], Y),
            (ret, A),
        ]);
        let insts = emit(&Instr::Call(call), &values, &spotmap, &HashMap::new());

        assert_eq!(
            insts,
            vec![
                AsmInst::Push { src: Y, size: 2 },
                mov(Y, Spot::frame_cell(-2), 2),
                mov(Spot::named(TRAMPOLINE_LO), Y, 2),
                AsmInst::Pop { dst: Y, size: 2 },
                AsmInst::Push {
                    src: Spot::imm("(ret_0)-1"),
                    size: 2
                },
                AsmInst::Jmp(JumpTarget::Indirect(Spot::named(TRAMPOLINE_LO))),
                AsmInst::Label("ret_0".to_string()),
            ]
        );
    }

    #[test]
    fn test_stack_argument_relayed_with_save() {
        // Four word arguments: three in registers, the fourth in the
        // caller's frame. Every register already holds its value, so Y is
        // saved around the copy.
        let mut values = ValueArena::new();
        let func_ty = CType::Function {
            ret: Box::new(CType::Void),
            params: vec![CType::int(); 4],
        };
        let func = values.new_temp(func_ty);
        let args: Vec<ValueId> = (0..4).map(|_| values.new_temp(CType::int())).collect();

        let mut call = CallInstr::new(&values, func, args.clone(), None);
        call.set_arg_spots(assign_param_spots(&[2, 2, 2, 2]));

        let spotmap = spots(&[
            (func, Spot::named("helper")),
            (args[0], A),
            (args[1], X),
            (args[2], Y),
            (args[3], Spot::frame_cell(-6)),
        ]);
        let insts = emit(&Instr::Call(call), &values, &spotmap, &HashMap::new());

        assert_eq!(
            insts,
            vec![
                AsmInst::Push { src: Y, size: 2 },
                mov(Y, Spot::frame_cell(-6), 2),
                mov(Spot::ParentFrame(0x0E), Y, 2),
                AsmInst::Pop { dst: Y, size: 2 },
                AsmInst::Call {
                    target: Spot::imm("helper"),
                    size: 2
                },
            ]
        );
    }

    #[test]
    fn test_call_clobbers_and_conflicts() {
        let mut values = ValueArena::new();
        let func_ty = CType::Function {
            ret: Box::new(CType::int()),
            params: vec![CType::int(); 4],
        };
        let func = values.new_temp(func_ty);
        let args: Vec<ValueId> = (0..4).map(|_| values.new_temp(CType::int())).collect();
        let ret = values.new_temp(CType::int());

        let mut call = CallInstr::new(&values, func, args, Some(ret));
        let arg_spots = assign_param_spots(&[2, 2, 2, 2]);
        call.set_arg_spots(arg_spots.clone());

        let clobbers = call.clobbers();
        for spot in [A, X, Y, Spot::ParentFrame(0x0E)] {
            assert!(clobbers.contains(&spot), "missing clobber {spot:?}");
        }

        let instr = Instr::Call(call);
        assert_eq!(instr.abs_spot_conf()[&func], arg_spots);
    }

    #[test]
    #[should_panic(expected = "argument spots not assigned")]
    fn test_call_without_arg_spots_panics() {
        let mut values = ValueArena::new();
        let func = values.new_temp(int_function());
        let arg = values.new_temp(CType::int());
        let call = CallInstr::new(&values, func, vec![arg], None);
        call.clobbers();
    }

    // --- control flow ----------------------------------------------------

    #[test]
    fn test_return_moves_value_and_restores_frame() {
        let mut values = ValueArena::new();
        let value = values.new_temp(CType::int());

        let spotmap = spots(&[(value, X)]);
        let insts = emit(
            &Instr::Return(ReturnInstr::new(Some(value))),
            &values,
            &spotmap,
            &HashMap::new(),
        );

        assert_eq!(
            insts,
            vec![mov(A, X, 2), AsmInst::Pop { dst: DP, size: 2 }, AsmInst::Ret]
        );
    }

    #[test]
    fn test_conditional_jump_materializes_immediate() {
        let mut values = ValueArena::new();
        let cond = values.new_literal(CType::int(), "1");

        let spotmap = spots(&[(cond, Spot::imm_int(1))]);
        let insts = emit(
            &Instr::JumpZero(CondJumpInstr::new(cond, "end")),
            &values,
            &spotmap,
            &HashMap::new(),
        );

        assert_eq!(
            insts,
            vec![
                mov(A, Spot::imm_int(1), 2),
                AsmInst::Cmp {
                    lhs: A,
                    rhs: Spot::imm_int(0),
                    size: 2
                },
                AsmInst::Je("end".to_string()),
            ]
        );
    }

    #[test]
    fn test_conditional_jump_compares_register_directly() {
        let mut values = ValueArena::new();
        let cond = values.new_temp(CType::int());

        let spotmap = spots(&[(cond, X)]);
        let insts = emit(
            &Instr::JumpNotZero(CondJumpInstr::new(cond, "loop")),
            &values,
            &spotmap,
            &HashMap::new(),
        );

        assert_eq!(
            insts,
            vec![
                AsmInst::Cmp {
                    lhs: X,
                    rhs: Spot::imm_int(0),
                    size: 2
                },
                AsmInst::Jne("loop".to_string()),
            ]
        );
    }

    // --- arithmetic ------------------------------------------------------

    #[test]
    fn test_add_reuses_scratch_register() {
        let mut values = ValueArena::new();
        let out = values.new_temp(CType::int());
        let lhs = values.new_temp(CType::int());
        let rhs = values.new_temp(CType::int());

        let spotmap = spots(&[
            (out, A),
            (lhs, Spot::frame_cell(-2)),
            (rhs, Spot::frame_cell(-4)),
        ]);
        let insts = emit(
            &Instr::Add(BinInstr::new(out, lhs, rhs)),
            &values,
            &spotmap,
            &HashMap::new(),
        );

        assert_eq!(
            insts,
            vec![
                mov(A, Spot::frame_cell(-2), 2),
                AsmInst::Add {
                    dst: A,
                    src: Spot::frame_cell(-4),
                    size: 2
                },
            ]
        );
    }

    #[test]
    fn test_subtract_flips_and_negates() {
        // Only the second operand's spot is reusable, so the difference is
        // computed in flipped order and negated.
        let mut values = ValueArena::new();
        let out = values.new_temp(CType::int());
        let lhs = values.new_temp(CType::int());
        let rhs = values.new_temp(CType::int());

        let spotmap = spots(&[
            (out, Spot::frame_cell(-2)),
            (lhs, Spot::frame_cell(-4)),
            (rhs, A),
        ]);
        let insts = emit(
            &Instr::Sub(BinInstr::new(out, lhs, rhs)),
            &values,
            &spotmap,
            &HashMap::new(),
        );

        assert_eq!(
            insts,
            vec![
                AsmInst::Sub {
                    dst: A,
                    src: Spot::frame_cell(-4),
                    size: 2
                },
                AsmInst::Neg { dst: A, size: 2 },
                mov(Spot::frame_cell(-2), A, 2),
            ]
        );
    }

    #[test]
    fn test_narrow_multiply_pins_registers() {
        let mut values = ValueArena::new();
        let out = values.new_temp(CType::int());
        let lhs = values.new_temp(CType::int());
        let rhs = values.new_temp(CType::int());

        let mul = MulInstr::new(&values, out, lhs, rhs);
        assert_eq!(mul.strategy(), MulStrategy::Narrow);

        let spotmap = spots(&[(out, A), (lhs, X), (rhs, Spot::frame_cell(-2))]);
        let insts = emit(&Instr::Mul(mul), &values, &spotmap, &HashMap::new());

        assert_eq!(
            insts,
            vec![
                mov(A, X, 2),
                mov(Y, Spot::frame_cell(-2), 2),
                AsmInst::Call {
                    target: Spot::imm(NARROW_MULTIPLY_ROUTINE),
                    size: 2
                },
            ]
        );
    }

    #[test]
    fn test_wide_multiply_uses_scratch_cells() {
        let mut values = ValueArena::new();
        let out = values.new_temp(CType::long());
        let lhs = values.new_temp(CType::long());
        let rhs = values.new_temp(CType::long());

        let mul = MulInstr::new(&values, out, lhs, rhs);
        assert_eq!(mul.strategy(), MulStrategy::Wide);

        let spotmap = spots(&[
            (out, Spot::frame_cell(-16)),
            (lhs, Spot::frame_cell(-8)),
            (rhs, Spot::frame_cell(-12)),
        ]);
        let insts = emit(&Instr::Mul(mul), &values, &spotmap, &HashMap::new());

        assert_eq!(
            insts,
            vec![
                mov(Spot::frame_cell(0x06), Spot::frame_cell(-8), 4),
                mov(Spot::frame_cell(0x0A), Spot::frame_cell(-12), 4),
                AsmInst::Call {
                    target: Spot::imm(WIDE_MULTIPLY_ROUTINE),
                    size: 2
                },
                mov(Spot::frame_cell(-16), Spot::frame_cell(0x06), 4),
            ]
        );
    }

    #[test]
    fn test_multiply_canonicalizes_literal_second() {
        let mut values = ValueArena::new();
        let out = values.new_temp(CType::int());
        let lit = values.new_literal(CType::int(), "10");
        let var = values.new_temp(CType::int());

        let mul = MulInstr::new(&values, out, lit, var);
        assert_eq!(mul.arg1, var);
        assert_eq!(mul.arg2, lit);
    }

    #[test]
    fn test_shift_goes_through_routine() {
        let mut values = ValueArena::new();
        let out = values.new_temp(CType::int());
        let value = values.new_temp(CType::int());
        let count = values.new_literal(CType::int(), "3");

        let spotmap = spots(&[
            (out, X),
            (value, Spot::frame_cell(-2)),
            (count, Spot::imm_int(3)),
        ]);
        let insts = emit(
            &Instr::ShiftLeft(BinInstr::new(out, value, count)),
            &values,
            &spotmap,
            &HashMap::new(),
        );

        assert_eq!(
            insts,
            vec![
                mov(A, Spot::frame_cell(-2), 2),
                mov(X, Spot::imm_int(3), 2),
                AsmInst::Call {
                    target: Spot::imm(LEFT_SHIFT_ROUTINE),
                    size: 2
                },
                mov(X, A, 2),
            ]
        );
    }

    #[test]
    fn test_divide_and_modulo_share_the_routine() {
        let mut values = ValueArena::new();
        let out = values.new_temp(CType::int());
        let dividend = values.new_temp(CType::int());
        let divisor = values.new_temp(CType::int());

        let spotmap = spots(&[
            (out, A),
            (dividend, Spot::frame_cell(-2)),
            (divisor, Spot::frame_cell(-4)),
        ]);

        let div = emit(
            &Instr::Div(BinInstr::new(out, dividend, divisor)),
            &values,
            &spotmap,
            &HashMap::new(),
        );
        assert_eq!(
            div,
            vec![
                mov(A, Spot::frame_cell(-2), 2),
                mov(X, Spot::frame_cell(-4), 2),
                AsmInst::Call {
                    target: Spot::imm(DIVMOD_ROUTINE),
                    size: 2
                },
            ]
        );

        // The remainder comes back in Y.
        let rem = emit(
            &Instr::Mod(BinInstr::new(out, dividend, divisor)),
            &values,
            &spotmap,
            &HashMap::new(),
        );
        assert_eq!(*rem.last().unwrap(), mov(A, Y, 2));
    }

    #[test]
    fn test_negate_copies_then_operates() {
        let mut values = ValueArena::new();
        let out = values.new_temp(CType::int());
        let arg = values.new_temp(CType::int());

        let spotmap = spots(&[(out, A), (arg, X)]);
        let insts = emit(
            &Instr::Neg(UnInstr::new(out, arg)),
            &values,
            &spotmap,
            &HashMap::new(),
        );

        assert_eq!(insts, vec![mov(A, X, 2), AsmInst::Neg { dst: A, size: 2 }]);
    }

    // --- value movement --------------------------------------------------

    #[test]
    fn test_set_relays_memory_to_memory() {
        let mut values = ValueArena::new();
        let out = values.new_temp(CType::int());
        let arg = values.new_temp(CType::int());

        let spotmap = spots(&[(out, Spot::frame_cell(-4)), (arg, Spot::frame_cell(-2))]);
        let insts = emit(
            &Instr::Set(SetInstr::new(out, arg)),
            &values,
            &spotmap,
            &HashMap::new(),
        );

        assert_eq!(
            insts,
            vec![
                mov(A, Spot::frame_cell(-2), 2),
                mov(Spot::frame_cell(-4), A, 2),
            ]
        );
    }

    #[test]
    fn test_set_moves_wide_values_word_by_word() {
        let mut values = ValueArena::new();
        let out = values.new_temp(CType::long());
        let arg = values.new_temp(CType::long());

        let spotmap = spots(&[(out, Spot::frame_cell(-8)), (arg, Spot::frame_cell(-4))]);
        let insts = emit(
            &Instr::Set(SetInstr::new(out, arg)),
            &values,
            &spotmap,
            &HashMap::new(),
        );

        assert_eq!(
            insts,
            vec![
                mov(A, Spot::frame_cell(-4), 2),
                mov(Spot::frame_cell(-8), A, 2),
                mov(A, Spot::frame_cell(-2), 2),
                mov(Spot::frame_cell(-6), A, 2),
            ]
        );
    }

    #[test]
    fn test_addrof_materializes_home_address() {
        let mut values = ValueArena::new();
        let var = values.new_variable(CType::int());
        let out = values.new_temp(CType::NearPointer(Box::new(CType::int())));

        let spotmap = spots(&[(out, X)]);
        let homes = spots(&[(var, Spot::named("counter"))]);
        let insts = emit(
            &Instr::AddrOf(AddrOfInstr::new(out, var)),
            &values,
            &spotmap,
            &homes,
        );

        assert_eq!(insts, vec![mov(X, Spot::imm("counter"), 2)]);
    }
}
