//! Value movement instructions: copies and address-of

use crate::instr::{emit_relay_move, EmitCtx};
use crate::value::ValueId;
use bcc_codegen::{AsmInst, CodegenError};

/// Copy the input value to the output value
#[derive(Debug, Clone)]
pub struct SetInstr {
    pub output: ValueId,
    pub arg: ValueId,
}

impl SetInstr {
    pub fn new(output: ValueId, arg: ValueId) -> Self {
        Self { output, arg }
    }

    pub(crate) fn emit(&self, ctx: &mut EmitCtx) -> Result<(), CodegenError> {
        let src = ctx.spot(self.arg);
        let dst = ctx.spot(self.output);
        if src == dst {
            return Ok(());
        }

        let size = ctx.values.size(self.arg);
        if size <= 2 && (dst.is_register() || src.is_register() || src.is_immediate()) {
            ctx.out.add(AsmInst::Mov { dst, src, size });
        } else {
            // Memory never moves to memory directly; wide values move one
            // word at a time.
            let relay = ctx.temp_register(&[], &[]);
            emit_relay_move(ctx.out, &dst, &src, size, &relay)?;
        }
        Ok(())
    }
}

/// Materialize the address of a variable's home storage
#[derive(Debug, Clone)]
pub struct AddrOfInstr {
    pub output: ValueId,
    pub var: ValueId,
}

impl AddrOfInstr {
    pub fn new(output: ValueId, var: ValueId) -> Self {
        Self { output, var }
    }

    pub(crate) fn emit(&self, ctx: &mut EmitCtx) -> Result<(), CodegenError> {
        let addr = ctx.home_spot(self.var).to_immediate()?;
        let dst = ctx.spot(self.output);
        if dst != addr {
            ctx.out.add(AsmInst::Mov {
                dst,
                src: addr,
                size: ctx.values.size(self.output),
            });
        }
        Ok(())
    }
}
