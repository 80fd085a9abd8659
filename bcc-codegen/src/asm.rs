//! Assembly instruction layer
//!
//! The architecture-level operations the IL layer emits, with operands
//! resolved to spots, plus the accumulator that collects them and renders
//! the final assembly text.

use crate::spot::{Spot, SpotError};
use bcc_common::LabelGenerator;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error(transparent)]
    Spot(#[from] SpotError),

    #[error("internal codegen error: {0}")]
    Internal(String),
}

/// Target of a jump: a label, or indirect through a memory slot
#[derive(Debug, Clone, PartialEq)]
pub enum JumpTarget {
    Label(String),
    /// Jump through the address stored at a named memory spot
    Indirect(Spot),
}

/// One emitted machine operation
///
/// Sizes are operand widths in bytes. Rendering resolves every operand to
/// its textual form; an operand that cannot represent its width surfaces a
/// `CodegenError` rather than producing wrong text.
#[derive(Debug, Clone, PartialEq)]
pub enum AsmInst {
    Mov { dst: Spot, src: Spot, size: u32 },
    Add { dst: Spot, src: Spot, size: u32 },
    Sub { dst: Spot, src: Spot, size: u32 },
    Neg { dst: Spot, size: u32 },
    Not { dst: Spot, size: u32 },
    Cmp { lhs: Spot, rhs: Spot, size: u32 },
    Push { src: Spot, size: u32 },
    Pop { dst: Spot, size: u32 },
    Jmp(JumpTarget),
    Je(String),
    Jne(String),
    Call { target: Spot, size: u32 },
    Ret,
    Label(String),
}

impl AsmInst {
    /// Render this instruction as one line of assembly text
    pub fn render(&self) -> Result<String, CodegenError> {
        let text = match self {
            AsmInst::Mov { dst, src, size } => {
                format!("MOV {}, {}", dst.asm_operand(*size)?, src.asm_operand(*size)?)
            }
            AsmInst::Add { dst, src, size } => {
                format!("ADD {}, {}", dst.asm_operand(*size)?, src.asm_operand(*size)?)
            }
            AsmInst::Sub { dst, src, size } => {
                format!("SUB {}, {}", dst.asm_operand(*size)?, src.asm_operand(*size)?)
            }
            AsmInst::Neg { dst, size } => format!("NEG {}", dst.asm_operand(*size)?),
            AsmInst::Not { dst, size } => format!("NOT {}", dst.asm_operand(*size)?),
            AsmInst::Cmp { lhs, rhs, size } => {
                format!("CMP {}, {}", lhs.asm_operand(*size)?, rhs.asm_operand(*size)?)
            }
            AsmInst::Push { src, size } => format!("PUSH {}", src.asm_operand(*size)?),
            AsmInst::Pop { dst, size } => format!("POP {}", dst.asm_operand(*size)?),
            AsmInst::Jmp(JumpTarget::Label(label)) => format!("JMP {label}"),
            AsmInst::Jmp(JumpTarget::Indirect(slot)) => {
                // Indirection is only encodable through a plain named slot.
                format!("JMP ({})", slot.to_immediate()?.asm_operand(0)?)
            }
            AsmInst::Je(label) => format!("JE {label}"),
            AsmInst::Jne(label) => format!("JNE {label}"),
            AsmInst::Call { target, size } => {
                format!("CALL {}", target.asm_operand(*size)?)
            }
            AsmInst::Ret => "RET".to_string(),
            AsmInst::Label(label) => format!("{label}:"),
        };
        Ok(text)
    }
}

/// Accumulator for emitted instructions
///
/// Owned by the driver of a single function's emission; instructions never
/// choose labels themselves, they ask this accumulator for fresh ones.
#[derive(Debug, Default)]
pub struct AsmCode {
    insts: Vec<AsmInst>,
    labels: LabelGenerator,
}

impl AsmCode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, inst: AsmInst) {
        self.insts.push(inst);
    }

    /// A fresh label unique within this emission
    pub fn new_label(&mut self) -> String {
        self.labels.new_label_with_prefix("ret")
    }

    pub fn instructions(&self) -> &[AsmInst] {
        &self.insts
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Render the accumulated stream as assembly text
    pub fn render(&self) -> Result<String, CodegenError> {
        render_assembly(&self.insts)
    }
}

/// Main entry point for final text generation
pub fn render_assembly(insts: &[AsmInst]) -> Result<String, CodegenError> {
    let mut lines = Vec::with_capacity(insts.len());
    for inst in insts {
        let line = inst.render()?;
        if matches!(inst, AsmInst::Label(_)) {
            lines.push(line);
        } else {
            lines.push(format!("    {line}"));
        }
    }
    Ok(lines.join("\n"))
}
