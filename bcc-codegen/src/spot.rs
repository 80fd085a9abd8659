//! Storage spots
//!
//! A `Spot` is a place in the machine where an IL value can live: a
//! register, a memory address expression, an immediate, or a slot in the
//! caller's stack frame. Spots are immutable value objects; register
//! allocation produces them and code generation renders them, so equality
//! and hashing are defined on the identifying fields alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpotError {
    #[error("unsupported operand size {size} for `{spot}`")]
    UnsupportedSize { spot: String, size: u32 },

    #[error("cannot offset spot `{spot}`")]
    NotOffsettable { spot: String },

    #[error("memory spot `{spot}` is already indexed")]
    AlreadyIndexed { spot: String },

    #[error("spot `{spot}` has no immediate address form")]
    NoImmediateForm { spot: String },
}

/// Machine register set
///
/// `A`, `X` and `Y` are the general registers, addressable as one or two
/// bytes. `DP` is the direct-page register used as the frame base; `SP` is
/// the stack pointer. Both are two bytes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reg {
    A,
    X,
    Y,
    Dp,
    Sp,
}

impl Reg {
    fn supports_size(self, size: u32) -> bool {
        match self {
            Reg::A | Reg::X | Reg::Y => matches!(size, 0 | 1 | 2),
            Reg::Dp | Reg::Sp => matches!(size, 0 | 2),
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::A => write!(f, "A"),
            Reg::X => write!(f, "X"),
            Reg::Y => write!(f, "Y"),
            Reg::Dp => write!(f, "DP"),
            Reg::Sp => write!(f, "SP"),
        }
    }
}

/// Base of a memory spot: a named external location, or another spot
/// (typically the `DP` register) the address is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemBase {
    Named(String),
    Spot(Box<Spot>),
}

/// Spot in the machine where an IL value can be
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Spot {
    /// A machine register
    Reg(Reg),

    /// Memory at `base + offset + chunk*index` when an index spot is
    /// present, or `base + offset + chunk` when it is not.
    Mem {
        base: MemBase,
        offset: i32,
        chunk: i32,
        index: Option<Box<Spot>>,
    },

    /// An immediate operand. Not a real storage location, but handled as
    /// one so code generation stays uniform.
    Imm(String),

    /// An offset into the caller's stack frame, for parameters passed on
    /// the stack.
    ParentFrame(i32),
}

pub const A: Spot = Spot::Reg(Reg::A);
pub const X: Spot = Spot::Reg(Reg::X);
pub const Y: Spot = Spot::Reg(Reg::Y);
pub const DP: Spot = Spot::Reg(Reg::Dp);
pub const SP: Spot = Spot::Reg(Reg::Sp);

/// The allocatable general registers, in allocation priority order
pub const GENERAL_REGISTERS: [Spot; 3] = [A, X, Y];

impl Spot {
    /// A memory spot at a named external location
    pub fn named(name: impl Into<String>) -> Spot {
        Spot::Mem {
            base: MemBase::Named(name.into()),
            offset: 0,
            chunk: 0,
            index: None,
        }
    }

    /// A memory spot based on another spot, at a fixed offset
    pub fn mem(base: Spot, offset: i32) -> Spot {
        Spot::Mem {
            base: MemBase::Spot(Box::new(base)),
            offset,
            chunk: 0,
            index: None,
        }
    }

    /// A frame-relative memory spot (`DP + offset`)
    pub fn frame_cell(offset: i32) -> Spot {
        Spot::mem(DP, offset)
    }

    /// An immediate with the given textual form
    pub fn imm(text: impl Into<String>) -> Spot {
        Spot::Imm(text.into())
    }

    /// An integer immediate
    pub fn imm_int(value: i64) -> Spot {
        Spot::Imm(value.to_string())
    }

    pub fn is_register(&self) -> bool {
        matches!(self, Spot::Reg(_))
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Spot::Imm(_))
    }

    fn describe(&self) -> String {
        format!("{self:?}")
    }

    /// The textual operand form of this spot for the given width in bytes.
    ///
    /// Size 0 means the spot's natural width. Fails for widths the spot
    /// cannot represent, e.g. a four-byte rendering of a general register.
    pub fn asm_operand(&self, size: u32) -> Result<String, SpotError> {
        match self {
            Spot::Reg(reg) => {
                if reg.supports_size(size) {
                    Ok(reg.to_string())
                } else {
                    Err(SpotError::UnsupportedSize {
                        spot: self.describe(),
                        size,
                    })
                }
            }
            Spot::Imm(text) => Ok(text.clone()),
            Spot::ParentFrame(offset) => Ok(format!("PARENT_DP+{offset}")),
            Spot::Mem {
                base,
                offset,
                chunk,
                index,
            } => {
                let base_str = match base {
                    MemBase::Named(name) => name.clone(),
                    MemBase::Spot(spot) => spot.asm_operand(0)?,
                };

                // Without an index the chunk is a plain byte offset.
                let total_offset = if index.is_none() {
                    offset + chunk
                } else {
                    *offset
                };

                let mut expr = match total_offset {
                    0 => base_str,
                    o if o > 0 => format!("{base_str}+{o}"),
                    o => format!("{base_str}-{}", -o),
                };

                if let Some(count) = index {
                    let count_str = count.asm_operand(0)?;
                    if *chunk > 0 {
                        expr = format!("{expr}+{chunk}*{count_str}");
                    } else if *chunk < 0 {
                        expr = format!("{expr}-{}*{count_str}", -chunk);
                    }
                }

                let size_desc = match size {
                    1 => "BYTE ",
                    2 => "WORD ",
                    4 => "LONG ",
                    _ => "",
                };
                Ok(format!("{size_desc}[{expr}]"))
            }
        }
    }

    /// This spot's offset from the frame base.
    ///
    /// Used by the register allocator to size the stack frame. Zero for
    /// anything that is not a `DP`-relative memory spot.
    pub fn frame_offset(&self) -> i32 {
        match self {
            Spot::Mem {
                base: MemBase::Spot(base),
                offset,
                ..
            } if **base == DP => *offset,
            _ => 0,
        }
    }

    /// A new spot shifted relative to this one.
    ///
    /// `chunk` is a byte offset; `index`, if given, is a register spot
    /// holding a runtime count of `chunk`-sized elements. Registers cannot
    /// be offset at all; immediates and parent-frame spots take no index.
    pub fn shift(&self, chunk: i32, index: Option<Spot>) -> Result<Spot, SpotError> {
        match self {
            Spot::Reg(_) => {
                if chunk == 0 && index.is_none() {
                    Ok(self.clone())
                } else {
                    Err(SpotError::NotOffsettable {
                        spot: self.describe(),
                    })
                }
            }
            Spot::Imm(text) => {
                if index.is_some() {
                    return Err(SpotError::NotOffsettable {
                        spot: self.describe(),
                    });
                }
                Ok(Spot::Imm(format!("({}>>{})", text, 8 * chunk)))
            }
            Spot::ParentFrame(offset) => {
                if index.is_some() {
                    return Err(SpotError::NotOffsettable {
                        spot: self.describe(),
                    });
                }
                Ok(Spot::ParentFrame(offset + chunk))
            }
            Spot::Mem {
                base,
                offset,
                chunk: old_chunk,
                index: old_index,
            } => {
                if let Some(count) = index {
                    if old_index.is_some() {
                        return Err(SpotError::AlreadyIndexed {
                            spot: self.describe(),
                        });
                    }
                    // The previous chunk becomes part of the fixed offset.
                    Ok(Spot::Mem {
                        base: base.clone(),
                        offset: offset + old_chunk,
                        chunk,
                        index: Some(Box::new(count)),
                    })
                } else {
                    Ok(Spot::Mem {
                        base: base.clone(),
                        offset: offset + chunk,
                        chunk: *old_chunk,
                        index: old_index.clone(),
                    })
                }
            }
        }
    }

    /// The immediate form of this spot's address.
    ///
    /// Only a plain named memory spot (no offset, chunk or index) has one;
    /// immediates return themselves.
    pub fn to_immediate(&self) -> Result<Spot, SpotError> {
        match self {
            Spot::Imm(_) => Ok(self.clone()),
            Spot::Mem {
                base: MemBase::Named(name),
                offset: 0,
                chunk: 0,
                index: None,
            } => Ok(Spot::Imm(name.clone())),
            _ => Err(SpotError::NoImmediateForm {
                spot: self.describe(),
            }),
        }
    }
}

impl fmt::Display for Spot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.asm_operand(0) {
            Ok(text) => write!(f, "{text}"),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}
