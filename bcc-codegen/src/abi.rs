//! Calling convention
//!
//! Parameter placement for the banked target. With only three general
//! registers, one-byte parameters are accepted in `A` alone, two-byte
//! parameters in the first free of `A`, `X`, `Y`, and everything else is
//! read directly out of the caller's stack frame.

use crate::spot::{Spot, A, GENERAL_REGISTERS};
use log::trace;

/// First parent-frame offset used once registers run out
pub const PARENT_FRAME_PARAM_BASE: i32 = 0x0E;

/// Assign a spot to each parameter, given the parameter sizes in bytes.
///
/// Deterministic and side-effect-free; called once per call site and once
/// per function signature. Parameters that fit no free register land at
/// increasing offsets in the caller's frame, each advancing by its own
/// size.
pub fn assign_param_spots(param_sizes: &[u32]) -> Vec<Spot> {
    // `available` keeps the A, X, Y priority order as registers are used.
    let mut available: Vec<Spot> = GENERAL_REGISTERS.to_vec();
    let mut parent_offset = PARENT_FRAME_PARAM_BASE;
    let mut assigned = Vec::with_capacity(param_sizes.len());

    for &size in param_sizes {
        let free = match size {
            1 => available.iter().position(|r| *r == A),
            2 => (!available.is_empty()).then_some(0),
            _ => None,
        };

        let dest = match free {
            Some(i) => available.remove(i),
            None => {
                let spot = Spot::ParentFrame(parent_offset);
                parent_offset += size as i32;
                spot
            }
        };
        trace!("param of size {size} assigned to {dest}");
        assigned.push(dest);
    }

    assigned
}
