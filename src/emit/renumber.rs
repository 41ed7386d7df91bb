//! Local-slot renumbering
//!
//! Shifts every pre-existing local-slot reference in a method body upward
//! by a fixed offset, freeing the low slot numbers for instructions the
//! splicer is about to prepend. The set and order of instructions are
//! preserved; only slot operands and the declared local count change.
//! Getting this wrong corrupts the method in a way only the host's
//! verifier catches, so the adapter refuses any shift that would overflow
//! the slot space.

use crate::emit::EmitError;
use crate::host::bytecode::{Instr, MethodBody};

/// Renumbers local slots by a fixed upward offset.
#[derive(Debug, Clone, Copy)]
pub struct SlotRenumberer {
    offset: u16,
}

impl SlotRenumberer {
    /// Create a renumberer shifting slots up by `offset`.
    pub fn new(offset: u16) -> Self {
        Self { offset }
    }

    /// Shift every slot reference in the body, raising the local count to
    /// cover the freed range.
    pub fn renumber(&self, mut body: MethodBody) -> Result<MethodBody, EmitError> {
        for instr in &mut body.instrs {
            match instr {
                Instr::LoadLocal(slot) | Instr::StoreLocal(slot) => {
                    *slot = slot
                        .checked_add(self.offset)
                        .ok_or(EmitError::SlotOverflow(*slot))?;
                }
                _ => {}
            }
        }
        body.local_count = body
            .local_count
            .checked_add(self.offset)
            .ok_or(EmitError::SlotOverflow(body.local_count))?;
        Ok(body)
    }
}
