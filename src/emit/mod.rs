//! Method-body emission
//!
//! The splicing engine: an instruction builder with explicit labels and
//! slots, the local-slot renumbering adapter, and the splice routine that
//! grafts the strategy-dispatch path onto a native repr body.

pub mod builder;
pub mod renumber;
pub mod splicer;

pub use builder::{Label, MethodBuilder};
pub use renumber::SlotRenumberer;
pub use splicer::{MethodSplicer, RESERVED_SLOTS};

/// Emission errors.
///
/// These indicate a defect in the splicing engine or an impossible input,
/// never a caller error; the interceptor degrades to the untouched native
/// body when one occurs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    /// A jump or exception range referenced a label that was never marked.
    #[error("label {0} is used but never marked")]
    UnmarkedLabel(usize),

    /// Renumbering would push a slot past the 16-bit slot space.
    #[error("slot renumbering overflows slot {0}")]
    SlotOverflow(u16),

    /// The body to splice into has no instructions to fall back to.
    #[error("native body is empty; nothing to fall back to")]
    EmptyNativeBody,
}
