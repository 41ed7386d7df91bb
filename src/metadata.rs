//! Per-closure metadata record
//!
//! A `ClosureMetadata` describes the origin of one synthesized closure
//! instance: the type it was generated for, where its implementation lives,
//! and how that implementation is referenced. The record is baked into the
//! generated class as constants and materialized by the injected code at
//! invocation time, one value per call.

/// How a closure's implementation member is referenced.
///
/// Codes match the host's member-reference encoding and survive round-trips
/// through the constant pool as small integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReferenceKind {
    /// Read of an instance field
    GetField = 1,
    /// Read of a static field
    GetStatic = 2,
    /// Write of an instance field
    PutField = 3,
    /// Write of a static field
    PutStatic = 4,
    /// Virtual method invocation
    InvokeVirtual = 5,
    /// Static method invocation
    InvokeStatic = 6,
    /// Direct (non-virtual) method invocation
    InvokeSpecial = 7,
    /// Constructor invocation
    NewInvokeSpecial = 8,
    /// Interface method invocation
    InvokeInterface = 9,
}

impl ReferenceKind {
    /// Decode a reference kind from its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::GetField),
            2 => Some(Self::GetStatic),
            3 => Some(Self::PutField),
            4 => Some(Self::PutStatic),
            5 => Some(Self::InvokeVirtual),
            6 => Some(Self::InvokeStatic),
            7 => Some(Self::InvokeSpecial),
            8 => Some(Self::NewInvokeSpecial),
            9 => Some(Self::InvokeInterface),
            _ => None,
        }
    }

    /// The wire code for this reference kind.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Access modifier bit-flags for implementation members.
pub mod modifiers {
    /// Publicly accessible member
    pub const PUBLIC: u16 = 0x0001;
    /// Private member
    pub const PRIVATE: u16 = 0x0002;
    /// Protected member
    pub const PROTECTED: u16 = 0x0004;
    /// Static member
    pub const STATIC: u16 = 0x0008;
    /// Final member
    pub const FINAL: u16 = 0x0010;
    /// Compiler-synthesized member
    pub const SYNTHETIC: u16 = 0x1000;
}

/// Immutable description of one generated closure instance.
///
/// Has value equality only; never shared or mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureMetadata {
    /// Type the closure was synthesized for (the declaring call site's type)
    pub target_type: String,
    /// Type declaring the underlying implementation member
    pub declaring_type: String,
    /// Name of the implementation member
    pub member_name: String,
    /// Type signature of the implementation member
    pub signature: String,
    /// How the implementation member is referenced
    pub reference_kind: ReferenceKind,
    /// Access modifier flags of the implementation member
    pub modifiers: u16,
}

impl ClosureMetadata {
    /// Create a metadata record.
    pub fn new(
        target_type: impl Into<String>,
        declaring_type: impl Into<String>,
        member_name: impl Into<String>,
        signature: impl Into<String>,
        reference_kind: ReferenceKind,
        modifiers: u16,
    ) -> Self {
        Self {
            target_type: target_type.into(),
            declaring_type: declaring_type.into(),
            member_name: member_name.into(),
            signature: signature.into(),
            reference_kind,
            modifiers,
        }
    }
}
