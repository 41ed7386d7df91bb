//! Repr method splicing
//!
//! Grafts the strategy-dispatch path onto the factory's native repr body.
//! The result implements, as a structured exception scope:
//!
//! ```text
//! try:
//!     strategy = resolve_via_call_site(identifier)   // bound once per call site
//!     meta     = new metadata from baked constants
//!     return strategy(self, meta)
//! catch e:
//!     if type_name(e) == FORMAT_ERROR_TYPE_NAME: rethrow e
//!     else: fall through into the native body        // default representation
//! ```
//!
//! The error check compares type names as strings: under restricted
//! visibility the generated class cannot reference the formatting-error
//! type at all, so a type test is not expressible there.
//!
//! The native instructions survive verbatim at the tail of the spliced
//! body, with their slots renumbered past the reserve and their jump
//! targets and exception ranges rebased past the prelude. Falling back
//! therefore yields bit-for-bit the representation the host would have
//! produced untouched.

use crate::dispatch::DISPATCH_SYMBOL;
use crate::emit::builder::MethodBuilder;
use crate::emit::renumber::SlotRenumberer;
use crate::emit::EmitError;
use crate::host::bytecode::{ExceptionEntry, Instr, MethodBody};
use crate::metadata::ClosureMetadata;

/// Low slots reserved for the spliced code: the caught exception, two
/// branch temporaries, and the result value.
pub const RESERVED_SLOTS: u16 = 4;

const SLOT_EXCEPTION: u16 = 0;
const SLOT_STRATEGY: u16 = 1;
const SLOT_RETHROW: u16 = 2;
const SLOT_RESULT: u16 = 3;

/// Splices the dispatch path into native repr bodies.
#[derive(Debug, Clone)]
pub struct MethodSplicer {
    identifier: String,
}

impl MethodSplicer {
    /// Create a splicer baking the given strategy identifier into every
    /// method it emits.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    /// The strategy identifier this splicer bakes into emitted code.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Transform a native repr body into the guarded dispatch body.
    pub fn splice_repr(
        &self,
        native: MethodBody,
        metadata: &ClosureMetadata,
    ) -> Result<MethodBody, EmitError> {
        if native.instrs.is_empty() {
            return Err(EmitError::EmptyNativeBody);
        }
        let native = SlotRenumberer::new(RESERVED_SLOTS).renumber(native)?;

        let mut b = MethodBuilder::with_pool(native.constants, native.local_count);

        let call_site = b.const_call_site(DISPATCH_SYMBOL, vec![self.identifier.clone()]);
        let c_target = b.const_str(&metadata.target_type);
        let c_declaring = b.const_str(&metadata.declaring_type);
        let c_member = b.const_str(&metadata.member_name);
        let c_signature = b.const_str(&metadata.signature);
        let c_ref_kind = b.const_int(metadata.reference_kind.code() as i64);
        let c_modifiers = b.const_int(metadata.modifiers as i64);
        let c_error_name = b.const_str(crate::strategy::FORMAT_ERROR_TYPE_NAME);

        let try_start = b.define_label();
        let try_end = b.define_label();
        let handler = b.define_label();
        let fallback = b.define_label();

        // try { return strategy(self, metadata) }
        b.mark_label(try_start);
        b.resolve_call_site(call_site);
        b.store_local(SLOT_STRATEGY);
        b.load_local(SLOT_STRATEGY);
        b.load_self();
        b.load_const(c_target);
        b.load_const(c_declaring);
        b.load_const(c_member);
        b.load_const(c_signature);
        b.load_const(c_ref_kind);
        b.load_const(c_modifiers);
        b.new_metadata();
        b.call_indirect(2);
        b.store_local(SLOT_RESULT);
        b.load_local(SLOT_RESULT);
        b.ret();
        b.mark_label(try_end);

        // catch: rethrow formatting errors, fall back for everything else
        b.mark_label(handler);
        b.store_local(SLOT_EXCEPTION);
        b.load_local(SLOT_EXCEPTION);
        b.type_name();
        b.load_const(c_error_name);
        b.str_eq();
        b.jump_if_false(fallback);
        b.load_local(SLOT_EXCEPTION);
        b.store_local(SLOT_RETHROW);
        b.load_local(SLOT_RETHROW);
        b.throw();
        b.mark_label(fallback);

        b.exception_range(try_start, try_end, handler);
        let head = b.finish()?;

        // Append the renumbered native instructions past the prelude,
        // rebasing their jump targets and exception ranges.
        let base = head.instrs.len();
        let mut instrs = head.instrs;
        instrs.extend(native.instrs.into_iter().map(|instr| match instr {
            Instr::Jump(t) => Instr::Jump(t + base),
            Instr::JumpIfFalse(t) => Instr::JumpIfFalse(t + base),
            other => other,
        }));

        let mut exception_table = head.exception_table;
        exception_table.extend(native.exception_table.into_iter().map(|e| ExceptionEntry {
            start: e.start + base,
            end: e.end + base,
            handler: e.handler + base,
        }));

        Ok(MethodBody {
            instrs,
            constants: head.constants,
            exception_table,
            local_count: head.local_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::bytecode::Const;
    use crate::metadata::{modifiers, ReferenceKind};

    fn native_body() -> MethodBody {
        MethodBody {
            instrs: vec![
                Instr::LoadSelf,
                Instr::ReprSelf,
                Instr::StoreLocal(0),
                Instr::LoadLocal(0),
                Instr::Return,
            ],
            constants: Vec::new(),
            exception_table: Vec::new(),
            local_count: 1,
        }
    }

    fn metadata() -> ClosureMetadata {
        ClosureMetadata::new(
            "demo.Mapper",
            "demo.Strings",
            "upper",
            "(string)string",
            ReferenceKind::InvokeStatic,
            modifiers::PUBLIC | modifiers::STATIC,
        )
    }

    #[test]
    fn test_spliced_body_verifies() {
        let spliced = MethodSplicer::new("demo.Strategy")
            .splice_repr(native_body(), &metadata())
            .unwrap();
        assert!(spliced.verify().is_ok());
    }

    #[test]
    fn test_prelude_opens_with_call_site_resolution() {
        let spliced = MethodSplicer::new("demo.Strategy")
            .splice_repr(native_body(), &metadata())
            .unwrap();
        assert!(matches!(spliced.instrs[0], Instr::ResolveCallSite(_)));
        match &spliced.constants[0] {
            Const::CallSite(cs) => {
                assert_eq!(cs.symbol, DISPATCH_SYMBOL);
                assert_eq!(cs.args, vec!["demo.Strategy".to_string()]);
                assert!(!cs.is_bound());
            }
            other => panic!("expected call site, got {:?}", other),
        }
    }

    #[test]
    fn test_exception_scope_covers_dispatch_path_only() {
        let spliced = MethodSplicer::new("demo.Strategy")
            .splice_repr(native_body(), &metadata())
            .unwrap();

        let entry = spliced.exception_table[0];
        assert_eq!(entry.start, 0);
        assert_eq!(entry.end, entry.handler);
        // Handler and fallback live outside the covered range.
        assert!(entry.handler < spliced.instrs.len());
    }

    #[test]
    fn test_native_instructions_survive_renumbered_at_tail() {
        let spliced = MethodSplicer::new("demo.Strategy")
            .splice_repr(native_body(), &metadata())
            .unwrap();

        let tail = &spliced.instrs[spliced.instrs.len() - 5..];
        assert_eq!(
            tail,
            &[
                Instr::LoadSelf,
                Instr::ReprSelf,
                Instr::StoreLocal(RESERVED_SLOTS),
                Instr::LoadLocal(RESERVED_SLOTS),
                Instr::Return,
            ]
        );
        assert_eq!(spliced.local_count, 1 + RESERVED_SLOTS);
    }

    #[test]
    fn test_fallback_branch_lands_on_native_body() {
        let spliced = MethodSplicer::new("demo.Strategy")
            .splice_repr(native_body(), &metadata())
            .unwrap();

        let native_start = spliced.instrs.len() - 5;
        let branch = spliced
            .instrs
            .iter()
            .find_map(|i| match i {
                Instr::JumpIfFalse(t) => Some(*t),
                _ => None,
            })
            .unwrap();
        assert_eq!(branch, native_start);
    }

    #[test]
    fn test_native_constant_indices_preserved() {
        let mut native = native_body();
        native.constants.push(Const::Str("kept".to_string()));
        native.instrs.insert(0, Instr::LoadConst(0));
        native.instrs.insert(1, Instr::StoreLocal(0));

        let spliced = MethodSplicer::new("demo.Strategy")
            .splice_repr(native, &metadata())
            .unwrap();

        // The seeded pool keeps index 0; spliced constants follow it.
        assert!(matches!(&spliced.constants[0], Const::Str(s) if s == "kept"));
        assert!(matches!(&spliced.constants[1], Const::CallSite(_)));
    }

    #[test]
    fn test_empty_native_body_is_rejected() {
        let empty = MethodBody {
            instrs: Vec::new(),
            constants: Vec::new(),
            exception_table: Vec::new(),
            local_count: 0,
        };
        assert_eq!(
            MethodSplicer::new("demo.Strategy")
                .splice_repr(empty, &metadata())
                .unwrap_err(),
            EmitError::EmptyNativeBody
        );
    }
}
