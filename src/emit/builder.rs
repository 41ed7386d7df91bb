//! Instruction builder with label patching
//!
//! Emits into an append-only instruction buffer. Jump targets are labels
//! resolved at `finish()`; constants are appended to a pool that may be
//! seeded from an existing body so pre-existing constant indices stay
//! valid.

use crate::emit::EmitError;
use crate::host::bytecode::{CallSiteConst, Const, ExceptionEntry, Instr, MethodBody};

/// A forward-referencable position in the instruction buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    id: usize,
}

/// Builder for one method body.
#[derive(Debug)]
pub struct MethodBuilder {
    instrs: Vec<Instr>,
    constants: Vec<Const>,
    local_count: u16,
    labels: Vec<Option<usize>>,
    patches: Vec<(usize, Label)>,
    ranges: Vec<(Label, Label, Label)>,
}

impl MethodBuilder {
    /// Create a builder seeded with an existing constant pool.
    ///
    /// Indices into the seed pool remain valid; new constants are appended
    /// after it.
    pub fn with_pool(constants: Vec<Const>, local_count: u16) -> Self {
        Self {
            instrs: Vec::new(),
            constants,
            local_count,
            labels: Vec::new(),
            patches: Vec::new(),
            ranges: Vec::new(),
        }
    }

    /// Create a builder with an empty pool.
    pub fn new(local_count: u16) -> Self {
        Self::with_pool(Vec::new(), local_count)
    }

    /// Current instruction index.
    pub fn position(&self) -> usize {
        self.instrs.len()
    }

    // ===== Constants =====

    /// Append a string constant, returning its pool index.
    pub fn const_str(&mut self, value: &str) -> u16 {
        self.push_const(Const::Str(value.to_string()))
    }

    /// Append an integer constant, returning its pool index.
    pub fn const_int(&mut self, value: i64) -> u16 {
        self.push_const(Const::Int(value))
    }

    /// Append an unbound call-site constant, returning its pool index.
    pub fn const_call_site(&mut self, symbol: &str, args: Vec<String>) -> u16 {
        self.push_const(Const::CallSite(CallSiteConst::new(symbol, args)))
    }

    fn push_const(&mut self, c: Const) -> u16 {
        let idx = self.constants.len();
        self.constants.push(c);
        idx as u16
    }

    // ===== Labels =====

    /// Define a label for later marking.
    pub fn define_label(&mut self) -> Label {
        let id = self.labels.len();
        self.labels.push(None);
        Label { id }
    }

    /// Mark a label at the current position.
    pub fn mark_label(&mut self, label: Label) {
        self.labels[label.id] = Some(self.instrs.len());
    }

    /// Record a catch-all exception scope over `from..to` handled at
    /// `handler`. Resolved at `finish()`.
    pub fn exception_range(&mut self, from: Label, to: Label, handler: Label) {
        self.ranges.push((from, to, handler));
    }

    // ===== Instructions =====

    /// Emit `LoadSelf`.
    pub fn load_self(&mut self) {
        self.instrs.push(Instr::LoadSelf);
    }

    /// Emit `ConstNull`.
    pub fn const_null(&mut self) {
        self.instrs.push(Instr::ConstNull);
    }

    /// Emit a load from a local slot.
    pub fn load_local(&mut self, slot: u16) {
        self.instrs.push(Instr::LoadLocal(slot));
    }

    /// Emit a store to a local slot.
    pub fn store_local(&mut self, slot: u16) {
        self.instrs.push(Instr::StoreLocal(slot));
    }

    /// Emit a constant push.
    pub fn load_const(&mut self, idx: u16) {
        self.instrs.push(Instr::LoadConst(idx));
    }

    /// Emit a call-site resolution.
    pub fn resolve_call_site(&mut self, idx: u16) {
        self.instrs.push(Instr::ResolveCallSite(idx));
    }

    /// Emit an indirect call through a callable on the stack.
    pub fn call_indirect(&mut self, argc: u8) {
        self.instrs.push(Instr::CallIndirect(argc));
    }

    /// Emit metadata construction from six stack operands.
    pub fn new_metadata(&mut self) {
        self.instrs.push(Instr::NewMetadata);
    }

    /// Emit extraction of a caught exception's type name.
    pub fn type_name(&mut self) {
        self.instrs.push(Instr::TypeName);
    }

    /// Emit string equality.
    pub fn str_eq(&mut self) {
        self.instrs.push(Instr::StrEq);
    }

    /// Emit an unconditional jump to a label.
    pub fn jump(&mut self, label: Label) {
        self.patches.push((self.instrs.len(), label));
        self.instrs.push(Instr::Jump(usize::MAX));
    }

    /// Emit a conditional jump to a label, taken when the popped boolean is
    /// false.
    pub fn jump_if_false(&mut self, label: Label) {
        self.patches.push((self.instrs.len(), label));
        self.instrs.push(Instr::JumpIfFalse(usize::MAX));
    }

    /// Emit a rethrow of a caught exception.
    pub fn throw(&mut self) {
        self.instrs.push(Instr::Throw);
    }

    /// Emit a return.
    pub fn ret(&mut self) {
        self.instrs.push(Instr::Return);
    }

    // ===== Finalization =====

    fn resolve(&self, label: Label) -> Result<usize, EmitError> {
        self.labels[label.id].ok_or(EmitError::UnmarkedLabel(label.id))
    }

    /// Patch all labels and produce the body.
    pub fn finish(self) -> Result<MethodBody, EmitError> {
        let mut instrs = self.instrs.clone();
        for (pos, label) in &self.patches {
            let target = self.resolve(*label)?;
            match &mut instrs[*pos] {
                Instr::Jump(t) | Instr::JumpIfFalse(t) => *t = target,
                _ => {}
            }
        }

        let mut exception_table = Vec::with_capacity(self.ranges.len());
        for (from, to, handler) in &self.ranges {
            exception_table.push(ExceptionEntry {
                start: self.resolve(*from)?,
                end: self.resolve(*to)?,
                handler: self.resolve(*handler)?,
            });
        }

        Ok(MethodBody {
            instrs,
            constants: self.constants,
            exception_table,
            local_count: self.local_count,
        })
    }
}
