//! Method-body format for generated classes
//!
//! A [`MethodBody`] is an append-only instruction buffer plus a constant
//! pool, an exception table, and a declared local-slot count. Jump targets
//! are absolute instruction indices; local slots and constant-pool entries
//! are referenced by explicit index operands.

use once_cell::sync::OnceCell;

use crate::host::value::{Thrown, Value};

/// One instruction of a generated method.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Push the receiver
    LoadSelf,
    /// Push null
    ConstNull,
    /// Push the value in a local slot
    LoadLocal(u16),
    /// Pop into a local slot
    StoreLocal(u16),
    /// Push a `Str` or `Int` constant
    LoadConst(u16),
    /// Resolve a call-site constant and push its bound value.
    ///
    /// Binding happens at most once per call site; later executions reuse
    /// the bound value (or rethrow the bound failure) without re-resolving.
    ResolveCallSite(u16),
    /// Pop `argc` arguments then a callable, invoke it, push the result
    CallIndirect(u8),
    /// Pop six metadata operands and push the constructed metadata record
    NewMetadata,
    /// Pop a caught exception, push its type name
    TypeName,
    /// Pop two strings, push their equality
    StrEq,
    /// Unconditional jump to an instruction index
    Jump(usize),
    /// Pop a boolean, jump if false
    JumpIfFalse(usize),
    /// Pop a caught exception and rethrow it
    Throw,
    /// Pop a closure, push its default representation
    ReprSelf,
    /// Pop the return value and leave the method
    Return,
}

/// A call-site constant: a linkage symbol, its static arguments, and the
/// permanent binding established on first execution.
///
/// Cloning produces a fresh, unbound call site with the same symbol and
/// arguments: bindings belong to one call site, never to the symbol.
#[derive(Debug)]
pub struct CallSiteConst {
    /// Linkage symbol resolved through the host linker
    pub symbol: String,
    /// Static string arguments passed to the bootstrap
    pub args: Vec<String>,
    bound: OnceCell<Result<Value, Thrown>>,
}

impl CallSiteConst {
    /// Create an unbound call-site constant.
    pub fn new(symbol: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            symbol: symbol.into(),
            args,
            bound: OnceCell::new(),
        }
    }

    /// Return the binding, computing it on first use.
    ///
    /// The computation runs at most once for the lifetime of the call site;
    /// both successes and failures are permanent.
    pub fn bind_with(
        &self,
        resolve: impl FnOnce() -> Result<Value, Thrown>,
    ) -> Result<Value, Thrown> {
        self.bound.get_or_init(resolve).clone()
    }

    /// Whether the call site has been bound yet.
    pub fn is_bound(&self) -> bool {
        self.bound.get().is_some()
    }
}

impl Clone for CallSiteConst {
    fn clone(&self) -> Self {
        Self::new(self.symbol.clone(), self.args.clone())
    }
}

/// A constant-pool entry.
#[derive(Debug, Clone)]
pub enum Const {
    /// String constant
    Str(String),
    /// Integer constant
    Int(i64),
    /// Call-site constant
    CallSite(CallSiteConst),
}

/// One catch-all exception scope.
///
/// Covers instructions in `start..end`; a thrown error inside the range
/// transfers control to `handler` with the thrown value on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    /// First covered instruction index
    pub start: usize,
    /// One past the last covered instruction index
    pub end: usize,
    /// Handler instruction index
    pub handler: usize,
}

/// A complete method body.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Instruction buffer
    pub instrs: Vec<Instr>,
    /// Constant pool
    pub constants: Vec<Const>,
    /// Exception scopes, innermost first
    pub exception_table: Vec<ExceptionEntry>,
    /// Number of local slots the body uses
    pub local_count: u16,
}

impl MethodBody {
    /// Structurally verify the body: slot references in bounds, jump targets
    /// inside the buffer, constant operands of the right kind, exception
    /// ranges well-formed.
    pub fn verify(&self) -> Result<(), String> {
        let len = self.instrs.len();
        for (pc, instr) in self.instrs.iter().enumerate() {
            match instr {
                Instr::LoadLocal(slot) | Instr::StoreLocal(slot) => {
                    if *slot >= self.local_count {
                        return Err(format!(
                            "instr {}: slot {} out of range (locals: {})",
                            pc, slot, self.local_count
                        ));
                    }
                }
                Instr::LoadConst(idx) => match self.constants.get(*idx as usize) {
                    Some(Const::Str(_)) | Some(Const::Int(_)) => {}
                    Some(Const::CallSite(_)) => {
                        return Err(format!("instr {}: LoadConst on call-site constant", pc));
                    }
                    None => return Err(format!("instr {}: constant {} out of range", pc, idx)),
                },
                Instr::ResolveCallSite(idx) => match self.constants.get(*idx as usize) {
                    Some(Const::CallSite(_)) => {}
                    Some(_) => {
                        return Err(format!(
                            "instr {}: ResolveCallSite on non-call-site constant",
                            pc
                        ));
                    }
                    None => return Err(format!("instr {}: constant {} out of range", pc, idx)),
                },
                Instr::Jump(target) | Instr::JumpIfFalse(target) => {
                    if *target >= len {
                        return Err(format!("instr {}: jump target {} out of range", pc, target));
                    }
                }
                _ => {}
            }
        }
        for entry in &self.exception_table {
            if entry.start >= entry.end || entry.end > len || entry.handler >= len {
                return Err(format!(
                    "malformed exception range {}..{} -> {}",
                    entry.start, entry.end, entry.handler
                ));
            }
        }
        Ok(())
    }

    /// Find the innermost exception scope covering an instruction index.
    pub fn handler_for(&self, pc: usize) -> Option<usize> {
        self.exception_table
            .iter()
            .find(|e| e.start <= pc && pc < e.end)
            .map(|e| e.handler)
    }
}
