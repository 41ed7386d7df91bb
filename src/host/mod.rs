//! Minimal managed-runtime host
//!
//! Models the runtime the repr agent attaches to: a closure factory that
//! synthesizes classes through a visitor-style class writer, a verified
//! method-body format over a small instruction set, a loader-scoped dynamic
//! linker, and a stack-machine evaluator with structured exception scopes.
//!
//! Nothing in this module knows about strategies, the interceptor, or the
//! splicer. The agent reaches the host exclusively through two seams:
//! the class-transform hook on [`ClosureFactory`] and the symbol table in
//! [`linker`].

pub mod bytecode;
pub mod closure;
pub mod eval;
pub mod linker;
pub mod value;
pub mod writer;

pub use bytecode::{CallSiteConst, Const, ExceptionEntry, Instr, MethodBody};
pub use closure::{ClosureFactory, ClosureInstance, ClosureSpec};
pub use value::{Thrown, Value};
pub use writer::{access, ClassDecl, ClassVisitor, ClassWriter, GeneratedClass};

/// Superclass name the closure factory emits for every synthesized class.
pub const CLOSURE_SUPER: &str = "runtime.Closure";

/// Name of the string-representation method on synthesized classes.
pub const REPR_METHOD: &str = "repr";

/// Name of the functional entry point on synthesized classes.
pub const INVOKE_METHOD: &str = "invoke";

/// Class-format version the factory emits.
pub const CLASS_VERSION: u16 = 1;

/// Visibility of a generated class toward dynamically registered linkage
/// symbols.
///
/// A class under [`LoaderScope::Restricted`] was defined by a loader that
/// cannot see symbols registered after process start (such as the repr
/// agent's dispatch bootstrap); resolving a call site from such a class
/// raises a `runtime.NoDefError` at invocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderScope {
    /// Full visibility into the linker symbol table
    Unrestricted,
    /// No visibility into dynamically registered symbols
    Restricted,
}

/// Host-side synthesis errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    /// A generated method body failed structural verification.
    #[error("verification failed: {0}")]
    Verify(String),

    /// The visitor chain completed without producing a class.
    #[error("class emission did not complete")]
    EmissionIncomplete,

    /// A closure was instantiated with the wrong number of captures.
    #[error("capture arity mismatch: expected {expected}, got {actual}")]
    CaptureArity {
        /// Captures declared by the closure spec
        expected: usize,
        /// Captures supplied at instantiation
        actual: usize,
    },
}
