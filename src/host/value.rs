//! Runtime values and thrown errors

use std::fmt;
use std::sync::Arc;

use crate::host::closure::ClosureInstance;
use crate::metadata::ClosureMetadata;

/// Type name of the error thrown when a call-site symbol cannot be resolved
/// under the current loader scope.
pub const NO_DEF_ERROR: &str = "runtime.NoDefError";

/// Type name of errors raised by the evaluator itself (malformed stack or
/// operand state). These indicate a defect in emitted code, not a caller
/// error.
pub const INTERNAL_ERROR: &str = "runtime.InternalError";

/// A linked callable bound to a call site.
pub type LinkedFn = Arc<dyn Fn(&[Value]) -> Result<Value, Thrown> + Send + Sync>;

/// A value on the evaluator's operand stack or in a local slot.
#[derive(Clone)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// String
    Str(String),
    /// Closure origin metadata
    Metadata(ClosureMetadata),
    /// Reference to a closure instance
    Closure(Arc<ClosureInstance>),
    /// Callable bound through the linker
    Fn(LinkedFn),
    /// Caught thrown error, live inside an exception handler
    Exception(Thrown),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Metadata(m) => write!(f, "metadata({})", m.member_name),
            Value::Closure(c) => write!(f, "closure({})", c.class_name()),
            Value::Fn(_) => write!(f, "fn(..)"),
            Value::Exception(t) => write!(f, "exception({})", t.type_name),
        }
    }
}

/// An error thrown inside the evaluator.
///
/// Carries its type as a plain name so generated code can distinguish error
/// categories by string comparison even when it cannot reference the error
/// type itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{type_name}: {message}")]
pub struct Thrown {
    /// Stable name of the error's type
    pub type_name: String,
    /// Human-readable detail
    pub message: String,
}

impl Thrown {
    /// Create a thrown error with an explicit type name.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Missing-definition error for an unresolvable symbol.
    pub fn no_def(symbol: &str) -> Self {
        Self::new(NO_DEF_ERROR, format!("symbol not visible: {}", symbol))
    }

    /// Internal evaluator error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}
