//! Pluggable representation strategies
//!
//! A strategy turns a closure instance and its metadata into a descriptive
//! string. Implementations are registered under a stable string identifier
//! with a zero-argument constructor; the dispatch layer resolves and caches
//! them by that identifier at run time.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::host::ClosureInstance;
use crate::metadata::ClosureMetadata;

/// Stable type name carried by formatting failures when they cross
/// generated code as thrown values.
///
/// Generated code cannot reference the error type itself under restricted
/// visibility, so the injected handler compares this name by string
/// equality to decide between rethrowing and falling back.
pub const FORMAT_ERROR_TYPE_NAME: &str = "closure_repr.FormatError";

/// A strategy deliberately reporting that it cannot format an instance.
///
/// This is a domain-level fault and is always propagated to the caller of
/// the representation operation, never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FormatError {
    /// What went wrong
    pub message: String,
}

impl FormatError {
    /// Create a formatting failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A pluggable formatter for closure instances.
pub trait ReprStrategy: Send + Sync {
    /// Produce a descriptive string for the instance, or fail with a
    /// formatting error.
    fn format(
        &self,
        closure: &ClosureInstance,
        metadata: &ClosureMetadata,
    ) -> Result<String, FormatError>;
}

impl std::fmt::Debug for dyn ReprStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ReprStrategy")
    }
}

/// Zero-argument strategy constructor.
///
/// Fallible so registrations can model types that exist but cannot be
/// instantiated.
pub type StrategyCtor = fn() -> Result<Arc<dyn ReprStrategy>, String>;

static REGISTRY: Lazy<DashMap<String, StrategyCtor>> = Lazy::new(DashMap::new);

/// Register a strategy constructor under an identifier.
///
/// The first registration for an identifier wins; later ones are ignored.
pub fn register(identifier: &str, ctor: StrategyCtor) {
    REGISTRY.entry(identifier.to_string()).or_insert(ctor);
}

/// Look up the constructor registered under an identifier.
pub fn lookup(identifier: &str) -> Option<StrategyCtor> {
    REGISTRY.get(identifier).map(|entry| *entry)
}
