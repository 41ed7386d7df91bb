//! Strategy resolution cache and dispatch entry point
//!
//! The cache maps strategy identifiers to resolved instances, process-wide,
//! populated lazily through an atomic compute-if-absent so concurrent first
//! use of an identifier performs exactly one resolution. Failures are cached
//! with the same permanence as successes: every later use of a broken
//! identifier observes the identical error without retrying.
//!
//! Generated code reaches this module through [`DISPATCH_SYMBOL`], bound by
//! the host's call-site-constant mechanism; [`bootstrap`] is the function
//! registered under that symbol.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::host::value::{Thrown, Value};
use crate::host::ClosureInstance;
use crate::metadata::ClosureMetadata;
use crate::strategy::{self, FormatError, ReprStrategy, FORMAT_ERROR_TYPE_NAME};

/// Stable, versioned linkage symbol generated code embeds to reach the
/// dispatch layer. The version suffix changes if the bootstrap contract
/// ever does.
pub const DISPATCH_SYMBOL: &str = "closure_repr.dispatch/link#1";

/// Stable type name carried by resolution failures when they cross
/// generated code as thrown values.
pub const RESOLVE_ERROR_TYPE_NAME: &str = "closure_repr.ResolveError";

/// Permanent failure to resolve a strategy identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No strategy is registered under the identifier.
    #[error("no strategy registered under identifier {0:?}")]
    NotRegistered(String),

    /// A constructor exists but refused to produce an instance.
    #[error("strategy {identifier:?} could not be constructed: {reason}")]
    Construction {
        /// The identifier whose construction failed
        identifier: String,
        /// Constructor-reported reason
        reason: String,
    },
}

/// Errors surfaced by the dispatch entry point.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The identifier could not be resolved to a strategy.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The resolved strategy reported a formatting failure; propagated to
    /// the caller unchanged.
    #[error(transparent)]
    Format(#[from] FormatError),
}

type Resolution = Result<Arc<dyn ReprStrategy>, ResolveError>;

static RESOLVED: Lazy<DashMap<String, Resolution>> = Lazy::new(DashMap::new);

fn construct(identifier: &str) -> Resolution {
    let ctor = strategy::lookup(identifier)
        .ok_or_else(|| ResolveError::NotRegistered(identifier.to_string()))?;
    ctor().map_err(|reason| ResolveError::Construction {
        identifier: identifier.to_string(),
        reason,
    })
}

/// Resolve an identifier to its strategy instance, constructing it on first
/// use.
///
/// At most one resolution computation ever runs per identifier, even under
/// concurrent first use from multiple threads; the entry lock covers only
/// the identifier being resolved, so unrelated identifiers never serialize
/// against each other. Results, including failures, are retained for the
/// lifetime of the process.
pub fn resolve(identifier: &str) -> Resolution {
    RESOLVED
        .entry(identifier.to_string())
        .or_insert_with(|| construct(identifier))
        .clone()
}

/// The single dispatch surface: resolve the identifier and format the
/// instance.
///
/// Formatting failures from the strategy propagate unchanged; resolution
/// failures surface as the cached linkage error.
pub fn format(
    identifier: &str,
    instance: &ClosureInstance,
    metadata: &ClosureMetadata,
) -> Result<String, DispatchError> {
    let strategy = resolve(identifier)?;
    Ok(strategy.format(instance, metadata)?)
}

/// Call-site bootstrap registered under [`DISPATCH_SYMBOL`].
///
/// Resolves the identifier once and returns a callable closing over the
/// resolved strategy, so repeated invocations of the bound call site reuse
/// the same instance without touching the cache again.
pub fn bootstrap(args: &[String]) -> Result<Value, Thrown> {
    let identifier = args
        .first()
        .ok_or_else(|| Thrown::internal("dispatch bootstrap called without an identifier"))?;
    let strategy =
        resolve(identifier).map_err(|e| Thrown::new(RESOLVE_ERROR_TYPE_NAME, e.to_string()))?;

    Ok(Value::Fn(Arc::new(move |call_args: &[Value]| {
        let (instance, metadata) = match call_args {
            [Value::Closure(instance), Value::Metadata(metadata)] => (instance, metadata),
            _ => return Err(Thrown::internal("malformed dispatch arguments")),
        };
        match strategy.format(instance, metadata) {
            Ok(s) => Ok(Value::Str(s)),
            Err(e) => Err(Thrown::new(FORMAT_ERROR_TYPE_NAME, e.to_string())),
        }
    })))
}
