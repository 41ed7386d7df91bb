//! Process-wide dynamic linkage symbol table
//!
//! Symbols are registered once and live for the lifetime of the process.
//! Call sites in generated code name a symbol; at first execution the
//! evaluator resolves it here and binds the result permanently.
//!
//! Lookup is scoped: classes defined under a restricted loader have no
//! visibility into dynamically registered symbols and observe a missing
//! definition instead.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::host::value::{Thrown, Value};
use crate::host::LoaderScope;

/// A bootstrap function resolving a call site's static arguments into a
/// bound value.
pub type BootstrapFn = Arc<dyn Fn(&[String]) -> Result<Value, Thrown> + Send + Sync>;

static SYMBOLS: Lazy<DashMap<String, BootstrapFn>> = Lazy::new(DashMap::new);

/// Register a bootstrap under a symbol name.
///
/// Registration is idempotent: the first registration for a name wins and
/// later ones are ignored, matching the monotonic lifecycle of the table.
pub fn register(symbol: &str, bootstrap: BootstrapFn) {
    SYMBOLS.entry(symbol.to_string()).or_insert(bootstrap);
}

/// Look up a symbol as seen from a given loader scope.
pub fn lookup(symbol: &str, scope: LoaderScope) -> Option<BootstrapFn> {
    match scope {
        LoaderScope::Restricted => None,
        LoaderScope::Unrestricted => SYMBOLS.get(symbol).map(|entry| entry.clone()),
    }
}
