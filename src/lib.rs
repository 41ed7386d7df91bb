//! Runtime repr injection for synthesized closure classes
//!
//! Closures synthesized by the host runtime carry only the stock
//! representation `ClassName@hexhash`. This crate retrofits a pluggable,
//! descriptive representation onto them without modifying the runtime:
//! it intercepts class synthesis at the moment of emission, splices a
//! guarded dispatch path into the repr method, and resolves formatting
//! strategies by name through a process-wide, resolve-once cache.
//!
//! - [`intercept`] — recognizes closure-synthesis emission and triggers
//!   the splice exactly once per generated class
//! - [`emit`] — builds the injected method body and renumbers the native
//!   body's local slots out of the way
//! - [`dispatch`] — resolves and caches strategies, and exposes the stable
//!   entry point the generated code links against
//! - [`strategy`] — the formatting contract and identifier registry
//! - [`metadata`] — the per-closure origin record handed to strategies
//! - [`host`] — the minimal managed runtime this all attaches to
//!
//! Failures inside the injected code degrade, never crash: formatting
//! errors reported by a strategy propagate to the caller, while linkage
//! and visibility failures fall back to the exact representation the host
//! would have produced natively.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod dispatch;
pub mod emit;
pub mod host;
pub mod intercept;
pub mod metadata;
pub mod strategy;

use std::sync::Arc;

use crate::host::{linker, ClosureFactory};
use crate::intercept::GenerationInterceptor;

pub use crate::dispatch::{DispatchError, ResolveError, DISPATCH_SYMBOL};
pub use crate::metadata::{ClosureMetadata, ReferenceKind};
pub use crate::strategy::{FormatError, ReprStrategy, FORMAT_ERROR_TYPE_NAME};

/// Attach the repr agent to a closure factory.
///
/// Registers the dispatch bootstrap with the host linker and installs the
/// generation interceptor as the factory's class transform. `identifier`
/// names the strategy every subsequently generated class will resolve; it
/// is forwarded unchanged as a constant baked into the emitted code.
pub fn install(factory: &mut ClosureFactory, identifier: &str) {
    linker::register(DISPATCH_SYMBOL, Arc::new(dispatch::bootstrap));
    let identifier = identifier.to_string();
    factory.set_transform(Box::new(move |inner| {
        Box::new(GenerationInterceptor::new(inner, identifier.clone()))
    }));
}
