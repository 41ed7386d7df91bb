//! Visitor-driven class emission
//!
//! Class synthesis flows through the [`ClassVisitor`] seam: the factory
//! announces the class, streams each method body, then finalizes. The
//! terminal [`ClassWriter`] collects the emission into a [`GeneratedClass`],
//! verifying every body before the class becomes visible. Adapters may wrap
//! the writer to observe or rewrite the emission in flight.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::host::bytecode::MethodBody;
use crate::host::closure::ClosureSpec;
use crate::host::{HostError, LoaderScope};

/// Class access bit-flags.
pub mod access {
    /// Publicly accessible class
    pub const PUBLIC: u16 = 0x0001;
    /// Final class
    pub const FINAL: u16 = 0x0010;
    /// Runtime-synthesized class
    pub const SYNTHETIC: u16 = 0x1000;
}

/// Arguments of a `begin_class` emission call.
#[derive(Debug, Clone, Copy)]
pub struct ClassDecl<'a> {
    /// Class-format version
    pub version: u16,
    /// Access bit-flags
    pub access: u16,
    /// Fully qualified class name
    pub name: &'a str,
    /// Superclass name
    pub super_name: &'a str,
    /// The closure spec driving this synthesis, when the class is being
    /// produced by the closure factory
    pub origin: Option<&'a ClosureSpec>,
}

/// Observer of one class emission.
///
/// Calls arrive in order: `begin_class`, then `visit_method` per method,
/// then `end_class`. Implementations that wrap another visitor must forward
/// every call they do not consume.
pub trait ClassVisitor {
    /// The emission of a new class begins.
    fn begin_class(&mut self, decl: &ClassDecl<'_>);

    /// One complete method body is emitted.
    fn visit_method(&mut self, name: &str, body: MethodBody);

    /// The emission is complete.
    fn end_class(&mut self);
}

/// A finalized, verified generated class.
#[derive(Debug)]
pub struct GeneratedClass {
    /// Fully qualified class name
    pub name: String,
    /// Access bit-flags
    pub access: u16,
    /// Superclass name
    pub super_name: String,
    /// Number of captured values per instance
    pub capture_count: usize,
    /// Linkage visibility of the defining loader
    pub scope: LoaderScope,
    /// Method bodies by name
    pub methods: FxHashMap<String, MethodBody>,
}

/// Shared slot the terminal writer deposits its result into.
pub type ClassOutput = Arc<Mutex<Option<Result<GeneratedClass, HostError>>>>;

struct PendingClass {
    name: String,
    access: u16,
    super_name: String,
    capture_count: usize,
    methods: FxHashMap<String, MethodBody>,
}

/// Terminal visitor that materializes the emission into a class.
pub struct ClassWriter {
    scope: LoaderScope,
    pending: Option<PendingClass>,
    out: ClassOutput,
}

impl ClassWriter {
    /// Create a writer for a loader with the given scope, returning the
    /// output slot the finalized class will appear in.
    pub fn new(scope: LoaderScope) -> (Self, ClassOutput) {
        let out: ClassOutput = Arc::new(Mutex::new(None));
        let writer = Self {
            scope,
            pending: None,
            out: out.clone(),
        };
        (writer, out)
    }
}

impl ClassVisitor for ClassWriter {
    fn begin_class(&mut self, decl: &ClassDecl<'_>) {
        self.pending = Some(PendingClass {
            name: decl.name.to_string(),
            access: decl.access,
            super_name: decl.super_name.to_string(),
            capture_count: decl.origin.map(|s| s.capture_count).unwrap_or(0),
            methods: FxHashMap::default(),
        });
    }

    fn visit_method(&mut self, name: &str, body: MethodBody) {
        if let Some(pending) = self.pending.as_mut() {
            pending.methods.insert(name.to_string(), body);
        }
    }

    fn end_class(&mut self) {
        let result = match self.pending.take() {
            None => Err(HostError::EmissionIncomplete),
            Some(pending) => {
                let mut verified = Ok(());
                for (name, body) in &pending.methods {
                    if let Err(e) = body.verify() {
                        verified = Err(HostError::Verify(format!("method {}: {}", name, e)));
                        break;
                    }
                }
                verified.map(|_| GeneratedClass {
                    name: pending.name,
                    access: pending.access,
                    super_name: pending.super_name,
                    capture_count: pending.capture_count,
                    scope: self.scope,
                    methods: pending.methods,
                })
            }
        };
        *self.out.lock() = Some(result);
    }
}
