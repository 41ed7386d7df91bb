//! Generation interception
//!
//! A [`ClassVisitor`] adapter that watches the host's class-synthesis
//! pipeline for the closure factory's emission pattern and, exactly once
//! per matching class, hands the repr method to the splicer. Every other
//! emission call — other methods, non-matching classes — passes through
//! untouched and side-effect free.

use crate::emit::splicer::MethodSplicer;
use crate::host::bytecode::MethodBody;
use crate::host::writer::{access, ClassDecl, ClassVisitor};
use crate::host::{CLASS_VERSION, CLOSURE_SUPER, REPR_METHOD};
use crate::metadata::ClosureMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No closure-synthesis emission observed yet
    Scanning,
    /// Inside a matching class, repr method not yet seen
    Injecting,
    /// Injection done, pass-through for the rest of the emission
    Done,
}

/// Visitor adapter splicing the dispatch path into synthesized closure
/// classes.
pub struct GenerationInterceptor {
    inner: Box<dyn ClassVisitor>,
    splicer: MethodSplicer,
    state: State,
    pending: Option<ClosureMetadata>,
}

impl GenerationInterceptor {
    /// Wrap a downstream visitor, baking the given strategy identifier into
    /// every spliced method.
    pub fn new(inner: Box<dyn ClassVisitor>, identifier: impl Into<String>) -> Self {
        Self {
            inner,
            splicer: MethodSplicer::new(identifier),
            state: State::Scanning,
            pending: None,
        }
    }

    /// Whether a `begin_class` call carries the closure factory's exact
    /// argument pattern.
    fn is_closure_emission(decl: &ClassDecl<'_>) -> bool {
        decl.version == CLASS_VERSION
            && decl.access == (access::FINAL | access::SYNTHETIC)
            && decl.super_name == CLOSURE_SUPER
            && decl.origin.is_some()
    }
}

impl ClassVisitor for GenerationInterceptor {
    fn begin_class(&mut self, decl: &ClassDecl<'_>) {
        if self.state == State::Scanning && Self::is_closure_emission(decl) {
            self.state = State::Injecting;
            self.pending = decl.origin.map(|spec| spec.metadata());
        }
        self.inner.begin_class(decl);
    }

    fn visit_method(&mut self, name: &str, body: MethodBody) {
        if self.state == State::Injecting && name == REPR_METHOD {
            if let Some(metadata) = self.pending.take() {
                self.state = State::Done;
                // On a splice failure the native body is forwarded
                // untouched; a generation error must never escape into the
                // emitted class.
                let forwarded = match self.splicer.splice_repr(body.clone(), &metadata) {
                    Ok(spliced) => spliced,
                    Err(_) => body,
                };
                self.inner.visit_method(name, forwarded);
                return;
            }
        }
        self.inner.visit_method(name, body);
    }

    fn end_class(&mut self) {
        self.inner.end_class();
    }
}
