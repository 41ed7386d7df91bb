//! Closure factory and closure instances
//!
//! The factory synthesizes one class per request, driving the emission
//! through the visitor chain. Synthesis happens synchronously on whichever
//! thread first needs the closure. An installed class transform wraps the
//! terminal writer and may rewrite the emission; the factory itself never
//! inspects what the transform does.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use rustc_hash::FxHasher;

use crate::host::bytecode::{Instr, MethodBody};
use crate::host::eval;
use crate::host::value::{Thrown, Value};
use crate::host::writer::{access, ClassDecl, ClassVisitor, ClassWriter, GeneratedClass};
use crate::host::{HostError, LoaderScope, CLASS_VERSION, CLOSURE_SUPER, INVOKE_METHOD, REPR_METHOD};
use crate::metadata::{ClosureMetadata, ReferenceKind};

/// Adapter installed on a factory to wrap the class writer during emission.
pub type ClassTransform = Box<dyn Fn(Box<dyn ClassVisitor>) -> Box<dyn ClassVisitor> + Send + Sync>;

static NEXT_CLASS_ID: AtomicUsize = AtomicUsize::new(0);
static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_identity_hash() -> u32 {
    let n = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
    let mut hasher = FxHasher::default();
    n.hash(&mut hasher);
    hasher.finish() as u32
}

/// Description of the closure a caller wants synthesized.
#[derive(Debug, Clone)]
pub struct ClosureSpec {
    /// Type the closure is being synthesized for
    pub target_type: String,
    /// Type declaring the implementation member
    pub declaring_type: String,
    /// Name of the implementation member
    pub member_name: String,
    /// Type signature of the implementation member
    pub signature: String,
    /// How the implementation member is referenced
    pub reference_kind: ReferenceKind,
    /// Access modifiers of the implementation member
    pub modifiers: u16,
    /// Number of values the closure captures
    pub capture_count: usize,
}

impl ClosureSpec {
    /// The metadata record describing closures of this spec.
    pub fn metadata(&self) -> ClosureMetadata {
        ClosureMetadata::new(
            self.target_type.clone(),
            self.declaring_type.clone(),
            self.member_name.clone(),
            self.signature.clone(),
            self.reference_kind,
            self.modifiers,
        )
    }
}

/// Synthesizes closure classes on demand.
pub struct ClosureFactory {
    scope: LoaderScope,
    transform: Option<ClassTransform>,
}

impl ClosureFactory {
    /// Create a factory whose classes are defined under the given scope.
    pub fn new(scope: LoaderScope) -> Self {
        Self {
            scope,
            transform: None,
        }
    }

    /// Install a class transform wrapping every subsequent emission.
    pub fn set_transform(&mut self, transform: ClassTransform) {
        self.transform = Some(transform);
    }

    /// Synthesize a closure class for the given spec.
    pub fn synthesize(&self, spec: &ClosureSpec) -> Result<Arc<GeneratedClass>, HostError> {
        let class_name = format!(
            "{}$$Closure${}",
            spec.target_type,
            NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed)
        );

        let (writer, out) = ClassWriter::new(self.scope);
        let mut visitor: Box<dyn ClassVisitor> = match &self.transform {
            Some(wrap) => wrap(Box::new(writer)),
            None => Box::new(writer),
        };

        visitor.begin_class(&ClassDecl {
            version: CLASS_VERSION,
            access: access::FINAL | access::SYNTHETIC,
            name: &class_name,
            super_name: CLOSURE_SUPER,
            origin: Some(spec),
        });
        visitor.visit_method(INVOKE_METHOD, invoke_body());
        visitor.visit_method(REPR_METHOD, native_repr_body());
        visitor.end_class();

        let class = out
            .lock()
            .take()
            .unwrap_or(Err(HostError::EmissionIncomplete))?;
        Ok(Arc::new(class))
    }
}

/// Placeholder functional entry point.
fn invoke_body() -> MethodBody {
    MethodBody {
        instrs: vec![Instr::ConstNull, Instr::Return],
        constants: Vec::new(),
        exception_table: Vec::new(),
        local_count: 0,
    }
}

/// The native string-representation body: computes the default
/// representation and stages it through local slot 0.
fn native_repr_body() -> MethodBody {
    MethodBody {
        instrs: vec![
            Instr::LoadSelf,
            Instr::ReprSelf,
            Instr::StoreLocal(0),
            Instr::LoadLocal(0),
            Instr::Return,
        ],
        constants: Vec::new(),
        exception_table: Vec::new(),
        local_count: 1,
    }
}

/// One live closure object.
pub struct ClosureInstance {
    class: Arc<GeneratedClass>,
    captures: Vec<Value>,
    identity_hash: u32,
    this: Weak<ClosureInstance>,
}

impl ClosureInstance {
    /// Instantiate a generated class with the given captured values.
    pub fn new(
        class: &Arc<GeneratedClass>,
        captures: Vec<Value>,
    ) -> Result<Arc<Self>, HostError> {
        if captures.len() != class.capture_count {
            return Err(HostError::CaptureArity {
                expected: class.capture_count,
                actual: captures.len(),
            });
        }
        Ok(Arc::new_cyclic(|this| Self {
            class: class.clone(),
            captures,
            identity_hash: next_identity_hash(),
            this: this.clone(),
        }))
    }

    /// The instance's class.
    pub fn class(&self) -> &Arc<GeneratedClass> {
        &self.class
    }

    /// Name of the instance's class.
    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    /// Values captured at instantiation.
    pub fn captures(&self) -> &[Value] {
        &self.captures
    }

    /// Identity hash assigned at instantiation.
    pub fn identity_hash(&self) -> u32 {
        self.identity_hash
    }

    /// The host's native representation: class name, `@`, lowercase hex
    /// identity hash.
    pub fn default_repr(&self) -> String {
        format!("{}@{:x}", self.class.name, self.identity_hash)
    }

    /// Invoke the string-representation method.
    pub fn repr(&self) -> Result<String, Thrown> {
        // Instances only exist behind the Arc created at instantiation, so
        // the upgrade cannot fail while `&self` is live.
        let receiver = self
            .this
            .upgrade()
            .ok_or_else(|| Thrown::internal("closure instance outlived its allocation"))?;
        match eval::invoke(&self.class, REPR_METHOD, &receiver)? {
            Value::Str(s) => Ok(s),
            other => Err(Thrown::internal(format!(
                "repr produced a non-string value: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn spec() -> ClosureSpec {
        ClosureSpec {
            target_type: "demo.Mapper".to_string(),
            declaring_type: "demo.Strings".to_string(),
            member_name: "upper".to_string(),
            signature: "(string)string".to_string(),
            reference_kind: ReferenceKind::InvokeStatic,
            modifiers: crate::metadata::modifiers::PUBLIC,
            capture_count: 0,
        }
    }

    #[test]
    fn test_untransformed_closure_uses_default_repr() {
        let factory = ClosureFactory::new(LoaderScope::Unrestricted);
        let class = factory.synthesize(&spec()).unwrap();
        let instance = ClosureInstance::new(&class, Vec::new()).unwrap();

        let repr = instance.repr().unwrap();
        assert_eq!(
            repr,
            format!("{}@{:x}", class.name, instance.identity_hash())
        );
    }

    #[test]
    fn test_identity_hashes_are_distinct() {
        let factory = ClosureFactory::new(LoaderScope::Unrestricted);
        let class = factory.synthesize(&spec()).unwrap();
        let a = ClosureInstance::new(&class, Vec::new()).unwrap();
        let b = ClosureInstance::new(&class, Vec::new()).unwrap();
        assert_ne!(a.identity_hash(), b.identity_hash());
        assert_ne!(a.default_repr(), b.default_repr());
    }

    #[test]
    fn test_capture_arity_checked() {
        let factory = ClosureFactory::new(LoaderScope::Unrestricted);
        let mut s = spec();
        s.capture_count = 2;
        let class = factory.synthesize(&s).unwrap();

        assert!(matches!(
            ClosureInstance::new(&class, Vec::new()),
            Err(HostError::CaptureArity {
                expected: 2,
                actual: 0
            })
        ));
        assert!(
            ClosureInstance::new(&class, vec![Value::Int(1), Value::Str("x".to_string())]).is_ok()
        );
    }

    #[test]
    fn test_transform_wraps_emission() {
        struct Probe {
            inner: Box<dyn ClassVisitor>,
            seen: Arc<AtomicBool>,
        }
        impl ClassVisitor for Probe {
            fn begin_class(&mut self, decl: &ClassDecl<'_>) {
                self.seen.store(true, Ordering::Relaxed);
                self.inner.begin_class(decl);
            }
            fn visit_method(&mut self, name: &str, body: MethodBody) {
                self.inner.visit_method(name, body);
            }
            fn end_class(&mut self) {
                self.inner.end_class();
            }
        }

        let seen = Arc::new(AtomicBool::new(false));
        let probe_seen = seen.clone();
        let mut factory = ClosureFactory::new(LoaderScope::Unrestricted);
        factory.set_transform(Box::new(move |inner| {
            Box::new(Probe {
                inner,
                seen: probe_seen.clone(),
            })
        }));

        factory.synthesize(&spec()).unwrap();
        assert!(seen.load(Ordering::Relaxed));
    }

    #[test]
    fn test_generated_names_are_unique() {
        let factory = ClosureFactory::new(LoaderScope::Unrestricted);
        let a = factory.synthesize(&spec()).unwrap();
        let b = factory.synthesize(&spec()).unwrap();
        assert_ne!(a.name, b.name);
        assert!(a.name.starts_with("demo.Mapper$$Closure$"));
    }
}
