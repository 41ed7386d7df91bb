//! End-to-end tests: agent installation, class synthesis, and the behavior
//! of the injected repr method under normal visibility, restricted
//! visibility, and strategy failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use closure_repr::host::{ClosureFactory, ClosureInstance, ClosureSpec, LoaderScope};
use closure_repr::metadata::{modifiers, ClosureMetadata, ReferenceKind};
use closure_repr::strategy::{self, FormatError, ReprStrategy};
use closure_repr::{dispatch, install, FORMAT_ERROR_TYPE_NAME};

fn non_capturing_spec() -> ClosureSpec {
    ClosureSpec {
        target_type: "demo.Mapper".to_string(),
        declaring_type: "demo.Strings".to_string(),
        member_name: "upper".to_string(),
        signature: "(string)string".to_string(),
        reference_kind: ReferenceKind::InvokeStatic,
        modifiers: modifiers::PUBLIC | modifiers::STATIC,
        capture_count: 0,
    }
}

fn capturing_spec() -> ClosureSpec {
    ClosureSpec {
        target_type: "demo.Supplier".to_string(),
        declaring_type: "demo.Counter".to_string(),
        member_name: "current".to_string(),
        signature: "()int".to_string(),
        reference_kind: ReferenceKind::GetField,
        modifiers: modifiers::PRIVATE | modifiers::FINAL,
        capture_count: 1,
    }
}

fn member_reference_spec() -> ClosureSpec {
    ClosureSpec {
        target_type: "demo.Printer".to_string(),
        declaring_type: "demo.Console".to_string(),
        member_name: "println".to_string(),
        signature: "(string)void".to_string(),
        reference_kind: ReferenceKind::InvokeVirtual,
        modifiers: modifiers::PUBLIC,
        capture_count: 0,
    }
}

struct Describing;
impl ReprStrategy for Describing {
    fn format(
        &self,
        _closure: &ClosureInstance,
        metadata: &ClosureMetadata,
    ) -> Result<String, FormatError> {
        Ok(format!(
            "closure {}.{}",
            metadata.declaring_type, metadata.member_name
        ))
    }
}

struct EchoMetadata;
impl ReprStrategy for EchoMetadata {
    fn format(
        &self,
        _closure: &ClosureInstance,
        metadata: &ClosureMetadata,
    ) -> Result<String, FormatError> {
        Ok(format!(
            "{}|{}|{}|{}|{}|{}",
            metadata.target_type,
            metadata.declaring_type,
            metadata.member_name,
            metadata.signature,
            metadata.reference_kind.code(),
            metadata.modifiers
        ))
    }
}

struct Failing;
impl ReprStrategy for Failing {
    fn format(
        &self,
        _closure: &ClosureInstance,
        _metadata: &ClosureMetadata,
    ) -> Result<String, FormatError> {
        Err(FormatError::new("refusing to format this closure"))
    }
}

#[test]
fn strategy_output_replaces_default_repr() {
    strategy::register("it.agent.Describing", || Ok(Arc::new(Describing)));

    let mut factory = ClosureFactory::new(LoaderScope::Unrestricted);
    install(&mut factory, "it.agent.Describing");

    let class = factory.synthesize(&non_capturing_spec()).unwrap();
    let instance = ClosureInstance::new(&class, Vec::new()).unwrap();

    assert_eq!(instance.repr().unwrap(), "closure demo.Strings.upper");
}

#[test]
fn restricted_visibility_falls_back_to_default() {
    strategy::register("it.agent.Restricted", || Ok(Arc::new(Describing)));

    let mut factory = ClosureFactory::new(LoaderScope::Restricted);
    install(&mut factory, "it.agent.Restricted");

    let class = factory.synthesize(&non_capturing_spec()).unwrap();
    let instance = ClosureInstance::new(&class, Vec::new()).unwrap();

    // The injected code is present but cannot link against the dispatch
    // symbol; it must degrade to exactly the native representation and
    // never throw.
    let repr = instance.repr().unwrap();
    assert_eq!(
        repr,
        format!("{}@{:x}", instance.class_name(), instance.identity_hash())
    );

    // Stable across repeated invocations.
    assert_eq!(instance.repr().unwrap(), repr);
}

#[test]
fn unknown_identifier_falls_back_to_default() {
    let mut factory = ClosureFactory::new(LoaderScope::Unrestricted);
    install(&mut factory, "it.agent.NeverRegistered");

    let class = factory.synthesize(&non_capturing_spec()).unwrap();
    let instance = ClosureInstance::new(&class, Vec::new()).unwrap();

    assert_eq!(
        instance.repr().unwrap(),
        format!("{}@{:x}", instance.class_name(), instance.identity_hash())
    );
}

#[test]
fn formatting_failure_propagates_to_caller() {
    strategy::register("it.agent.Failing", || Ok(Arc::new(Failing)));

    let mut factory = ClosureFactory::new(LoaderScope::Unrestricted);
    install(&mut factory, "it.agent.Failing");

    let class = factory.synthesize(&non_capturing_spec()).unwrap();
    let instance = ClosureInstance::new(&class, Vec::new()).unwrap();

    let err = instance.repr().unwrap_err();
    assert_eq!(err.type_name, FORMAT_ERROR_TYPE_NAME);
    assert!(err.message.contains("refusing to format this closure"));
}

static ONCE_CTOR_CALLS: AtomicUsize = AtomicUsize::new(0);

#[test]
fn repeated_invocation_resolves_strategy_once() {
    strategy::register("it.agent.CountingCtor", || {
        ONCE_CTOR_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Describing))
    });

    let mut factory = ClosureFactory::new(LoaderScope::Unrestricted);
    install(&mut factory, "it.agent.CountingCtor");

    let class = factory.synthesize(&non_capturing_spec()).unwrap();
    let instance = ClosureInstance::new(&class, Vec::new()).unwrap();

    let first = instance.repr().unwrap();
    for _ in 0..9 {
        assert_eq!(instance.repr().unwrap(), first);
    }
    assert_eq!(ONCE_CTOR_CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn distinct_identifiers_resolve_distinct_strategies() {
    strategy::register("it.agent.Alpha", || Ok(Arc::new(Describing)));
    strategy::register("it.agent.Beta", || Ok(Arc::new(EchoMetadata)));

    let a = dispatch::resolve("it.agent.Alpha").unwrap();
    let b = dispatch::resolve("it.agent.Beta").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));

    // End to end: two factories with different identifiers produce
    // closures with different representations for the same spec.
    let mut fa = ClosureFactory::new(LoaderScope::Unrestricted);
    install(&mut fa, "it.agent.Alpha");
    let mut fb = ClosureFactory::new(LoaderScope::Unrestricted);
    install(&mut fb, "it.agent.Beta");

    let ca = fa.synthesize(&non_capturing_spec()).unwrap();
    let ia = ClosureInstance::new(&ca, Vec::new()).unwrap();
    let cb = fb.synthesize(&non_capturing_spec()).unwrap();
    let ib = ClosureInstance::new(&cb, Vec::new()).unwrap();

    assert_eq!(ia.repr().unwrap(), "closure demo.Strings.upper");
    assert_ne!(ia.repr().unwrap(), ib.repr().unwrap());
}

static CONCURRENT_CTOR_CALLS: AtomicUsize = AtomicUsize::new(0);

#[test]
fn concurrent_first_resolution_constructs_one_instance() {
    strategy::register("it.agent.Concurrent", || {
        CONCURRENT_CTOR_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Describing))
    });

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                dispatch::resolve("it.agent.Concurrent").unwrap()
            })
        })
        .collect();

    let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(CONCURRENT_CTOR_CALLS.load(Ordering::SeqCst), 1);
    for other in &resolved[1..] {
        assert!(Arc::ptr_eq(&resolved[0], other));
    }
}

#[test]
fn metadata_reports_closure_origin() {
    strategy::register("it.agent.EchoMetadata", || Ok(Arc::new(EchoMetadata)));

    let mut factory = ClosureFactory::new(LoaderScope::Unrestricted);
    install(&mut factory, "it.agent.EchoMetadata");

    let cases = [
        (non_capturing_spec(), Vec::new()),
        (
            capturing_spec(),
            vec![closure_repr::host::Value::Int(41)],
        ),
        (member_reference_spec(), Vec::new()),
    ];

    for (spec, captures) in cases {
        let class = factory.synthesize(&spec).unwrap();
        let instance = ClosureInstance::new(&class, captures).unwrap();

        let expected = format!(
            "{}|{}|{}|{}|{}|{}",
            spec.target_type,
            spec.declaring_type,
            spec.member_name,
            spec.signature,
            spec.reference_kind.code(),
            spec.modifiers
        );
        assert_eq!(instance.repr().unwrap(), expected);
    }
}

#[test]
fn resolution_failure_is_permanent_and_identical() {
    let first = dispatch::resolve("it.agent.PermanentlyMissing").unwrap_err();
    let second = dispatch::resolve("it.agent.PermanentlyMissing").unwrap_err();
    assert_eq!(first, second);
}
