#![no_main]

//! Fuzz target for service lifecycle operations
//!
//! Tests lazy initialization, transient creation, scoped reuse and scope
//! teardown against a model of what the container should hold.

use arbitrary::Arbitrary;
use lattice_di::{Container, DiError, Inject, Lifecycle, Recipe};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static LAZY_COUNTER: AtomicU64 = AtomicU64::new(0);
static TRANSIENT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Service with lazy initialization tracking
struct LazyService {
    id: u64,
}

/// Service created fresh each time
struct TransientService {
    instance_id: u64,
    lazy: Inject<LazyService>,
}

/// Service shared within one scope
struct ScopedService;

/// Simple singleton
#[derive(Clone, Debug, Arbitrary)]
struct SimpleService {
    value: u32,
}

/// Lifecycle operations
#[derive(Debug, Arbitrary)]
enum LifecycleOp {
    // Registration
    RegisterSingleton(SimpleService),
    RegisterLazy,
    RegisterTransient,
    RegisterScoped,
    ReregisterLazy,

    // Resolution
    GetSingleton,
    GetLazy,
    GetTransient,
    GetTransientMultiple(u8), // Get multiple transients
    GetScoped,

    // Queries
    Contains,
    Stats,

    // Scopes
    EndScope,
    ScopeHandle,
}

fuzz_target!(|ops: Vec<LifecycleOp>| {
    // Reset counters
    LAZY_COUNTER.store(0, Ordering::SeqCst);
    TRANSIENT_COUNTER.store(0, Ordering::SeqCst);

    let container = Container::new();
    let lazy_recipe = Recipe::from_fn(|| LazyService {
        id: LAZY_COUNTER.fetch_add(1, Ordering::SeqCst),
    });
    let mut simple: Option<u32> = None;
    let mut has_lazy = false;
    let mut has_transient = false;
    let mut has_scoped = false;
    let mut last_scoped: Option<Arc<ScopedService>> = None;

    for op in ops.into_iter().take(100) {
        match op {
            LifecycleOp::RegisterSingleton(svc) => {
                let value = svc.value;
                match container.singleton(svc) {
                    Ok(()) => {
                        assert!(simple.is_none());
                        simple = Some(value);
                    }
                    Err(DiError::DuplicateRegistration { .. }) => assert!(simple.is_some()),
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            LifecycleOp::RegisterLazy | LifecycleOp::ReregisterLazy => {
                // Same recipe and lifecycle: never a conflict
                container
                    .register(Lifecycle::Singleton, lazy_recipe.clone())
                    .unwrap();
                has_lazy = true;
            }
            LifecycleOp::RegisterTransient => {
                let result = container.register(
                    Lifecycle::Transient,
                    Recipe::new(|args| {
                        Ok(TransientService {
                            instance_id: TRANSIENT_COUNTER.fetch_add(1, Ordering::SeqCst),
                            lazy: args.take("lazy")?,
                        })
                    })
                    .param::<LazyService>("lazy"),
                );
                assert_eq!(result.is_ok(), !has_transient);
                has_transient = true;
            }
            LifecycleOp::RegisterScoped => {
                let result = container.scoped(|| ScopedService);
                assert_eq!(result.is_ok(), !has_scoped);
                has_scoped = true;
            }
            LifecycleOp::GetSingleton => {
                let result = container.try_get::<SimpleService>();
                assert_eq!(result.map(|s| s.value), simple);
            }
            LifecycleOp::GetLazy => {
                let result1 = container.try_get::<LazyService>();
                let result2 = container.try_get::<LazyService>();
                assert_eq!(result1.is_some(), has_lazy);

                // Lazy singleton should return same instance
                if let (Some(s1), Some(s2)) = (result1, result2) {
                    assert!(Arc::ptr_eq(&s1, &s2), "Lazy singleton should be same instance");
                    assert_eq!(s1.id, 0);
                }
            }
            LifecycleOp::GetTransient => {
                let result1 = container.get::<TransientService>();
                let result2 = container.get::<TransientService>();

                match (result1, result2) {
                    (Ok(s1), Ok(s2)) => {
                        // Transient should return different instances
                        assert!(!Arc::ptr_eq(&s1, &s2), "Transient should be different instances");
                        assert_ne!(s1.instance_id, s2.instance_id);
                        assert!(s1.lazy.ptr_eq(s2.lazy.get().unwrap()));
                    }
                    (Err(DiError::NotRegistered { .. }), _) => assert!(!has_transient),
                    (Err(DiError::DependencyResolution { .. }), _) => {
                        assert!(has_transient && !has_lazy)
                    }
                    (Err(other), _) | (_, Err(other)) => panic!("unexpected error: {other}"),
                }
            }
            LifecycleOp::GetTransientMultiple(count) => {
                let count = (count % 10).max(1);
                let instances: Vec<_> = (0..count)
                    .filter_map(|_| container.try_get::<TransientService>())
                    .collect();

                // All instances should be unique
                for i in 0..instances.len() {
                    for j in (i + 1)..instances.len() {
                        assert!(!Arc::ptr_eq(&instances[i], &instances[j]));
                    }
                }
            }
            LifecycleOp::GetScoped => {
                if let Some(current) = container.try_get::<ScopedService>() {
                    if let Some(previous) = &last_scoped {
                        assert!(Arc::ptr_eq(previous, &current));
                    }
                    last_scoped = Some(current);
                }
            }
            LifecycleOp::Contains => {
                assert_eq!(container.contains::<SimpleService>(), simple.is_some());
                assert_eq!(container.contains::<LazyService>(), has_lazy);
                assert_eq!(container.contains::<ScopedService>(), has_scoped);
            }
            LifecycleOp::Stats => {
                let stats = container.stats();
                assert_eq!(stats.registered_count, container.len());
                assert_eq!(container.list_registrations().count(), container.len());
                assert!(stats.active_scopes <= 1);
                assert_eq!(stats.cycles_broken, 0);
            }
            LifecycleOp::EndScope => {
                container.end_scope();
                if let Some(previous) = last_scoped.take() {
                    let fresh = container.get::<ScopedService>().unwrap();
                    assert!(!Arc::ptr_eq(&previous, &fresh));
                    last_scoped = Some(fresh);
                }
            }
            LifecycleOp::ScopeHandle => {
                let request = container.scope();
                if let (Some(outer), Some(inner)) =
                    (last_scoped.as_ref(), request.try_get::<ScopedService>())
                {
                    assert!(!Arc::ptr_eq(outer, &inner));
                }
            }
        }
    }
});
