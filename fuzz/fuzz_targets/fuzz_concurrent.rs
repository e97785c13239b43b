#![no_main]

//! Fuzz target for concurrent container operations
//!
//! Threads race on first construction, cycle breaking, scopes and
//! registration; singletons must still be built exactly once.

use arbitrary::Arbitrary;
use lattice_di::{Container, DiError, Inject, Lifecycle, Recipe};
use libfuzzer_sys::fuzz_target;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

static SHARED_BUILDS: AtomicU64 = AtomicU64::new(0);

struct SharedConfig {
    value: u32,
}

struct Left {
    right: Inject<Right>,
}

struct Right {
    left: Inject<Left>,
}

struct Session;

#[derive(Debug, Clone, Arbitrary)]
struct Extra {
    value: u32,
}

/// Thread operation
#[derive(Debug, Clone, Arbitrary)]
enum ThreadOp {
    GetShared,
    GetCycle,
    GetCycleFromRight,
    GetScoped,
    EndScope,
    Contains,
    Stats,
    Register(Extra),
}

/// Concurrent test scenario
#[derive(Debug, Arbitrary)]
struct ConcurrentScenario {
    // Number of threads (clamped to 1-8)
    thread_count: u8,
    // Operations per thread (clamped)
    ops_per_thread: Vec<ThreadOp>,
}

fn build_container() -> Container {
    let container = Container::new();
    container
        .lazy(|| SharedConfig {
            value: SHARED_BUILDS.fetch_add(1, Ordering::SeqCst) as u32,
        })
        .unwrap();
    container
        .register(
            Lifecycle::Singleton,
            Recipe::new(|args| Ok(Left { right: args.take("right")? })).param::<Right>("right"),
        )
        .unwrap();
    container
        .register(
            Lifecycle::Singleton,
            Recipe::new(|args| Ok(Right { left: args.take("left")? })).param::<Left>("left"),
        )
        .unwrap();
    container.scoped(|| Session).unwrap();
    container
}

fuzz_target!(|scenario: ConcurrentScenario| {
    SHARED_BUILDS.store(0, Ordering::SeqCst);
    let container = build_container();

    // Clamp thread count
    let thread_count = (scenario.thread_count % 8).max(1) as usize;
    let ops = scenario.ops_per_thread;
    let barrier = Arc::new(Barrier::new(thread_count));

    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let container = container.clone();
            let barrier = Arc::clone(&barrier);
            let ops = ops.clone();

            thread::spawn(move || {
                barrier.wait();
                for op in ops.into_iter().take(50) {
                    match op {
                        ThreadOp::GetShared => {
                            let config = container.get::<SharedConfig>().unwrap();
                            assert_eq!(config.value, 0);
                        }
                        ThreadOp::GetCycle => {
                            let left = container.get::<Left>().unwrap();
                            let right = left.right.get().unwrap();
                            assert!(right.left.ptr_eq(&left));
                        }
                        ThreadOp::GetCycleFromRight => {
                            // Races the other end of the same cycle
                            let right = container.get::<Right>().unwrap();
                            let left = right.left.get().unwrap();
                            assert!(left.right.ptr_eq(&right));
                        }
                        ThreadOp::GetScoped => {
                            let a = container.get::<Session>().unwrap();
                            let b = container.get::<Session>().unwrap();
                            assert!(Arc::ptr_eq(&a, &b));
                        }
                        ThreadOp::EndScope => container.end_scope(),
                        ThreadOp::Contains => {
                            assert!(container.contains::<SharedConfig>());
                        }
                        ThreadOp::Stats => {
                            let _ = container.stats();
                            let _ = container.list_registrations().count();
                        }
                        ThreadOp::Register(extra) => {
                            // Racing registrations: one wins, the rest are duplicates
                            match container.singleton(extra) {
                                Ok(()) | Err(DiError::DuplicateRegistration { .. }) => {}
                                Err(other) => panic!("unexpected error: {other}"),
                            }
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Container should still be functional
    assert!(SHARED_BUILDS.load(Ordering::SeqCst) <= 1);
    assert!(container.stats().registered_count >= 4);
});
