//! Benchmarks for the DI container

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use lattice_di::{Container, Inject, Lifecycle, NameMatching, Recipe};
use std::hint::black_box;

#[allow(dead_code)]
struct SmallService {
    value: i32,
}

#[allow(dead_code)]
struct MediumService {
    name: String,
    values: Vec<i32>,
}

#[allow(dead_code)]
struct LargeService {
    data: Vec<u8>,
}

struct Config;

struct UserRepository {
    _config: Inject<Config>,
}

struct UserService {
    _repo: Inject<UserRepository>,
}

struct ServiceA {
    _b: Inject<ServiceB>,
}

struct ServiceB {
    _a: Inject<ServiceA>,
}

/// Config <- UserRepository <- UserService, the service transient
fn graph_container(matching: NameMatching) -> Container {
    let container = Container::builder().name_matching(matching).build();
    container.lazy(|| Config).unwrap();
    container
        .register(
            Lifecycle::Singleton,
            Recipe::new(|args| Ok(UserRepository { _config: args.take("config")? })).named("config"),
        )
        .unwrap();
    container
        .register(
            Lifecycle::Transient,
            Recipe::new(|args| Ok(UserService { _repo: args.take("repo")? }))
                .param::<UserRepository>("repo"),
        )
        .unwrap();
    container
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("singleton_small", |b| {
        b.iter(|| {
            let container = Container::new();
            container.singleton(SmallService { value: 42 }).unwrap();
            black_box(container)
        })
    });

    group.bench_function("singleton_medium", |b| {
        b.iter(|| {
            let container = Container::new();
            container
                .singleton(MediumService {
                    name: "test".to_string(),
                    values: vec![1, 2, 3, 4, 5],
                })
                .unwrap();
            black_box(container)
        })
    });

    group.bench_function("lazy", |b| {
        b.iter(|| {
            let container = Container::new();
            container.lazy(|| SmallService { value: 42 }).unwrap();
            black_box(container)
        })
    });

    group.bench_function("with_params_3", |b| {
        b.iter(|| black_box(graph_container(NameMatching::Fuzzy)))
    });

    group.bench_function("identical_reregistration", |b| {
        let container = Container::new();
        let recipe = Recipe::from_fn(|| SmallService { value: 1 });
        container.register(Lifecycle::Singleton, recipe.clone()).unwrap();

        b.iter(|| {
            container
                .register(Lifecycle::Singleton, black_box(recipe.clone()))
                .unwrap()
        })
    });

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    // Pre-create container with services
    let container = Container::new();
    container.singleton(SmallService { value: 42 }).unwrap();
    container
        .singleton(MediumService {
            name: "test".to_string(),
            values: vec![1, 2, 3, 4, 5],
        })
        .unwrap();

    group.bench_function("get_singleton", |b| {
        b.iter(|| {
            let service = container.get::<SmallService>().unwrap();
            black_box(service)
        })
    });

    group.bench_function("get_medium", |b| {
        b.iter(|| {
            let service = container.get::<MediumService>().unwrap();
            black_box(service)
        })
    });

    group.bench_function("contains_check", |b| {
        b.iter(|| {
            let exists = container.contains::<SmallService>();
            black_box(exists)
        })
    });

    group.bench_function("try_get_not_found", |b| {
        b.iter(|| {
            let service = container.try_get::<LargeService>();
            black_box(service)
        })
    });

    group.finish();
}

fn bench_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph");
    group.throughput(Throughput::Elements(1));

    for (label, matching) in [("fuzzy", NameMatching::Fuzzy), ("exact", NameMatching::Exact)] {
        let container = graph_container(matching);
        group.bench_function(format!("transient_with_deps_{label}"), |b| {
            b.iter(|| black_box(container.get::<UserService>().unwrap()))
        });
    }

    group.bench_function("cold_cycle_resolve", |b| {
        b.iter(|| {
            let container = Container::new();
            container
                .register(
                    Lifecycle::Singleton,
                    Recipe::new(|args| Ok(ServiceA { _b: args.take("b")? })).param::<ServiceB>("b"),
                )
                .unwrap();
            container
                .register(
                    Lifecycle::Singleton,
                    Recipe::new(|args| Ok(ServiceB { _a: args.take("a")? })).param::<ServiceA>("a"),
                )
                .unwrap();
            black_box(container.get::<ServiceA>().unwrap())
        })
    });

    group.finish();
}

fn bench_transient_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("transient");
    group.throughput(Throughput::Elements(1));

    let container = Container::new();
    container.transient(|| SmallService { value: 42 }).unwrap();

    group.bench_function("get_transient", |b| {
        b.iter(|| {
            let service = container.get::<SmallService>().unwrap();
            black_box(service)
        })
    });

    group.finish();
}

fn bench_scoped(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped");

    group.bench_function("resolve_cached_in_scope", |b| {
        let container = Container::new();
        container.scoped(|| SmallService { value: 42 }).unwrap();

        b.iter(|| {
            let service = container.get::<SmallService>().unwrap();
            black_box(service)
        })
    });

    group.bench_function("scope_handle_resolve_drop", |b| {
        let container = Container::new();
        container.singleton(MediumService {
            name: "shared".into(),
            values: vec![1],
        })
        .unwrap();
        container.scoped(|| SmallService { value: 42 }).unwrap();

        b.iter(|| {
            let request = container.scope();
            let _ = request.get::<SmallService>().unwrap();
            let _ = request.get::<MediumService>().unwrap();
        })
    });

    group.bench_function("end_scope_and_rebuild", |b| {
        let container = Container::new();
        container.scoped(|| SmallService { value: 42 }).unwrap();

        b.iter(|| {
            let service = container.get::<SmallService>().unwrap();
            container.end_scope();
            black_box(service)
        })
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_reads_4", |b| {
        let container = Container::new();
        container.singleton(SmallService { value: 42 }).unwrap();

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let c = container.clone();
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let _ = c.get::<SmallService>().unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registration,
    bench_resolution,
    bench_graph,
    bench_transient_resolution,
    bench_scoped,
    bench_concurrent,
);

criterion_main!(benches);
