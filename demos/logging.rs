//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```
//!
//! `RUST_LOG=lattice_di=trace` also shows per-resolve cache hits.

use lattice_di::{Container, DiError, Inject, Lifecycle, Recipe};

struct Database {
    url: String,
}

struct UserRepository {
    db: Inject<Database>,
}

struct AuditLog {
    users: Inject<UserService>,
}

struct UserService {
    repo: Inject<UserRepository>,
    audit: Inject<AuditLog>,
}

struct RequestContext {
    request_id: u64,
}

fn main() -> Result<(), DiError> {
    lattice_di::logging::init();

    println!("=== Lattice DI Logging Demo ===\n");

    // logs: "Creating new DI container"
    let container = Container::new();

    // logs: "Registering service"
    container.singleton(Database {
        url: "postgres://localhost/mydb".into(),
    })?;
    container.register(
        Lifecycle::Singleton,
        Recipe::new(|args| Ok(UserRepository { db: args.take("db")? })).param::<Database>("db"),
    )?;

    // Untyped parameters are matched by name
    container.register(
        Lifecycle::Singleton,
        Recipe::new(|args| {
            Ok(UserService {
                repo: args.take("user_repository")?,
                audit: args.take("audit_log")?,
            })
        })
        .named("user_repository")
        .named("audit_log"),
    )?;

    // AuditLog and UserService depend on each other
    container.register(
        Lifecycle::Singleton,
        Recipe::new(|args| Ok(AuditLog { users: args.take("users")? }))
            .param::<UserService>("users"),
    )?;

    // logs: "Constructing service" for the whole graph, then
    // "Breaking cycle with deferred reference"
    let users = container.resolve::<UserService>()?;
    println!("  [App] database: {}", users.repo.get()?.db.get()?.url);

    // logs: "Resolving deferred reference on first use"
    let audit = users.audit.get()?;
    println!("  [App] audit log sees the same service: {}", audit.users.ptr_eq(&users));

    // logs: "Service not registered"
    assert!(container.try_get::<i32>().is_none());

    // Request scopes: logs "Creating ScopedContainer", "Creating scope", "Ending scope"
    container.register(
        Lifecycle::Scoped,
        Recipe::from_fn({
            let next = std::sync::atomic::AtomicU64::new(1);
            move || RequestContext {
                request_id: next.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            }
        }),
    )?;
    for _ in 0..2 {
        let request = container.scope();
        let ctx = request.resolve::<RequestContext>()?;
        println!("  [App] handling request {}", ctx.request_id);
    }

    println!("\n  [App] {}", container.stats());

    println!("\n=== Demo Complete ===");
    println!("\nTip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
    Ok(())
}
