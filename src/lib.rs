//! # Lattice DI - Dependency Injection with Lifecycles, Scopes and Cycle Breaking
//!
//! A thread-safe dependency injection container that builds whole object
//! graphs from registered recipes.
//!
//! ## Features
//!
//! - **Lock-free** - Uses `DashMap` for concurrent access without blocking
//! - **Three lifecycles** - Singleton, transient and scoped instances
//! - **Declared parameters** - Dependencies by type, or matched by parameter name
//! - **Cycle breaking** - Mutually dependent services receive deferred references
//! - **Scopes** - One scope per thread, per async task, or per explicit handle
//! - **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use lattice_di::{Container, Inject, Lifecycle, Recipe};
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Inject<Database>,
//! }
//!
//! let container = Container::new();
//!
//! container.singleton(Database { url: "postgres://localhost".into() }).unwrap();
//! container
//!     .register(
//!         Lifecycle::Transient,
//!         Recipe::new(|args| Ok(UserService { db: args.take("db")? })).param::<Database>("db"),
//!     )
//!     .unwrap();
//!
//! // Resolve - returns Arc<T> for zero-copy sharing
//! let users = container.get::<UserService>().unwrap();
//! assert_eq!(users.db.get().unwrap().url, "postgres://localhost");
//! ```
//!
//! ## Circular Dependencies
//!
//! A parameter that closes a cycle back to a cached (singleton or scoped)
//! service receives a deferred reference. A type that needs itself, or a
//! cycle that comes back to a transient, fails with
//! [`DiError::CircularDependency`].
//!
//! ```rust
//! use lattice_di::{Container, Inject, Lifecycle, Recipe};
//!
//! struct Orders { customers: Inject<Customers> }
//! struct Customers { orders: Inject<Orders> }
//!
//! let container = Container::new();
//! container
//!     .register(
//!         Lifecycle::Singleton,
//!         Recipe::new(|args| Ok(Orders { customers: args.take("customers")? }))
//!             .param::<Customers>("customers"),
//!     )
//!     .unwrap();
//! container
//!     .register(
//!         Lifecycle::Singleton,
//!         Recipe::new(|args| Ok(Customers { orders: args.take("orders")? }))
//!             .param::<Orders>("orders"),
//!     )
//!     .unwrap();
//!
//! let orders = container.resolve::<Orders>().unwrap();
//! let customers = orders.customers.get().unwrap();
//! assert!(customers.orders.ptr_eq(&orders));
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use lattice_di::Container;
//! use std::sync::Arc;
//!
//! struct RequestContext;
//!
//! let container = Container::new();
//! container.scoped(|| RequestContext).unwrap();
//!
//! // Same thread, same scope
//! let a = container.resolve::<RequestContext>().unwrap();
//! let b = container.resolve::<RequestContext>().unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//!
//! // A fresh scope after ending the current one
//! container.end_scope();
//! let c = container.resolve::<RequestContext>().unwrap();
//! assert!(!Arc::ptr_eq(&a, &c));
//! ```

mod container;
mod deferred;
mod error;
#[cfg(feature = "logging")]
pub mod logging;
mod provider;
mod recipe;
mod scope;
mod stack;
mod storage;
mod wait;

pub use container::{Container, ContainerBuilder, ContainerStats};
pub use deferred::{Deferred, Inject};
pub use error::*;
pub use provider::*;
pub use recipe::{Args, Param, Recipe};
#[cfg(feature = "async")]
pub use scope::in_context;
pub use scope::{ContextId, Scope, ScopeId, ScopedContainer};
pub use storage::NameMatching;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Args, Container, DiError, Inject, Injectable, Key, Lifecycle, Recipe, Result,
        ScopedContainer,
    };
    pub use std::sync::Arc;
}
