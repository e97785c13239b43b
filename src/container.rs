//! Dependency injection container and resolution engine
//!
//! The `Container` owns the record store and the scope manager, and resolves
//! object graphs on request: it looks up a key's recipe, fills each declared
//! parameter (recursively, or with a deferred reference when the parameter
//! closes a cycle), builds the instance and caches it per lifecycle.

use crate::recipe::{AnyArc, ErasedResolver, Param, Slot};
use crate::scope::{ContextId, Scope, ScopeManager, ScopedContainer};
use crate::storage::{NameMatching, Record, RecordStore, downcast_arc_unchecked, name_variations};
use crate::{Args, DiError, Injectable, Key, Lifecycle, Recipe, Result, stack, wait};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

struct Inner {
    store: RecordStore,
    scopes: ScopeManager,
    /// Deferred references handed out so far
    cycles_broken: AtomicU64,
    name_matching: NameMatching,
}

/// Result of looking up a key's instance
enum Obtained {
    Instance(AnyArc),
    /// Blocking on the key's cell would wait on this thread itself
    WaitCycle(Vec<Key>),
}

/// The dependency injection container.
///
/// Cloning is cheap and yields a handle to the same registry.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{Container, Inject, Lifecycle, Recipe};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Database { config: Inject<Config> }
///
/// let container = Container::new();
/// container.singleton(Config { url: "postgres://localhost".into() }).unwrap();
/// container
///     .register(
///         Lifecycle::Singleton,
///         Recipe::new(|args| Ok(Database { config: args.take("config")? }))
///             .param::<Config>("config"),
///     )
///     .unwrap();
///
/// let db = container.resolve::<Database>().unwrap();
/// assert_eq!(db.config.get().unwrap().url, "postgres://localhost");
/// assert!(Arc::ptr_eq(&db, &container.resolve::<Database>().unwrap()));
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    /// Create an empty container.
    #[inline]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a container with pre-allocated capacity.
    ///
    /// Use this when you know approximately how many services will be registered.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::builder().capacity(capacity).build()
    }

    /// Start configuring a container.
    #[inline]
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    /// Identity of this registry (shared by all clones)
    #[inline]
    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    // =========================================================================
    // Registration Methods
    // =========================================================================

    /// Register `recipe` under `T` with the given lifecycle.
    ///
    /// Registering the same key again with an identical recipe (a clone of
    /// the first) and the same lifecycle is a no-op; any other
    /// re-registration fails with [`DiError::DuplicateRegistration`].
    pub fn register<T: Injectable>(&self, lifecycle: Lifecycle, recipe: Recipe<T>) -> Result<()> {
        let key = Key::of::<T>();

        #[cfg(feature = "logging")]
        let param_count = recipe.params().len();

        let added = self.inner.store.insert(key, lifecycle, recipe.erase())?;

        if added {
            #[cfg(feature = "logging")]
            debug!(
                target: "lattice_di",
                service = key.type_name(),
                lifecycle = lifecycle.as_str(),
                params = param_count,
                service_count = self.inner.store.len(),
                "Registering service"
            );
        } else {
            #[cfg(feature = "logging")]
            trace!(
                target: "lattice_di",
                service = key.type_name(),
                "Identical registration ignored"
            );
        }

        Ok(())
    }

    /// Register a pre-built singleton instance.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lattice_di::Container;
    ///
    /// struct Database { url: String }
    ///
    /// let container = Container::new();
    /// container.singleton(Database { url: "postgres://localhost".into() }).unwrap();
    /// assert_eq!(container.get::<Database>().unwrap().url, "postgres://localhost");
    /// ```
    #[inline]
    pub fn singleton<T: Injectable>(&self, instance: T) -> Result<()> {
        self.register(Lifecycle::Singleton, Recipe::instance(instance))
    }

    /// Register a singleton built by `factory` on first resolve.
    #[inline]
    pub fn lazy<T: Injectable, F>(&self, factory: F) -> Result<()>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register(Lifecycle::Singleton, Recipe::from_fn(factory))
    }

    /// Register a transient service.
    ///
    /// A new instance is created on every resolve.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lattice_di::Container;
    /// use std::sync::atomic::{AtomicU64, Ordering};
    ///
    /// static COUNTER: AtomicU64 = AtomicU64::new(0);
    ///
    /// struct RequestId(u64);
    ///
    /// let container = Container::new();
    /// container.transient(|| RequestId(COUNTER.fetch_add(1, Ordering::SeqCst))).unwrap();
    ///
    /// let id1 = container.get::<RequestId>().unwrap();
    /// let id2 = container.get::<RequestId>().unwrap();
    /// assert_ne!(id1.0, id2.0);
    /// ```
    #[inline]
    pub fn transient<T: Injectable, F>(&self, factory: F) -> Result<()>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register(Lifecycle::Transient, Recipe::from_fn(factory))
    }

    /// Register a service with one instance per scope.
    #[inline]
    pub fn scoped<T: Injectable, F>(&self, factory: F) -> Result<()>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register(Lifecycle::Scoped, Recipe::from_fn(factory))
    }

    // =========================================================================
    // Resolution Methods
    // =========================================================================

    /// Resolve a service in the caller's context.
    ///
    /// Returns `Arc<T>` for zero-copy sharing.
    ///
    /// Outside `in_context` (with the `async` feature) the context is the calling
    /// thread. Scoped instances resolved this way live in that thread's scope
    /// until [`end_scope`](Self::end_scope) is called, however long the thread
    /// runs. For per-request work on pooled threads, resolve through
    /// [`scope`](Self::scope) instead: the handle ends its scope when dropped.
    #[inline]
    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>> {
        self.resolve_in::<T>(ContextId::current())
    }

    /// Resolve a service in an explicit context.
    pub fn resolve_in<T: Injectable>(&self, context: ContextId) -> Result<Arc<T>> {
        let instance = self.resolve_any(Key::of::<T>(), context)?;
        // SAFETY: records are keyed by TypeId::of::<T>() and only hold instances built by a Recipe<T>
        Ok(unsafe { downcast_arc_unchecked::<T>(instance) })
    }

    /// Alias for resolve.
    #[inline]
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>> {
        self.resolve::<T>()
    }

    /// Try to resolve a service, returning None on failure.
    #[inline]
    pub fn try_get<T: Injectable>(&self) -> Option<Arc<T>> {
        self.resolve::<T>().ok()
    }

    pub(crate) fn resolve_any(&self, key: Key, context: ContextId) -> Result<AnyArc> {
        match self.obtain(key, context)? {
            Obtained::Instance(instance) => Ok(instance),
            Obtained::WaitCycle(chain) => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "lattice_di",
                    service = key.type_name(),
                    chain = ?chain.iter().map(Key::simple_name).collect::<Vec<_>>(),
                    "Circular dependency across threads could not be broken"
                );
                Err(DiError::circular(chain))
            }
        }
    }

    /// Look up `key` and produce its instance for this lifecycle.
    fn obtain(&self, key: Key, context: ContextId) -> Result<Obtained> {
        let Some(record) = self.inner.store.lookup(&key.type_id()) else {
            #[cfg(feature = "logging")]
            debug!(
                target: "lattice_di",
                service = key.type_name(),
                "Service not registered"
            );
            return Err(DiError::not_registered(key));
        };

        match record.lifecycle {
            Lifecycle::Singleton => {
                if let Some(instance) = record.singleton.get() {
                    #[cfg(feature = "logging")]
                    trace!(
                        target: "lattice_di",
                        service = key.type_name(),
                        location = "singleton",
                        "Service resolved from cache"
                    );
                    return Ok(Obtained::Instance(Arc::clone(instance)));
                }
                self.check_reentry(key)?;
                self.init_cell(&record.singleton, &record, context)
            }
            Lifecycle::Scoped => {
                let scope = self.inner.scopes.current(context);
                let cell = record.scoped_cell(scope.id());
                if let Some(instance) = cell.get() {
                    #[cfg(feature = "logging")]
                    trace!(
                        target: "lattice_di",
                        service = key.type_name(),
                        scope_id = scope.id().id(),
                        location = "scope",
                        "Service resolved from cache"
                    );
                    return Ok(Obtained::Instance(Arc::clone(instance)));
                }
                self.check_reentry(key)?;
                self.init_cell(&cell, &record, context)
            }
            Lifecycle::Transient => {
                self.check_reentry(key)?;
                self.construct(&record, context).map(Obtained::Instance)
            }
        }
    }

    /// Build into a once-only cell, or report the wait cycle blocking on it would close.
    fn init_cell(&self, cell: &OnceCell<AnyArc>, record: &Record, context: ContextId) -> Result<Obtained> {
        let addr = wait::addr_of(cell);
        let _waiting = match wait::wait_for(addr, record.key) {
            Ok(guard) => guard,
            Err(chain) => return Ok(Obtained::WaitCycle(chain)),
        };
        cell.get_or_try_init(|| {
            let _owner = wait::own(addr, record.key);
            self.construct(record, context)
        })
        .map(|instance| Obtained::Instance(Arc::clone(instance)))
    }

    /// Fail if `key` is already being built on this call path with nothing cached.
    fn check_reentry(&self, key: Key) -> Result<()> {
        if !stack::contains(self.id(), key) {
            return Ok(());
        }
        Err(self.unbreakable(key))
    }

    /// Cycle error for `key`, which closes the current call path
    fn unbreakable(&self, key: Key) -> DiError {
        let chain = stack::cycle(self.id(), key);

        #[cfg(feature = "logging")]
        debug!(
            target: "lattice_di",
            service = key.type_name(),
            chain = ?chain.iter().map(Key::simple_name).collect::<Vec<_>>(),
            "Circular dependency could not be broken"
        );

        DiError::circular(chain)
    }

    /// Build a fresh instance of `record`.
    fn construct(&self, record: &Record, context: ContextId) -> Result<AnyArc> {
        let _frame = stack::enter(self.id(), record.key);

        #[cfg(feature = "logging")]
        debug!(
            target: "lattice_di",
            service = record.key.type_name(),
            lifecycle = record.lifecycle.as_str(),
            depth = stack::snapshot(self.id()).len(),
            "Constructing service"
        );

        let params = record.recipe.params();
        let mut args = Args::new(record.key, params.len());
        for param in params {
            let slot = self.fill(record.key, param, context)?;
            args.push(param.name(), slot);
        }
        record.recipe.build(&mut args)
    }

    /// Resolve the value of one declared parameter.
    fn fill(&self, service: Key, param: &Param, context: ContextId) -> Result<Slot> {
        let target = match param.annotation() {
            Some(key) => self.inner.store.contains(&key.type_id()).then_some(key),
            None => self
                .inner
                .store
                .find_by_name(param.name(), self.inner.name_matching),
        };

        let Some(target) = target else {
            if let Some(value) = param.make_default() {
                #[cfg(feature = "logging")]
                trace!(
                    target: "lattice_di",
                    service = service.type_name(),
                    param = param.name(),
                    "Using default value for unresolvable parameter"
                );
                return Ok(Slot::Ready(value));
            }
            if param.is_optional() {
                return Ok(Slot::Absent);
            }
            let candidates = match param.annotation() {
                Some(key) => vec![key.type_name().to_string()],
                None => name_variations(param.name(), self.inner.name_matching),
            };
            return Err(DiError::DependencyResolution {
                service,
                param: param.name().to_string(),
                candidates,
            });
        };

        if stack::contains(self.id(), target) {
            // A deferred reference only converges on a cached instance
            // that is not the one being built right now.
            let cached = self
                .inner
                .store
                .lookup(&target.type_id())
                .is_some_and(|record| record.lifecycle != Lifecycle::Transient);
            if target == service || !cached {
                return Err(self.unbreakable(target));
            }
            return Ok(self.defer(service, param, target, context));
        }

        match self.obtain(target, context)? {
            Obtained::Instance(instance) => Ok(Slot::Ready(instance)),
            // Another thread is building `target` and waits on this call path
            Obtained::WaitCycle(_) => Ok(self.defer(service, param, target, context)),
        }
    }

    fn defer(&self, service: Key, param: &Param, target: Key, context: ContextId) -> Slot {
        self.inner.cycles_broken.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "logging")]
        debug!(
            target: "lattice_di",
            service = service.type_name(),
            param = param.name(),
            dependency = target.type_name(),
            "Breaking cycle with deferred reference"
        );

        #[cfg(not(feature = "logging"))]
        let _ = (service, param);

        Slot::Deferred {
            key: target,
            resolver: self.deferred_resolver(target, context),
        }
    }

    /// Resolver for a deferred reference; holds the registry weakly.
    fn deferred_resolver(&self, target: Key, context: ContextId) -> ErasedResolver {
        let registry: Weak<Inner> = Arc::downgrade(&self.inner);
        Arc::new(move || {
            let inner = registry.upgrade().ok_or(DiError::ContainerDropped)?;
            Container { inner }.resolve_any(target, context)
        })
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    /// The caller's live scope, created if absent.
    ///
    /// A thread's implicit scope is never reclaimed on its own; see
    /// [`resolve`](Self::resolve).
    #[inline]
    pub fn current_scope(&self) -> Scope {
        self.current_scope_in(ContextId::current())
    }

    /// The live scope of `context`, created if absent.
    #[inline]
    pub fn current_scope_in(&self, context: ContextId) -> Scope {
        self.inner.scopes.current(context)
    }

    /// End the caller's scope, dropping its scoped instances.
    ///
    /// Ending a scope that is not live does nothing.
    #[inline]
    pub fn end_scope(&self) {
        self.end_scope_in(ContextId::current());
    }

    /// End the scope of `context`, dropping its scoped instances.
    pub fn end_scope_in(&self, context: ContextId) {
        let Some(scope) = self.inner.scopes.end(context) else {
            return;
        };
        let dropped = self.inner.store.drop_scope(scope.id());

        #[cfg(feature = "logging")]
        debug!(
            target: "lattice_di",
            scope_id = scope.id().id(),
            context = %context,
            dropped_instances = dropped,
            "Ending scope"
        );

        #[cfg(not(feature = "logging"))]
        let _ = dropped;
    }

    /// A handle bound to a fresh context; its scope ends when it is dropped.
    ///
    /// See [`ScopedContainer`].
    #[inline]
    pub fn scope(&self) -> ScopedContainer {
        ScopedContainer::new(self.clone())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Point-in-time counters.
    pub fn stats(&self) -> ContainerStats {
        ContainerStats {
            registered_count: self.inner.store.len(),
            singleton_count: self.inner.store.singleton_count(),
            scoped_count: self.inner.store.scoped_count(),
            active_scopes: self.inner.scopes.len(),
            cycles_broken: self.inner.cycles_broken.load(Ordering::Relaxed),
        }
    }

    /// Registered keys with their lifecycles, in registration order.
    ///
    /// Each call iterates a fresh snapshot.
    pub fn list_registrations(&self) -> impl Iterator<Item = (Key, Lifecycle)> + use<> {
        self.inner
            .store
            .snapshot()
            .into_iter()
            .map(|record| (record.key, record.lifecycle))
    }

    /// Check if a service is registered.
    #[inline]
    pub fn contains<T: Injectable>(&self) -> bool {
        self.inner.store.contains(&std::any::TypeId::of::<T>())
    }

    /// Lifecycle `T` is registered with
    #[inline]
    pub fn lifecycle_of<T: Injectable>(&self) -> Option<Lifecycle> {
        self.inner
            .store
            .lookup(&std::any::TypeId::of::<T>())
            .map(|record| record.lifecycle)
    }

    /// Get the number of registered services.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Check if the container is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("service_count", &self.inner.store.len())
            .field("active_scopes", &self.inner.scopes.len())
            .field("name_matching", &self.inner.name_matching)
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Configures a [`Container`] before creation.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{Container, NameMatching};
///
/// let container = Container::builder()
///     .capacity(64)
///     .name_matching(NameMatching::Exact)
///     .build();
/// assert!(container.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContainerBuilder {
    capacity: usize,
    name_matching: NameMatching,
}

impl ContainerBuilder {
    /// Expected number of registrations
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// How untyped parameters are matched to registered keys
    #[inline]
    pub fn name_matching(mut self, mode: NameMatching) -> Self {
        self.name_matching = mode;
        self
    }

    /// Create the container.
    pub fn build(self) -> Container {
        #[cfg(feature = "logging")]
        debug!(
            target: "lattice_di",
            capacity = self.capacity,
            name_matching = ?self.name_matching,
            "Creating new DI container"
        );

        Container {
            inner: Arc::new(Inner {
                store: RecordStore::with_capacity(self.capacity),
                scopes: ScopeManager::new(),
                cycles_broken: AtomicU64::new(0),
                name_matching: self.name_matching,
            }),
        }
    }
}

/// Snapshot of container counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// Registered keys
    pub registered_count: usize,
    /// Singletons constructed so far
    pub singleton_count: usize,
    /// Scoped instances alive across all scopes
    pub scoped_count: usize,
    /// Contexts with a live scope
    pub active_scopes: usize,
    /// Deferred references created to break cycles
    pub cycles_broken: u64,
}

impl fmt::Display for ContainerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} registered, {} singletons, {} scoped in {} scopes, {} cycles broken",
            self.registered_count,
            self.singleton_count,
            self.scoped_count,
            self.active_scopes,
            self.cycles_broken
        )
    }
}
