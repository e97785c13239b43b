//! Scope support
//!
//! A scope is one logical unit of work inside which `Scoped` registrations
//! share an instance. Each execution context (a thread, an async task, or a
//! caller-minted context) has at most one live scope; it is created on first
//! use and discarded by an explicit end.

use crate::{Container, Injectable, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;
use std::time::Instant;

#[cfg(feature = "logging")]
use tracing::debug;

#[cfg(feature = "async")]
tokio::task_local! {
    static TASK_CONTEXT: ContextId;
}

/// Unique scope identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// Identity of the execution context that owns a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    /// The calling thread
    Thread(ThreadId),
    /// A caller-supplied unit of work
    Explicit(u64),
}

impl ContextId {
    /// Mint a fresh explicit context.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ContextId::Explicit(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The context of the caller.
    ///
    /// Inside [`in_context`] (feature `async`) this is the context installed
    /// for the task; otherwise it is the calling thread.
    pub fn current() -> Self {
        #[cfg(feature = "async")]
        {
            if let Ok(context) = TASK_CONTEXT.try_with(|context| *context) {
                return context;
            }
        }
        ContextId::Thread(std::thread::current().id())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Thread(id) => write!(f, "{:?}", id),
            ContextId::Explicit(id) => write!(f, "context-{}", id),
        }
    }
}

/// Run `future` with `context` as its [`ContextId::current`].
///
/// Every resolution and scope end performed by the future (on whatever
/// worker thread it is polled) then shares one scope.
#[cfg(feature = "async")]
pub async fn in_context<F>(context: ContextId, future: F) -> F::Output
where
    F: std::future::Future,
{
    TASK_CONTEXT.scope(context, future).await
}

/// One live scope.
#[derive(Debug, Clone, Copy)]
pub struct Scope {
    id: ScopeId,
    context: ContextId,
    created_at: Instant,
}

impl Scope {
    fn new(context: ContextId) -> Self {
        Self {
            id: ScopeId::next(),
            context,
            created_at: Instant::now(),
        }
    }

    /// Scope identifier
    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Context that owns this scope
    #[inline]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// When the scope was created (informational)
    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.context)
    }
}

/// Tracks the live scope of every context.
pub(crate) struct ScopeManager {
    scopes: DashMap<ContextId, Scope, RandomState>,
}

impl ScopeManager {
    pub(crate) fn new() -> Self {
        Self {
            scopes: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Live scope of `context`, creating one if absent.
    pub(crate) fn current(&self, context: ContextId) -> Scope {
        if let Some(scope) = self.scopes.get(&context) {
            return *scope.value();
        }

        *self
            .scopes
            .entry(context)
            .or_insert_with(|| {
                let scope = Scope::new(context);

                #[cfg(feature = "logging")]
                debug!(
                    target: "lattice_di",
                    scope_id = scope.id.id(),
                    context = %context,
                    "Creating scope"
                );

                scope
            })
            .value()
    }

    /// Live scope of `context` without creating one
    #[cfg(test)]
    pub(crate) fn peek(&self, context: ContextId) -> Option<Scope> {
        self.scopes.get(&context).map(|scope| *scope.value())
    }

    /// Discard the scope of `context`, returning it if one was live.
    pub(crate) fn end(&self, context: ContextId) -> Option<Scope> {
        self.scopes.remove(&context).map(|(_, scope)| scope)
    }

    pub(crate) fn len(&self) -> usize {
        self.scopes.len()
    }
}

impl fmt::Debug for ScopeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeManager")
            .field("active", &self.len())
            .finish()
    }
}

/// A container bound to its own explicit context.
///
/// Useful for request-scoped work: every resolve through the handle shares
/// one scope, and dropping the handle ends it.
///
/// # Examples
///
/// ```rust
/// use lattice_di::Container;
/// use std::sync::Arc;
///
/// struct RequestContext;
///
/// let container = Container::new();
/// container.scoped(|| RequestContext).unwrap();
///
/// let request = container.scope();
/// let a = request.resolve::<RequestContext>().unwrap();
/// let b = request.resolve::<RequestContext>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// let other = container.scope();
/// let c = other.resolve::<RequestContext>().unwrap();
/// assert!(!Arc::ptr_eq(&a, &c));
/// ```
pub struct ScopedContainer {
    container: Container,
    context: ContextId,
}

impl ScopedContainer {
    pub(crate) fn new(container: Container) -> Self {
        let context = ContextId::new();

        #[cfg(feature = "logging")]
        debug!(
            target: "lattice_di",
            context = %context,
            "Creating ScopedContainer"
        );

        Self { container, context }
    }

    /// The context this handle resolves in
    #[inline]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// The live scope of this handle (created on first call)
    #[inline]
    pub fn scope(&self) -> Scope {
        self.container.current_scope_in(self.context)
    }

    /// Resolve a service in this handle's scope.
    #[inline]
    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>> {
        self.container.resolve_in::<T>(self.context)
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

    /// End the scope now; later resolves start a fresh one.
    #[inline]
    pub fn reset(&self) {
        self.container.end_scope_in(self.context);
    }

    /// Get the underlying container.
    #[inline]
    pub fn container(&self) -> &Container {
        &self.container
    }
}

impl Drop for ScopedContainer {
    fn drop(&mut self) {
        self.container.end_scope_in(self.context);
    }
}

impl fmt::Debug for ScopedContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedContainer")
            .field("context", &self.context)
            .field("container", &self.container)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RequestService;

    #[test]
    fn test_scope_ids_unique() {
        let s1 = ScopeId::next();
        let s2 = ScopeId::next();
        let s3 = ScopeId::next();

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
    }

    #[test]
    fn test_scope_display() {
        let scope = Scope::new(ContextId::new());
        let display = format!("{}", scope);
        assert!(display.starts_with("scope-"));
        assert!(display.contains("context-"));
    }

    #[test]
    fn test_current_is_read_creates() {
        let manager = ScopeManager::new();
        let ctx = ContextId::new();
        assert!(manager.peek(ctx).is_none());

        let first = manager.current(ctx);
        let second = manager.current(ctx);
        assert_eq!(first.id(), second.id());
        assert_eq!(first.context(), ctx);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_end_is_idempotent() {
        let manager = ScopeManager::new();
        let ctx = ContextId::new();
        let scope = manager.current(ctx);

        assert_eq!(manager.end(ctx).map(|s| s.id()), Some(scope.id()));
        assert!(manager.end(ctx).is_none());

        // A fresh scope on next access
        assert_ne!(manager.current(ctx).id(), scope.id());
    }

    #[test]
    fn test_thread_contexts_differ() {
        let here = ContextId::current();
        let there = std::thread::spawn(ContextId::current).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, ContextId::current());
    }

    #[test]
    fn test_scoped_container_ends_scope_on_drop() {
        let container = Container::new();
        container.scoped(|| RequestService).unwrap();

        let handle = container.scope();
        let ctx = handle.context();
        let first = handle.resolve::<RequestService>().unwrap();
        assert!(Arc::ptr_eq(&first, &handle.resolve::<RequestService>().unwrap()));
        assert_eq!(container.stats().active_scopes, 1);

        drop(handle);
        assert_eq!(container.stats().active_scopes, 0);
        assert_eq!(container.stats().scoped_count, 0);

        let after = container.resolve_in::<RequestService>(ctx).unwrap();
        assert!(!Arc::ptr_eq(&first, &after));
    }

    #[test]
    fn test_scoped_container_reset() {
        let container = Container::new();
        container.scoped(|| RequestService).unwrap();

        let handle = container.scope();
        let before = handle.scope().id();
        let a = handle.resolve::<RequestService>().unwrap();
        handle.reset();
        let b = handle.resolve::<RequestService>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(handle.scope().id(), before);
    }

    #[cfg(feature = "async")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_task_context_spans_awaits() {
        let container = Container::new();
        container.scoped(|| RequestService).unwrap();

        let ctx = ContextId::new();
        let c = container.clone();
        let (a, b) = in_context(ctx, async move {
            assert_eq!(ContextId::current(), ctx);
            let a = c.resolve::<RequestService>().unwrap();
            tokio::task::yield_now().await;
            let b = c.resolve::<RequestService>().unwrap();
            (a, b)
        })
        .await;

        assert!(Arc::ptr_eq(&a, &b));
        let outside = container.resolve::<RequestService>().unwrap();
        assert!(!Arc::ptr_eq(&a, &outside));
    }
}
