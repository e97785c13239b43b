//! Deferred references for breaking dependency cycles
//!
//! When a constructor parameter names a type that is already being built on
//! the same call path, the engine hands the constructor a [`Deferred`]
//! instead of recursing. The placeholder resolves on first use, exactly once,
//! and forwards every later access to the cached result.
//!
//! Constructors receive parameters as [`Inject<T>`], which is either the
//! ready instance or such a placeholder, so the same field type works for
//! both cases.

use crate::{DiError, Injectable, Key, Result, wait};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

type ResolverFn<T> = Box<dyn Fn() -> Result<Arc<T>> + Send + Sync>;

/// The eventual instance of `T`, resolved on first access.
///
/// A `Deferred` is owned by the single parameter slot it fills and is never
/// shared; it is deliberately not `Clone`.
///
/// # Examples
///
/// ```rust
/// use lattice_di::Deferred;
/// use std::sync::Arc;
///
/// let lazy = Deferred::new(|| Ok(Arc::new(String::from("ready"))));
/// assert!(!lazy.is_resolved());
/// assert_eq!(lazy.get().unwrap().as_str(), "ready");
/// assert!(lazy.is_resolved());
/// ```
pub struct Deferred<T> {
    key: Key,
    resolver: ResolverFn<T>,
    /// Outcome of the single resolver invocation (success or failure)
    outcome: OnceCell<Result<Arc<T>>>,
}

impl<T: Injectable> Deferred<T> {
    /// Create a placeholder around a resolver callback.
    pub fn new<F>(resolver: F) -> Self
    where
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            key: Key::of::<T>(),
            resolver: Box::new(resolver),
            outcome: OnceCell::new(),
        }
    }

    /// Create from a type-erased resolver, checking the produced type on use.
    pub(crate) fn from_erased(key: Key, param: &'static str, resolver: crate::recipe::ErasedResolver) -> Self {
        Self {
            key,
            resolver: Box::new(move || {
                resolver()?
                    .downcast::<T>()
                    .map_err(|_| DiError::type_mismatch::<T>(param))
            }),
            outcome: OnceCell::new(),
        }
    }

    /// Resolve on first call, then return the cached instance.
    ///
    /// The resolver runs at most once, even under concurrent first access;
    /// a failed resolution is cached as well and reported on every access.
    pub fn get(&self) -> Result<&Arc<T>> {
        if let Some(outcome) = self.outcome.get() {
            return outcome.as_ref().map_err(Clone::clone);
        }

        // Re-entry from this thread, or a wait cycle through other threads
        let cell = wait::addr_of(&self.outcome);
        let _waiting = wait::wait_for(cell, self.key)
            .map_err(|chain| DiError::unresolvable(self.key, DiError::circular(chain)))?;

        self.outcome
            .get_or_init(|| {
                let _owner = wait::own(cell, self.key);

                #[cfg(feature = "logging")]
                debug!(
                    target: "lattice_di",
                    service = self.key.type_name(),
                    "Resolving deferred reference on first use"
                );

                (self.resolver)().map_err(|e| DiError::unresolvable(self.key, e))
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The cached instance, without triggering resolution
    #[inline]
    pub fn peek(&self) -> Option<&Arc<T>> {
        self.outcome.get().and_then(|outcome| outcome.as_ref().ok())
    }

    /// Whether the placeholder has already been resolved successfully
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.peek().is_some()
    }

    /// Key of the target type
    #[inline]
    pub fn key(&self) -> Key {
        self.key
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.outcome.get() {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("Deferred")
            .field("target", &self.key.type_name())
            .field("state", &state)
            .finish()
    }
}

impl<T: Injectable + fmt::Display> fmt::Display for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Ok(value) => fmt::Display::fmt(&**value, f),
            Err(_) => write!(f, "<unresolved {}>", self.key.simple_name()),
        }
    }
}

impl<T: Injectable + PartialEq> PartialEq for Deferred<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.get(), other.get()) {
            (Ok(a), Ok(b)) => **a == **b,
            _ => false,
        }
    }
}

/// A constructor parameter value: the instance itself, or a placeholder for it.
pub enum Inject<T> {
    /// Resolved synchronously while the dependent was being built
    Ready(Arc<T>),
    /// Substituted to break a cycle; resolves on first use
    Deferred(Deferred<T>),
}

impl<T: Injectable> Inject<T> {
    /// Access the instance, resolving a placeholder if needed.
    #[inline]
    pub fn get(&self) -> Result<&Arc<T>> {
        match self {
            Inject::Ready(value) => Ok(value),
            Inject::Deferred(deferred) => deferred.get(),
        }
    }

    /// Access the instance as an owned `Arc`.
    #[inline]
    pub fn cloned(&self) -> Result<Arc<T>> {
        self.get().map(Arc::clone)
    }

    /// Whether this slot was filled by a placeholder
    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Inject::Deferred(_))
    }

    /// Whether the instance is available without further resolution
    #[inline]
    pub fn is_resolved(&self) -> bool {
        match self {
            Inject::Ready(_) => true,
            Inject::Deferred(deferred) => deferred.is_resolved(),
        }
    }

    /// Reference equality against an instance (resolves a placeholder first)
    pub fn ptr_eq(&self, other: &Arc<T>) -> bool {
        self.get().is_ok_and(|value| Arc::ptr_eq(value, other))
    }
}

impl<T> From<Arc<T>> for Inject<T> {
    fn from(value: Arc<T>) -> Self {
        Inject::Ready(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inject::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Inject::Deferred(deferred) => fmt::Debug::fmt(deferred, f),
        }
    }
}

impl<T: Injectable + fmt::Display> fmt::Display for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inject::Ready(value) => fmt::Display::fmt(&**value, f),
            Inject::Deferred(deferred) => fmt::Display::fmt(deferred, f),
        }
    }
}

impl<T: Injectable + PartialEq> PartialEq for Inject<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.get(), other.get()) {
            (Ok(a), Ok(b)) => **a == **b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct Name(String);

    impl fmt::Display for Name {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    #[test]
    fn test_resolver_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let deferred = Deferred::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Name("a".into())))
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let first = Arc::clone(deferred.get().unwrap());
        let second = Arc::clone(deferred.get().unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_surfaces_on_first_use_and_is_cached() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let deferred: Deferred<Name> = Deferred::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(DiError::not_registered(Key::of::<Name>()))
        });

        // Creation alone never fails
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let err = deferred.get().unwrap_err();
        assert!(matches!(err, DiError::UnresolvableReference { .. }));
        assert!(deferred.get().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!deferred.is_resolved());
    }

    #[test]
    fn test_display_and_eq_forward() {
        let a = Deferred::new(|| Ok(Arc::new(Name("same".into()))));
        let b = Deferred::new(|| Ok(Arc::new(Name("same".into()))));
        assert_eq!(a.to_string(), "same");
        assert!(a == b);
    }

    #[test]
    fn test_debug_does_not_resolve() {
        let deferred = Deferred::new(|| Ok(Arc::new(Name("x".into()))));
        let text = format!("{:?}", deferred);
        assert!(text.contains("pending"));
        assert!(!deferred.is_resolved());
    }

    #[test]
    fn test_concurrent_first_access_resolves_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let deferred = Arc::new(Deferred::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(Arc::new(Name("shared".into())))
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = Arc::clone(&deferred);
                std::thread::spawn(move || Arc::clone(d.get().unwrap()))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_inject_ready_and_ptr_eq() {
        let value = Arc::new(Name("r".into()));
        let inject = Inject::from(Arc::clone(&value));
        assert!(!inject.is_deferred());
        assert!(inject.is_resolved());
        assert!(inject.ptr_eq(&value));
        assert_eq!(inject.to_string(), "r");
    }
}
