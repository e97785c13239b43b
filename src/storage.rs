//! Dependency record storage
//!
//! One [`Record`] per registered key, held in a `DashMap` for lock-free
//! concurrent access. A record owns its recipe, its lifecycle, and the
//! instances materialized for it (one singleton, or one per live scope).

use crate::recipe::{AnyArc, ErasedRecipe};
use crate::scope::ScopeId;
use crate::{DiError, Key, Lifecycle, Result};
use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use once_cell::sync::OnceCell;
use std::any::{Any, TypeId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Downcast an `Arc<dyn Any + Send + Sync>` to `Arc<T>` without runtime type checking.
///
/// # Safety
///
/// The `Arc` must have been created from a value of type `T`.
///
/// In this crate, this is guaranteed because:
/// - Records are keyed by `TypeId::of::<T>()` at registration
/// - Registration only accepts a `Recipe<T>` for that same `T`
/// - Resolution looks up by the same `TypeId::of::<T>()`
#[inline]
pub(crate) unsafe fn downcast_arc_unchecked<T: Send + Sync + 'static>(
    arc: Arc<dyn Any + Send + Sync>,
) -> Arc<T> {
    let ptr = Arc::into_raw(arc);
    // SAFETY: ptr came from Arc::into_raw and the caller guarantees T is correct
    unsafe { Arc::from_raw(ptr as *const T) }
}

/// How parameters without a declared type are matched to registered keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMatching {
    /// Exact name first, then suffix-stripped and substring variations
    #[default]
    Fuzzy,
    /// Case-insensitive exact match of the simple type name only
    Exact,
    /// Untyped parameters never match
    Disabled,
}

/// Suffixes dropped from a parameter name when looking for a match
const NAME_SUFFIXES: [&str; 4] = ["service", "repository", "provider", "manager"];

/// Name variations tried for a parameter, in order, without duplicates.
pub(crate) fn name_variations(param: &str, mode: NameMatching) -> Vec<String> {
    let lower = param.to_lowercase();
    let mut variations = vec![lower.clone()];
    if mode == NameMatching::Fuzzy {
        variations.push(lower.replace('_', ""));
        for suffix in NAME_SUFFIXES {
            variations.push(lower.replace(suffix, ""));
        }
    }
    let mut seen = Vec::with_capacity(variations.len());
    for variation in variations {
        if !variation.is_empty() && !seen.contains(&variation) {
            seen.push(variation);
        }
    }
    seen
}

/// Everything the container knows about one registered key.
pub(crate) struct Record {
    pub(crate) key: Key,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) recipe: ErasedRecipe,
    /// Registration order, for stable listings and name matching
    pub(crate) seq: u64,
    /// Set at most once, on first singleton construction
    pub(crate) singleton: OnceCell<AnyArc>,
    /// One cell per live scope; entries go away when the scope ends
    scoped: DashMap<ScopeId, Arc<OnceCell<AnyArc>>, RandomState>,
}

impl Record {
    fn new(key: Key, lifecycle: Lifecycle, recipe: ErasedRecipe, seq: u64) -> Self {
        Self {
            key,
            lifecycle,
            recipe,
            seq,
            singleton: OnceCell::new(),
            scoped: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 4),
        }
    }

    /// Cell for `scope`, created empty if absent.
    ///
    /// The map guard is released before returning so construction never runs
    /// under a shard lock.
    pub(crate) fn scoped_cell(&self, scope: ScopeId) -> Arc<OnceCell<AnyArc>> {
        if let Some(cell) = self.scoped.get(&scope) {
            return Arc::clone(cell.value());
        }
        Arc::clone(self.scoped.entry(scope).or_default().value())
    }

    /// Drop the instance held for `scope`; true if there was one.
    pub(crate) fn drop_scope(&self, scope: ScopeId) -> bool {
        self.scoped
            .remove(&scope)
            .is_some_and(|(_, cell)| cell.get().is_some())
    }

    /// Number of scoped instances currently materialized
    pub(crate) fn scoped_instances(&self) -> usize {
        self.scoped.iter().filter(|cell| cell.get().is_some()).count()
    }
}

/// Thread-safe store of dependency records.
///
/// Uses `DashMap` with `ahash` for maximum concurrent performance.
pub(crate) struct RecordStore {
    records: DashMap<TypeId, Arc<Record>, RandomState>,
    next_seq: AtomicU64,
}

impl RecordStore {
    /// Create new empty storage with 8 shards, enough for typical containers
    /// with fewer than 50 registrations.
    #[inline]
    pub(crate) fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with pre-allocated capacity and shards scaled to match.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let shard_amount = if capacity <= 16 {
            8
        } else if capacity <= 64 {
            16
        } else {
            32
        };
        Self {
            records: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount,
            ),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Store a record for `key`.
    ///
    /// Returns `Ok(true)` when a record was added and `Ok(false)` when an
    /// identical registration already existed.
    pub(crate) fn insert(&self, key: Key, lifecycle: Lifecycle, recipe: ErasedRecipe) -> Result<bool> {
        match self.records.entry(key.type_id()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.lifecycle == lifecycle && existing.recipe.same_as(&recipe) {
                    Ok(false)
                } else {
                    Err(DiError::DuplicateRegistration {
                        key,
                        existing: existing.lifecycle,
                        requested: lifecycle,
                    })
                }
            }
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(Arc::new(Record::new(key, lifecycle, recipe, seq)));
                Ok(true)
            }
        }
    }

    /// Record for `type_id`, if registered
    #[inline]
    pub(crate) fn lookup(&self, type_id: &TypeId) -> Option<Arc<Record>> {
        self.records.get(type_id).map(|r| Arc::clone(r.value()))
    }

    /// Check if a key is registered
    #[inline]
    pub(crate) fn contains(&self, type_id: &TypeId) -> bool {
        self.records.contains_key(type_id)
    }

    /// Get number of registered keys
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// All records in registration order
    pub(crate) fn snapshot(&self) -> Vec<Arc<Record>> {
        let mut records: Vec<_> = self.records.iter().map(|r| Arc::clone(r.value())).collect();
        records.sort_by_key(|r| r.seq);
        records
    }

    /// Best-effort match of a parameter name against registered simple names.
    pub(crate) fn find_by_name(&self, param: &str, mode: NameMatching) -> Option<Key> {
        if mode == NameMatching::Disabled {
            return None;
        }

        let records = self.snapshot();
        let lower = param.to_lowercase();

        if let Some(record) = records
            .iter()
            .find(|r| r.key.simple_name().to_lowercase() == lower)
        {
            return Some(record.key);
        }

        if mode == NameMatching::Exact {
            return None;
        }

        let variations = name_variations(param, mode);
        records
            .iter()
            .find(|r| {
                let type_name = r.key.simple_name().to_lowercase();
                variations
                    .iter()
                    .any(|v| *v == type_name || type_name.contains(v.as_str()))
            })
            .map(|r| r.key)
    }

    /// Drop every record's instance for `scope`; returns how many were dropped.
    pub(crate) fn drop_scope(&self, scope: ScopeId) -> usize {
        self.records
            .iter()
            .filter(|r| r.lifecycle == Lifecycle::Scoped)
            .filter(|r| r.drop_scope(scope))
            .count()
    }

    /// Number of singletons already constructed
    pub(crate) fn singleton_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.lifecycle == Lifecycle::Singleton && r.singleton.get().is_some())
            .count()
    }

    /// Number of live scoped instances across all scopes
    pub(crate) fn scoped_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.lifecycle == Lifecycle::Scoped)
            .map(|r| r.scoped_instances())
            .sum()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Recipe;

    struct UserRepository;
    struct EmailService;
    struct Config;

    fn store_with_users() -> RecordStore {
        let store = RecordStore::new();
        store
            .insert(
                Key::of::<UserRepository>(),
                Lifecycle::Singleton,
                Recipe::from_fn(|| UserRepository).erase(),
            )
            .unwrap();
        store
            .insert(
                Key::of::<EmailService>(),
                Lifecycle::Transient,
                Recipe::from_fn(|| EmailService).erase(),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = store_with_users();
        assert_eq!(store.len(), 2);
        let record = store.lookup(&TypeId::of::<UserRepository>()).unwrap();
        assert_eq!(record.lifecycle, Lifecycle::Singleton);
        assert!(store.lookup(&TypeId::of::<Config>()).is_none());
    }

    #[test]
    fn test_identical_reinsert_is_noop() {
        let store = RecordStore::new();
        let recipe = Recipe::from_fn(|| Config);
        let key = Key::of::<Config>();
        assert!(store.insert(key, Lifecycle::Singleton, recipe.clone().erase()).unwrap());
        assert!(!store.insert(key, Lifecycle::Singleton, recipe.clone().erase()).unwrap());

        let err = store.insert(key, Lifecycle::Transient, recipe.erase()).unwrap_err();
        assert!(matches!(err, DiError::DuplicateRegistration { .. }));

        let err = store
            .insert(key, Lifecycle::Singleton, Recipe::from_fn(|| Config).erase())
            .unwrap_err();
        assert!(matches!(err, DiError::DuplicateRegistration { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_in_registration_order() {
        let store = store_with_users();
        let keys: Vec<_> = store.snapshot().iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![Key::of::<UserRepository>(), Key::of::<EmailService>()]);
    }

    #[test]
    fn test_find_by_exact_name() {
        let store = store_with_users();
        assert_eq!(
            store.find_by_name("UserRepository", NameMatching::Fuzzy),
            Some(Key::of::<UserRepository>())
        );
        assert_eq!(
            store.find_by_name("emailservice", NameMatching::Exact),
            Some(Key::of::<EmailService>())
        );
    }

    #[test]
    fn test_find_by_variation() {
        let store = store_with_users();
        assert_eq!(
            store.find_by_name("user_repository", NameMatching::Fuzzy),
            Some(Key::of::<UserRepository>())
        );
        assert_eq!(
            store.find_by_name("email", NameMatching::Fuzzy),
            Some(Key::of::<EmailService>())
        );
        assert_eq!(store.find_by_name("email", NameMatching::Exact), None);
        assert_eq!(store.find_by_name("email", NameMatching::Disabled), None);
        assert_eq!(store.find_by_name("missing_param", NameMatching::Fuzzy), None);
    }

    #[test]
    fn test_bare_suffix_never_matches_everything() {
        let store = store_with_users();
        // "service" minus its suffix is empty and must not act as a wildcard
        assert_eq!(
            store.find_by_name("service", NameMatching::Fuzzy),
            Some(Key::of::<EmailService>())
        );
        assert_eq!(store.find_by_name("manager", NameMatching::Fuzzy), None);
    }

    #[test]
    fn test_name_variations() {
        let v = name_variations("User_Service", NameMatching::Fuzzy);
        assert_eq!(v[0], "user_service");
        assert!(v.contains(&"userservice".to_string()));
        assert!(v.contains(&"user_".to_string()));
        assert_eq!(name_variations("cache", NameMatching::Exact), vec!["cache"]);
    }

    #[test]
    fn test_scoped_cells_drop_per_scope() {
        let store = RecordStore::new();
        store
            .insert(Key::of::<Config>(), Lifecycle::Scoped, Recipe::from_fn(|| Config).erase())
            .unwrap();
        let record = store.lookup(&TypeId::of::<Config>()).unwrap();

        let s1 = crate::ContextId::new();
        let manager = crate::scope::ScopeManager::new();
        let scope = manager.current(s1).id();

        let cell = record.scoped_cell(scope);
        cell.set(Arc::new(Config) as AnyArc).ok();
        assert!(Arc::ptr_eq(&cell, &record.scoped_cell(scope)));
        assert_eq!(store.scoped_count(), 1);

        assert_eq!(store.drop_scope(scope), 1);
        assert_eq!(store.drop_scope(scope), 0);
        assert_eq!(store.scoped_count(), 0);
    }
}
