//! Provider traits and identities for dependency injection
//!
//! These types define what can be registered, how it is identified, and how
//! long a constructed instance lives.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Marker trait for types that can be injected via the DI container.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
///
/// # Examples
///
/// ```rust
/// // Any type that is Send + Sync + 'static works automatically
/// struct MyService {
///     name: String,
/// }
///
/// // No impl needed - it just works!
/// ```
pub trait Injectable: Send + Sync + 'static {
    /// Returns the registry key of this type
    #[inline]
    fn key_of() -> Key
    where
        Self: Sized,
    {
        Key::of::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// Instance reuse policy of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifecycle {
    /// One instance per container, created on first resolve
    Singleton,

    /// New instance created on every resolve
    #[default]
    Transient,

    /// One instance per scope (see [`crate::Scope`])
    Scoped,
}

impl Lifecycle {
    /// Lower-case name used in logs and diagnostics
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Singleton => "singleton",
            Lifecycle::Transient => "transient",
            Lifecycle::Scoped => "scoped",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a registered type.
///
/// Equality and hashing use only the `TypeId`; the names are carried along so
/// errors and logs can be reported without a registry lookup.
#[derive(Clone, Copy)]
pub struct Key {
    type_id: TypeId,
    type_name: &'static str,
}

impl Key {
    /// Key for type `T`
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name, e.g. `app::db::UserRepository<app::Pg>`
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Last path segment with generics stripped, e.g. `UserRepository`.
    ///
    /// This is the name parameters are matched against when a recipe
    /// parameter carries no type.
    pub fn simple_name(&self) -> &'static str {
        simple_name(self.type_name)
    }
}

/// Strip module path and generic arguments from a type name.
pub(crate) fn simple_name(type_name: &'static str) -> &'static str {
    let base = match type_name.find('<') {
        Some(idx) => &type_name[..idx],
        None => type_name,
    };
    match base.rfind("::") {
        Some(idx) => &base[idx + 2..],
        None => base,
    }
}

impl PartialEq for Key {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Key {}

impl Hash for Key {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.type_name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.simple_name())
    }
}
