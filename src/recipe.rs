//! Construction recipes
//!
//! A recipe is the construction procedure associated with a registered key:
//! an ordered list of declared parameters plus a build closure. The
//! resolution engine fills one slot per parameter and hands them to the
//! closure through [`Args`].
//!
//! Recipes are type-erased into [`ErasedRecipe`] at registration so records
//! of different types can live in one map.

use crate::deferred::{Deferred, Inject};
use crate::{DiError, Injectable, Key, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased shared instance
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// Type-erased callback performing a delayed resolution
pub(crate) type ErasedResolver = Arc<dyn Fn() -> Result<AnyArc> + Send + Sync>;

type DefaultFn = Arc<dyn Fn() -> AnyArc + Send + Sync>;

type BuildFn<T> = dyn Fn(&mut Args) -> Result<T> + Send + Sync;

type ErasedBuildFn = Arc<dyn Fn(&mut Args) -> Result<AnyArc> + Send + Sync>;

// =============================================================================
// Parameters
// =============================================================================

/// A declared constructor parameter.
///
/// A parameter is matched to a registered key by its declared type if it has
/// one, otherwise by its name. When neither succeeds the declared default (if
/// any) is used; optional parameters are left empty.
#[derive(Clone)]
pub struct Param {
    name: &'static str,
    annotation: Option<Key>,
    default: Option<DefaultFn>,
    optional: bool,
}

impl Param {
    /// A parameter resolved by its type
    #[inline]
    pub fn typed<U: Injectable>(name: &'static str) -> Self {
        Self {
            name,
            annotation: Some(Key::of::<U>()),
            default: None,
            optional: false,
        }
    }

    /// A parameter resolved by matching its name against registered types
    #[inline]
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            annotation: None,
            default: None,
            optional: false,
        }
    }

    /// Fall back to `default` when the parameter cannot be resolved at all.
    pub fn with_default<U, F>(mut self, default: F) -> Self
    where
        U: Injectable,
        F: Fn() -> U + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(move || Arc::new(default()) as AnyArc));
        self
    }

    /// Leave the slot empty instead of failing when unresolvable.
    #[inline]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Parameter name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared type, if any
    #[inline]
    pub fn annotation(&self) -> Option<Key> {
        self.annotation
    }

    /// Whether a default value is declared
    #[inline]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Whether the parameter may be left empty
    #[inline]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub(crate) fn make_default(&self) -> Option<AnyArc> {
        self.default.as_ref().map(|make| make())
    }

    /// Same declaration (defaults compared by identity)
    fn same_as(&self, other: &Param) -> bool {
        self.name == other.name
            && self.annotation == other.annotation
            && self.optional == other.optional
            && match (&self.default, &other.default) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.name)
            .field("annotation", &self.annotation)
            .field("has_default", &self.default.is_some())
            .field("optional", &self.optional)
            .finish()
    }
}

// =============================================================================
// Recipe
// =============================================================================

enum Build<T> {
    /// Pre-built value returned as-is
    Instance(Arc<T>),
    /// Constructor invoked with the assembled parameter slots
    Construct(Box<BuildFn<T>>),
}

/// How to construct a `T`.
///
/// Cloning a recipe is cheap and yields an *identical* recipe: registering
/// the same key twice with clones of one recipe (and the same lifecycle) is
/// a no-op.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{Container, Inject, Lifecycle, Recipe};
///
/// struct Config { verbose: bool }
/// struct Logger { config: Inject<Config> }
///
/// let container = Container::new();
/// container.register(Lifecycle::Singleton, Recipe::from_fn(|| Config { verbose: true })).unwrap();
/// container
///     .register(
///         Lifecycle::Singleton,
///         Recipe::new(|args| Ok(Logger { config: args.take("config")? }))
///             .param::<Config>("config"),
///     )
///     .unwrap();
///
/// let logger = container.resolve::<Logger>().unwrap();
/// assert!(logger.config.get().unwrap().verbose);
/// ```
pub struct Recipe<T> {
    params: Vec<Param>,
    build: Arc<Build<T>>,
}

impl<T: Injectable> Recipe<T> {
    /// A recipe whose constructor reads its parameters from [`Args`].
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&mut Args) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            params: Vec::new(),
            build: Arc::new(Build::Construct(Box::new(build))),
        }
    }

    /// A recipe from a parameterless factory.
    pub fn from_fn<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(move |_| Ok(factory()))
    }

    /// A recipe that always yields this pre-built instance.
    pub fn instance(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// A recipe that always yields this shared instance.
    pub fn from_arc(value: Arc<T>) -> Self {
        Self {
            params: Vec::new(),
            build: Arc::new(Build::Instance(value)),
        }
    }

    /// Declare a parameter resolved by type.
    #[inline]
    pub fn param<U: Injectable>(self, name: &'static str) -> Self {
        self.with(Param::typed::<U>(name))
    }

    /// Declare a parameter resolved by name.
    #[inline]
    pub fn named(self, name: &'static str) -> Self {
        self.with(Param::named(name))
    }

    /// Declare a typed parameter with a default value.
    pub fn param_or<U, F>(self, name: &'static str, default: F) -> Self
    where
        U: Injectable,
        F: Fn() -> U + Send + Sync + 'static,
    {
        self.with(Param::typed::<U>(name).with_default(default))
    }

    /// Declare a typed parameter that may stay empty.
    #[inline]
    pub fn optional<U: Injectable>(self, name: &'static str) -> Self {
        self.with(Param::typed::<U>(name).optional())
    }

    /// Declare an arbitrary parameter.
    #[inline]
    pub fn with(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Declared parameters in order
    #[inline]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub(crate) fn erase(self) -> ErasedRecipe {
        let identity = Arc::as_ptr(&self.build) as *const () as usize;
        let build = Arc::clone(&self.build);
        let erased: ErasedBuildFn = Arc::new(move |args: &mut Args| match &*build {
            Build::Instance(value) => Ok(Arc::clone(value) as AnyArc),
            Build::Construct(f) => f(args).map(|value| Arc::new(value) as AnyArc),
        });
        ErasedRecipe {
            params: self.params.into(),
            build: erased,
            identity,
            _keepalive: self.build,
        }
    }
}

impl<T> Clone for Recipe<T> {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            build: Arc::clone(&self.build),
        }
    }
}

impl<T> fmt::Debug for Recipe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.build {
            Build::Instance(_) => "instance",
            Build::Construct(_) => "constructor",
        };
        f.debug_struct("Recipe")
            .field("type", &std::any::type_name::<T>())
            .field("kind", &kind)
            .field("params", &self.params)
            .finish()
    }
}

/// A recipe with its output type erased.
pub(crate) struct ErasedRecipe {
    params: Arc<[Param]>,
    build: ErasedBuildFn,
    /// Address of the shared build allocation
    identity: usize,
    /// Keeps `identity` from being reused while this recipe exists
    _keepalive: Arc<dyn Any + Send + Sync>,
}

impl ErasedRecipe {
    #[inline]
    pub(crate) fn params(&self) -> &[Param] {
        &self.params
    }

    #[inline]
    pub(crate) fn build(&self, args: &mut Args) -> Result<AnyArc> {
        (self.build)(args)
    }

    /// Identical recipes share their build allocation and declare the same parameters.
    pub(crate) fn same_as(&self, other: &ErasedRecipe) -> bool {
        self.identity == other.identity
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(other.params.iter())
                .all(|(a, b)| a.same_as(b))
    }
}

// =============================================================================
// Args
// =============================================================================

/// Filled value of one parameter.
pub(crate) enum Slot {
    /// Resolved instance or default value
    Ready(AnyArc),
    /// Placeholder for a key still under construction
    Deferred { key: Key, resolver: ErasedResolver },
    /// Optional parameter with nothing to inject
    Absent,
}

/// Parameter values handed to a recipe's constructor.
///
/// Each slot can be taken once; the constructor becomes the exclusive owner
/// of what it takes.
pub struct Args {
    service: Key,
    slots: Vec<(&'static str, Option<Slot>)>,
}

impl Args {
    pub(crate) fn new(service: Key, capacity: usize) -> Self {
        Self {
            service,
            slots: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, name: &'static str, slot: Slot) {
        self.slots.push((name, Some(slot)));
    }

    /// Key of the service being constructed
    #[inline]
    pub fn service(&self) -> Key {
        self.service
    }

    /// Number of declared parameters
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the recipe declared no parameters
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn take_slot(&mut self, name: &str) -> Result<(&'static str, Slot)> {
        let service = self.service;
        self.slots
            .iter_mut()
            .find(|(n, slot)| *n == name && slot.is_some())
            .and_then(|(n, slot)| slot.take().map(|s| (*n, s)))
            .ok_or_else(|| DiError::UndeclaredParameter {
                service,
                param: name.to_string(),
            })
    }

    /// Take a parameter, possibly as a placeholder.
    pub fn take<U: Injectable>(&mut self, name: &str) -> Result<Inject<U>> {
        let service = self.service;
        match self.take_optional::<U>(name)? {
            Some(value) => Ok(value),
            None => Err(DiError::DependencyResolution {
                service,
                param: name.to_string(),
                candidates: vec![std::any::type_name::<U>().to_string()],
            }),
        }
    }

    /// Take an optional parameter; `None` if it could not be resolved.
    pub fn take_optional<U: Injectable>(&mut self, name: &str) -> Result<Option<Inject<U>>> {
        let (name, slot) = self.take_slot(name)?;
        match slot {
            Slot::Ready(value) => value
                .downcast::<U>()
                .map(|value| Some(Inject::Ready(value)))
                .map_err(|_| DiError::type_mismatch::<U>(name)),
            Slot::Deferred { key, resolver } => {
                if key.type_id() != std::any::TypeId::of::<U>() {
                    return Err(DiError::type_mismatch::<U>(name));
                }
                Ok(Some(Inject::Deferred(Deferred::from_erased(key, name, resolver))))
            }
            Slot::Absent => Ok(None),
        }
    }

    /// Take a parameter and resolve it now.
    ///
    /// Forcing a placeholder while its target is still under construction
    /// fails with a circular dependency error.
    pub fn resolve<U: Injectable>(&mut self, name: &str) -> Result<Arc<U>> {
        self.take::<U>(name)?.cloned()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.is_some())
            .map(|(name, _)| *name)
            .collect();
        f.debug_struct("Args")
            .field("service", &self.service)
            .field("available", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Service;
    #[derive(Debug)]
    struct Config(u32);

    fn args_with_config() -> Args {
        let mut args = Args::new(Key::of::<Service>(), 1);
        args.push("config", Slot::Ready(Arc::new(Config(7)) as AnyArc));
        args
    }

    #[test]
    fn test_take_once() {
        let mut args = args_with_config();
        let config = args.take::<Config>("config").unwrap();
        assert_eq!(config.get().unwrap().0, 7);

        let again = args.take::<Config>("config");
        assert!(matches!(again, Err(DiError::UndeclaredParameter { .. })));
    }

    #[test]
    fn test_take_wrong_type() {
        let mut args = args_with_config();
        let err = args.take::<String>("config").err().unwrap();
        assert!(matches!(err, DiError::TypeMismatch { .. }));
    }

    #[test]
    fn test_absent_optional() {
        let mut args = Args::new(Key::of::<Service>(), 1);
        args.push("cache", Slot::Absent);
        assert!(args.take_optional::<Config>("cache").unwrap().is_none());
    }

    #[test]
    fn test_recipe_clone_is_identical() {
        let recipe = Recipe::from_fn(|| Config(1)).param::<Service>("service");
        let a = recipe.clone().erase();
        let b = recipe.erase();
        assert!(a.same_as(&b));

        let other = Recipe::from_fn(|| Config(1)).param::<Service>("service").erase();
        assert!(!a.same_as(&other));
    }

    #[test]
    fn test_instance_recipe_shares_value() {
        let recipe = Recipe::instance(Config(3)).erase();
        let mut args = Args::new(Key::of::<Config>(), 0);
        let a = recipe.build(&mut args).unwrap();
        let b = recipe.build(&mut args).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_param_builders() {
        let recipe = Recipe::from_fn(|| Config(0))
            .param::<Service>("service")
            .named("logger")
            .param_or::<u32, _>("retries", || 3)
            .optional::<String>("label");
        let params = recipe.params();
        assert_eq!(params.len(), 4);
        assert_eq!(params[0].annotation(), Some(Key::of::<Service>()));
        assert!(params[1].annotation().is_none());
        assert!(params[2].has_default());
        assert!(params[3].is_optional());
    }
}
