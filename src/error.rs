//! Error types for dependency injection

use crate::{Key, Lifecycle};
use thiserror::Error;

/// Errors that can occur during dependency injection operations
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No record exists for the requested key
    #[error("Service not registered: {}", .key.type_name())]
    NotRegistered { key: Key },

    /// The key is already registered with a different recipe or lifecycle
    #[error(
        "Service already registered with a different recipe: {} (registered as {existing}, requested {requested})",
        .key.type_name()
    )]
    DuplicateRegistration {
        key: Key,
        existing: Lifecycle,
        requested: Lifecycle,
    },

    /// A constructor parameter could not be matched to any registered key
    #[error(
        "Could not resolve parameter `{param}` of {}. Missing dependencies: {}",
        .service.simple_name(),
        .candidates.join(", ")
    )]
    DependencyResolution {
        service: Key,
        param: String,
        candidates: Vec<String>,
    },

    /// A cycle re-entered a construction before any instance could be cached
    #[error("Circular dependency detected: {}", fmt_chain(.chain))]
    CircularDependency { chain: Vec<Key> },

    /// The delayed resolution behind a deferred reference failed
    #[error("Deferred reference to {} could not be resolved: {source}", .key.simple_name())]
    UnresolvableReference { key: Key, source: Box<DiError> },

    /// A recipe reported a failure while building its instance
    #[error("Failed to create service {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// A recipe asked for a parameter it never declared (or took it twice)
    #[error("Parameter `{param}` is not available in the recipe for {}", .service.simple_name())]
    UndeclaredParameter { service: Key, param: String },

    /// A parameter slot holds a different type than the one requested
    #[error("Parameter `{param}` does not hold a {expected}")]
    TypeMismatch {
        param: String,
        expected: &'static str,
    },

    /// The container behind a deferred reference no longer exists
    #[error("Container has been dropped")]
    ContainerDropped,
}

fn fmt_chain(chain: &[Key]) -> String {
    chain
        .iter()
        .map(|key| key.simple_name())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl DiError {
    /// Create a NotRegistered error for a key
    #[inline]
    pub fn not_registered(key: Key) -> Self {
        Self::NotRegistered { key }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed<T: 'static>(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Create a CircularDependency error
    #[inline]
    pub fn circular(chain: Vec<Key>) -> Self {
        Self::CircularDependency { chain }
    }

    /// Wrap a failure of a deferred reference's delayed resolution
    #[inline]
    pub fn unresolvable(key: Key, source: DiError) -> Self {
        Self::UnresolvableReference {
            key,
            source: Box::new(source),
        }
    }

    /// Create a TypeMismatch error
    #[inline]
    pub fn type_mismatch<T: 'static>(param: impl Into<String>) -> Self {
        Self::TypeMismatch {
            param: param.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// The key this error is about, when there is one
    pub fn key(&self) -> Option<Key> {
        match self {
            Self::NotRegistered { key }
            | Self::DuplicateRegistration { key, .. }
            | Self::UnresolvableReference { key, .. } => Some(*key),
            Self::DependencyResolution { service, .. } | Self::UndeclaredParameter { service, .. } => {
                Some(*service)
            }
            Self::CircularDependency { chain } => chain.first().copied(),
            Self::CreationFailed { .. } | Self::TypeMismatch { .. } | Self::ContainerDropped => None,
        }
    }

    /// Whether this error (or the failure behind a deferred reference) is a cycle
    pub fn is_circular(&self) -> bool {
        match self {
            Self::CircularDependency { .. } => true,
            Self::UnresolvableReference { source, .. } => source.is_circular(),
            _ => false,
        }
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
