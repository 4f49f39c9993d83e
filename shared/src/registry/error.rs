use thiserror::Error;

use crate::KindError;

/// Errors that can occur during ObjectRegistry operations
///
/// None of these are raised for routine absence: lookups return `Option`.
/// They describe inbound contexts the registry refused, or misuse of the
/// tree API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Inbound context names a type tag with no registered factory
    #[error("No kind registered for '{alias_name}', context for {identifier} dropped")]
    UnknownAlias {
        identifier: String,
        alias_name: String,
    },

    /// Context type tag differs from the registered object's kind
    #[error("Object {identifier} is a '{expected}', refusing context of kind '{actual}'")]
    AliasMismatch {
        identifier: String,
        expected: &'static str,
        actual: String,
    },

    /// Registered object is not the concrete type requested
    #[error("Object {identifier} of kind '{alias_name}' is not the requested type")]
    KindMismatch {
        identifier: String,
        alias_name: &'static str,
    },

    /// Identifier was destroyed and may not come back
    #[error("Object {identifier} was destroyed")]
    Destroyed { identifier: String },

    /// Identifier is not registered
    #[error("Object {identifier} not found in registry")]
    ObjectNotFound { identifier: String },

    /// Attaching would make an object its own ancestor
    #[error("Cannot attach {child} under {parent}: {child} is an ancestor of {parent}")]
    CycleDetected { parent: String, child: String },

    /// Object is currently borrowed elsewhere on this thread
    #[error("Object {identifier} is already borrowed on current thread")]
    ObjectBusy { identifier: String },

    #[error(transparent)]
    Kind(#[from] KindError),
}
