use thiserror::Error;

/// Errors that can occur during Property access on a replicated object
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    /// Property name is not part of the kind's declared schema
    #[error("Property '{property}' is not declared on kind '{alias_name}'. Only declared properties are tracked")]
    UnknownProperty {
        alias_name: &'static str,
        property: String,
    },
}

/// Errors that can occur while registering or constructing object kinds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KindError {
    /// No factory registered for the type tag
    #[error("Kind '{alias_name}' not registered. Must call `register_kind()` during startup")]
    KindNotRegistered { alias_name: String },

    /// A factory for the type tag already exists
    #[error("Kind '{alias_name}' already registered")]
    KindAlreadyRegistered { alias_name: &'static str },

    /// Schema declares more properties than a diff mask can address
    #[error("Kind '{alias_name}' declares {count} properties, at most {max} are supported")]
    TooManyProperties {
        alias_name: &'static str,
        count: usize,
        max: usize,
    },

    /// Factory produced an object whose type tag differs from the one requested
    #[error("Factory for '{expected}' produced an object of kind '{actual}'")]
    FactoryMismatch {
        expected: String,
        actual: &'static str,
    },
}
