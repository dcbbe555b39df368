//! Error types for the host runtime and the native call boundary.

use thiserror::Error;

/// Errors that can occur when converting between Rust and runtime values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The runtime value has the wrong shape for the requested Rust type
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// The handle refers to an object that has already been released
    #[error("stale object handle: object at index {index} has been freed")]
    StaleHandle { index: u32 },

    /// The handle refers to a live object of a different native type
    #[error("handle type mismatch: expected {expected}")]
    HandleTypeMismatch { expected: &'static str },

    /// A table did not carry a required field
    #[error("missing field '{field}'")]
    MissingField { field: &'static str },

    /// Generic conversion failure
    #[error("conversion failed: {message}")]
    Failed { message: String },
}

/// Errors that can occur while calling into native code or the runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeError {
    /// Error converting a result value
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// An argument could not be converted to its declared type
    #[error("bad argument #{position}: {source}")]
    Argument {
        position: usize,
        source: ConversionError,
    },

    /// The call frame holds the wrong number of arguments
    #[error("wrong number of arguments: expected {expected}, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    /// Invalid `this` reference for a method call
    #[error("invalid 'this' reference: {message}")]
    InvalidThis { message: String },

    /// A class value was pushed for a type that was never registered
    #[error("type '{name}' is not a registered class")]
    UnregisteredClass { name: &'static str },

    /// Attempted to call a value that is not a function
    #[error("attempt to call a {type_name} value")]
    NotCallable { type_name: &'static str },

    /// Attempted to index a value that is not a table
    #[error("attempt to index a {type_name} value")]
    NotIndexable { type_name: &'static str },

    /// Attempted to use nil or NaN as a table key
    #[error("invalid table key: {type_name}")]
    InvalidKey { type_name: &'static str },

    /// Nested calls exceeded the configured limit
    #[error("call depth exceeded (limit {limit})")]
    CallDepthExceeded { limit: usize },

    /// Generic native error
    #[error("native error: {message}")]
    Other { message: String },
}

impl NativeError {
    /// Create an "invalid this" error with a message.
    pub fn invalid_this(message: impl Into<String>) -> Self {
        NativeError::InvalidThis {
            message: message.into(),
        }
    }

    /// Create a generic native error.
    pub fn other(message: impl Into<String>) -> Self {
        NativeError::Other {
            message: message.into(),
        }
    }

    /// Attach an argument position to a conversion failure.
    pub fn argument(position: usize, source: ConversionError) -> Self {
        NativeError::Argument { position, source }
    }
}
