//! Runtime error taxonomy.
//!
//! Only two errors are produced by the dispatch machinery itself: a method
//! that cannot be found (and has no fallback) and a method that exists but
//! is not visible from the calling context. Everything else here is raised
//! by callables and flows through dispatch unmodified.

use std::fmt;

use crate::symbol::SymbolId;

/// Result alias used across the runtime.
pub type GarnetResult<T> = Result<T, GarnetError>;

/// A language-level error.
#[derive(Debug, Clone, PartialEq)]
pub enum GarnetError {
    /// No method with this name and no missing-method fallback.
    NoMethod { name: SymbolId, receiver: String },

    /// Method exists but is not callable from the current context.
    Visibility {
        name: SymbolId,
        receiver: String,
        visibility: &'static str,
    },

    /// Wrong argument shape or count.
    Argument { message: String },

    /// Operation not supported for the value's type.
    Type { message: String },

    /// Error raised explicitly by a callable.
    Exception { message: String },
}

impl GarnetError {
    pub fn no_method(name: SymbolId, receiver: impl Into<String>) -> Self {
        GarnetError::NoMethod {
            name,
            receiver: receiver.into(),
        }
    }

    pub fn visibility(name: SymbolId, receiver: impl Into<String>, visibility: &'static str) -> Self {
        GarnetError::Visibility {
            name,
            receiver: receiver.into(),
            visibility,
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        GarnetError::Argument {
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        GarnetError::Type {
            message: message.into(),
        }
    }

    pub fn exception(message: impl Into<String>) -> Self {
        GarnetError::Exception {
            message: message.into(),
        }
    }

    /// True for the not-found fatal case.
    #[inline]
    pub fn is_no_method(&self) -> bool {
        matches!(self, GarnetError::NoMethod { .. })
    }

    /// True for the visibility fatal case.
    #[inline]
    pub fn is_visibility(&self) -> bool {
        matches!(self, GarnetError::Visibility { .. })
    }
}

impl fmt::Display for GarnetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GarnetError::NoMethod { name, receiver } => {
                write!(f, "undefined method '{}' for {}", name, receiver)
            }
            GarnetError::Visibility {
                name,
                receiver,
                visibility,
            } => {
                write!(f, "{} method '{}' called for {}", visibility, name, receiver)
            }
            GarnetError::Argument { message } => write!(f, "argument error: {}", message),
            GarnetError::Type { message } => write!(f, "type error: {}", message),
            GarnetError::Exception { message } => write!(f, "exception: {}", message),
        }
    }
}

impl std::error::Error for GarnetError {}

// =============================================================================
// Tests
// =============================================================================
