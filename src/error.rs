//! Error types for the binding core.

use thiserror::Error;

/// Errors that can occur when converting between Rust and VM values.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Type mismatch during conversion
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Integer overflow during conversion
    #[error("integer overflow: value {value} does not fit in {target_type}")]
    IntegerOverflow { value: i64, target_type: &'static str },
}

/// VM-level errors raised while a trampoline executes.
///
/// These abort the current call before (or instead of) invoking the native
/// callable and are recoverable by the script caller. They never unwind
/// through native code.
#[derive(Debug, Error)]
pub enum VmError {
    /// A stack value could not convert to the declared parameter type.
    #[error("bad argument #{pos}: {source}")]
    BadArgument {
        pos: usize,
        source: ConversionError,
    },

    /// The receiver slot did not hold a wrapped instance of the expected type.
    #[error("bad receiver at slot {pos}: expected {expected}, got {actual}")]
    BadReceiver {
        pos: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// The type was finalized without a constructor.
    #[error("'{type_name}' cannot be called")]
    NotConstructible { type_name: String },

    /// Method lookup failed on the type and its whole base chain.
    #[error("no method '{method}' on type '{type_name}'")]
    UnknownMethod { type_name: String, method: String },

    /// No global function registered under this name.
    #[error("unknown global function '{0}'")]
    UnknownGlobal(String),

    /// No type registered under this name.
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// Stack position outside the current frame.
    #[error("stack slot {0} out of range")]
    InvalidSlot(usize),

    /// The wrapped object behind a handle has already been destroyed.
    #[error("stale object handle")]
    StaleHandle,

    /// Error raised explicitly by a native callable via [`crate::Vm::raise_error`].
    #[error("{0}")]
    Script(String),
}

/// Errors in registration code.
///
/// These indicate a programming error in the embedder's registration
/// sequence, surfaced at registration or build time, never during script
/// execution.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    #[error("method '{method}' is already registered on type '{type_name}'")]
    DuplicateMethod { type_name: String, method: String },

    #[error("global function '{0}' is already registered")]
    DuplicateGlobal(String),

    #[error("type '{type_name}' lists unknown base '{base}'")]
    UnknownBase { type_name: String, base: String },

    #[error("base chain of type '{0}' forms a cycle")]
    BaseCycle(String),

    #[error("extension target type '{0}' is not registered")]
    UnknownExtensionTarget(String),
}
