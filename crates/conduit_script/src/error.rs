//! Error types for the script bridge

use rquickjs::convert::Coerced;
use rquickjs::{CaughtError, Ctx, Exception, Value};
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors that can occur while marshaling values or running scripts
#[derive(Debug, Error)]
pub enum ScriptError {
    /// An engine primitive failed while the session was being created
    #[error("failed to initialize script engine: {message}")]
    Initialization { message: String },

    /// Uncaught script-level throw
    #[error("script error: {message}")]
    Execution {
        message: String,
        /// Identifier of the `execute` call that threw, when known
        source_id: Option<u64>,
    },

    /// A bound callable was invoked with the wrong number of arguments
    #[error("'{member}' expects {expected} argument(s), got {actual}")]
    ArgumentCountMismatch {
        member: String,
        expected: usize,
        actual: usize,
    },

    /// A script value cannot be reconciled with the requested host type
    #[error("cannot convert script value into {target}: {message}")]
    Conversion {
        target: &'static str,
        message: String,
    },

    /// The receiver of a bound method is already in use by an outer call
    #[error("'{member}' was called re-entrantly while its receiver is in use")]
    Reentrant { member: String },

    /// The owning session has been disposed
    #[error("script session has been disposed")]
    Disposed,

    #[error(transparent)]
    Engine(#[from] rquickjs::Error),
}

impl ScriptError {
    /// Create an initialization error
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization {
            message: msg.into(),
        }
    }

    /// Create a script execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            source_id: None,
        }
    }

    /// Create a script execution error attributed to an `execute` call
    pub fn execution_in(source_id: u64, msg: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            source_id: Some(source_id),
        }
    }

    /// Create a conversion error for the given host target type
    pub fn conversion(target: &'static str, msg: impl Into<String>) -> Self {
        Self::Conversion {
            target,
            message: msg.into(),
        }
    }

    /// Turn this error into a pending script exception.
    ///
    /// Engine errors pass through untouched: an `Exception` is already pending
    /// and the engine renders the other variants itself.
    pub(crate) fn throw(self, ctx: &Ctx<'_>) -> rquickjs::Error {
        match self {
            ScriptError::Engine(err) => err,
            other => Exception::throw_message(ctx, &other.to_string()),
        }
    }
}

/// Extract a readable message from a caught script throw.
///
/// Prefers the thrown value's `message` property and falls back to its
/// string coercion (e.g. `throw "boom"`).
pub(crate) fn caught_message(caught: CaughtError<'_>) -> String {
    match caught {
        CaughtError::Exception(exception) => exception
            .message()
            .unwrap_or_else(|| exception.to_string()),
        CaughtError::Value(value) => thrown_message(&value),
        CaughtError::Error(err) => err.to_string(),
    }
}

fn thrown_message(value: &Value<'_>) -> String {
    if let Some(message) = value
        .as_object()
        .and_then(|object| object.get::<_, String>("message").ok())
    {
        return message;
    }
    value
        .get::<Coerced<String>>()
        .map(|coerced| coerced.0)
        .unwrap_or_else(|_| "unknown script error".to_string())
}
