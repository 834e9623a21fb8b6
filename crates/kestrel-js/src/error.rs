//! Errors
//!
//! `ScriptError` is what engines and bindings raise inside a script run.
//! `JsError` is what the host sees from an [`InterpreterContext`](crate::InterpreterContext).

use kestrel_dom::DomError;

/// Error raised inside a script run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    #[error("ReferenceError: {0}")]
    Reference(String),

    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("RangeError: out of memory")]
    OutOfMemory,

    /// Broken host invariant. Never catchable by script.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScriptError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::Range(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether `try`/`catch` in script may intercept this error
    pub fn is_catchable(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    /// Script-visible error name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Type(_) => "TypeError",
            Self::Range(_) | Self::OutOfMemory => "RangeError",
            Self::Reference(_) => "ReferenceError",
            Self::Syntax(_) => "SyntaxError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Message without the name prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Type(m) | Self::Range(m) | Self::Reference(m) | Self::Syntax(m) | Self::Internal(m) => m,
            Self::OutOfMemory => "out of memory",
        }
    }
}

/// Host-facing error
#[derive(Debug, thiserror::Error)]
pub enum JsError {
    /// A script failed with an error it did not catch
    #[error("uncaught {0}")]
    Script(ScriptError),

    /// A host invariant broke; the script run was aborted
    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Dom(#[from] DomError),
}

impl From<ScriptError> for JsError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Internal(message) => JsError::Internal(message),
            other => JsError::Script(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_is_not_catchable() {
        assert!(ScriptError::type_error("x").is_catchable());
        assert!(ScriptError::OutOfMemory.is_catchable());
        assert!(!ScriptError::internal("x").is_catchable());
    }

    #[test]
    fn test_host_mapping() {
        assert!(matches!(JsError::from(ScriptError::internal("boom")), JsError::Internal(m) if m == "boom"));
        assert!(matches!(JsError::from(ScriptError::range_error("r")), JsError::Script(ScriptError::Range(_))));
        assert_eq!(ScriptError::OutOfMemory.name(), "RangeError");
    }
}
