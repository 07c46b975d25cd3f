//! Error types for the cluster scheduling engine.
//!
//! Errors are split by origin: configuration problems detected before the
//! pipeline runs, and internal invariant violations raised by passes. A
//! failure inside a pipeline pass is wrapped with the pass name so the
//! user sees which transformation broke and why.

use thiserror::Error;
use std::fmt;

/// Top-level error type for the compiler core.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Invalid pipeline configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Broken internal invariant (a bug in a pass, not a user error)
    #[error("Internal error: {0}")]
    Internal(#[from] InternalError),

    /// Failure raised while running a named pass
    #[error("Pass `{pass}` failed: {source}")]
    Pass {
        /// Name of the failing pass
        pass: String,
        /// The underlying failure
        #[source]
        source: Box<CompileError>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON input
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompileError {
    /// Attach the name of the pass that produced this error.
    pub fn in_pass(self, pass: impl Into<String>) -> Self {
        CompileError::Pass { pass: pass.into(), source: Box::new(self) }
    }

    /// Shorthand for an internal invariant violation.
    pub fn internal(kind: InternalErrorKind, message: impl Into<String>) -> Self {
        CompileError::Internal(InternalError { kind, message: message.into() })
    }

    /// Shorthand for a configuration error.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        CompileError::Config(ConfigError { kind, message: message.into() })
    }

    /// The internal error kind, looking through pass wrappers.
    pub fn internal_kind(&self) -> Option<InternalErrorKind> {
        match self {
            CompileError::Internal(e) => Some(e.kind),
            CompileError::Pass { source, .. } => source.internal_kind(),
            _ => None,
        }
    }

    /// The configuration error kind, if any.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            CompileError::Config(e) => Some(e.kind),
            CompileError::Pass { source, .. } => source.config_kind(),
            _ => None,
        }
    }
}

/// Error in the user-supplied pipeline configuration.
#[derive(Error, Debug, Clone)]
pub struct ConfigError {
    /// The kind of configuration error
    pub kind: ConfigErrorKind,
    /// The error message
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A pass name that no registered pass answers to
    UnknownPass,
    /// Unusable blocking depth
    InvalidBlockLevels,
    /// Block shape with bad entries, or not an exact divisor when required
    InvalidBlockShape,
    /// Empty or malformed pass-selection mode
    InvalidMode,
}

/// Violation of an invariant the passes rely on.
#[derive(Error, Debug, Clone)]
pub struct InternalError {
    /// The kind of invariant violated
    pub kind: InternalErrorKind,
    /// The error message
    pub message: String,
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalErrorKind {
    /// A queue was driven without overriding its callback
    CallbackNotImplemented,
    /// Two intervals over different dimensions were combined
    DimensionMismatch,
    /// Several clusters share a prefix where exactly one was expected
    ImperfectNest,
    /// Two symbolic bounds could not be ordered
    IncomparableBounds,
    /// Nesting relations contain a cycle
    CyclicRelations,
    /// A dimension has no interval in the space being rewritten
    MissingInterval,
    /// Spaces cannot be merged (e.g. conflicting directions)
    IncompatibleSpaces,
}

/// Result type using CompileError.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompileError::internal(
            InternalErrorKind::ImperfectNest,
            "2 clusters share prefix [x]",
        )
        .in_pass("interchange");
        let s = format!("{}", err);
        assert!(s.contains("interchange"));
        assert!(s.contains("2 clusters share prefix"));
        assert_eq!(err.internal_kind(), Some(InternalErrorKind::ImperfectNest));
    }

    #[test]
    fn test_config_kind() {
        let err = CompileError::config(ConfigErrorKind::UnknownPass, "unknown pass `foo`");
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownPass));
        assert_eq!(err.internal_kind(), None);
    }
}
