//! Error types for planning and applying.
//!
//! Step failures come back from collaborators as `anyhow::Error`; the
//! executor folds them into [`EngineError`] so the caller can tell a store
//! rejection from a broken script or a corrupt plan.

use thiserror::Error;

/// Categories of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The plan buffer is corrupt, truncated or cannot be turned into steps
    Decode,
    /// A required lookup found nothing
    NotFound,
    /// A collaborator or the store rejected a write
    Store,
    /// A SQL script has an unterminated comment or quote
    ScriptSyntax,
    /// A collaborator could not read its declarative source
    Read,
    /// A value could not be written into the plan
    Encode,
    /// The operation was cancelled or stopped
    Interrupted,
}

impl ErrorCategory {
    /// Whether nothing in the buffer can be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Decode)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Decode => "Corrupt plan",
            Self::NotFound => "Required entry not found",
            Self::Store => "Write rejected",
            Self::ScriptSyntax => "Script syntax error",
            Self::Read => "Source could not be read",
            Self::Encode => "Plan could not be written",
            Self::Interrupted => "Interrupted",
        }
    }
}

/// Errors that can occur during PLAN or APPLY.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The wire buffer could not be decoded
    #[error("decode failed: {0}")]
    Decode(#[source] wirekit::Error),

    /// A required snapshot lookup missed
    #[error(transparent)]
    NotFound(wirekit::Error),

    /// A value could not be encoded into the plan
    #[error("encode failed: {0}")]
    Encode(#[source] wirekit::Error),

    /// A work item could not be turned into a step
    #[error("cannot prepare {action}: {message}")]
    Prepare { action: String, message: String },

    /// A step was rejected by a collaborator or the store
    #[error("{action}: {key}: {message}")]
    Store {
        action: String,
        key: String,
        message: String,
    },

    /// A script carried by a step does not split cleanly
    #[error("{action}: {key}: {source}")]
    ScriptSyntax {
        action: String,
        key: String,
        #[source]
        source: sqlbatch::Error,
    },

    /// A collaborator failed to read its entities
    #[error("{kind}: read failed: {message}")]
    Read { kind: String, message: String },

    /// A queued action id has no registered handler
    #[error("unknown action: {action}")]
    UnknownAction { action: String },

    /// PLAN was cancelled between kinds
    #[error("planning cancelled")]
    Cancelled,

    /// APPLY honored a stop request between items
    #[error("stop requested")]
    Stopped,
}

impl EngineError {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Decode(_) | Self::Prepare { .. } | Self::UnknownAction { .. } => {
                ErrorCategory::Decode
            }
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Encode(_) => ErrorCategory::Encode,
            Self::Store { .. } => ErrorCategory::Store,
            Self::ScriptSyntax { .. } => ErrorCategory::ScriptSyntax,
            Self::Read { .. } => ErrorCategory::Read,
            Self::Cancelled | Self::Stopped => ErrorCategory::Interrupted,
        }
    }

    /// Whether the plan buffer itself is at fault.
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }

    /// Fold a failed step into an engine error.
    ///
    /// Engine and wire errors raised inside a collaborator keep their
    /// category; script syntax errors are recognized by downcasting.
    pub fn from_step(action: &str, key: &str, err: anyhow::Error) -> Self {
        let err = match err.downcast::<EngineError>() {
            Ok(engine) => return engine,
            Err(other) => other,
        };
        let err = match err.downcast::<wirekit::Error>() {
            Ok(wire) => return wire.into(),
            Err(other) => other,
        };
        match err.downcast::<sqlbatch::Error>() {
            Ok(source) if source.is_syntax() => Self::ScriptSyntax {
                action: action.to_string(),
                key: key.to_string(),
                source,
            },
            Ok(other) => Self::Store {
                action: action.to_string(),
                key: key.to_string(),
                message: other.to_string(),
            },
            Err(other) => Self::Store {
                action: action.to_string(),
                key: key.to_string(),
                message: format!("{other:#}"),
            },
        }
    }

    /// Fold a failed reconstruction into an engine error.
    pub fn from_prepare(action: &str, err: anyhow::Error) -> Self {
        let err = match err.downcast::<EngineError>() {
            Ok(engine) => return engine,
            Err(other) => other,
        };
        match err.downcast::<wirekit::Error>() {
            Ok(wire) => wire.into(),
            Err(other) => Self::Prepare {
                action: action.to_string(),
                message: format!("{other:#}"),
            },
        }
    }
}

impl From<wirekit::Error> for EngineError {
    fn from(err: wirekit::Error) -> Self {
        match err.category() {
            wirekit::ErrorCategory::NotFound => Self::NotFound(err),
            wirekit::ErrorCategory::Encode => Self::Encode(err),
            wirekit::ErrorCategory::Decode | wirekit::ErrorCategory::Usage => Self::Decode(err),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = EngineError::from_step(
            "setting.install",
            "web/port",
            anyhow::anyhow!("store is read-only"),
        );
        assert_eq!(err.category(), ErrorCategory::Store);
        assert_eq!(err.to_string(), "setting.install: web/port: store is read-only");
    }

    #[test]
    fn test_script_syntax_is_recognized() {
        let source = sqlbatch::Error::UnterminatedQuote {
            quote: '\'',
            start: 3,
            offset: 9,
        };
        let err = EngineError::from_step("sql_script.install", "schema", source.into());
        assert_eq!(err.category(), ErrorCategory::ScriptSyntax);
        assert!(err.to_string().starts_with("sql_script.install: schema: unterminated"));
    }

    #[test]
    fn test_exhausted_retry_is_a_store_failure() {
        let source = sqlbatch::Error::Busy {
            message: "locked".into(),
        };
        let err = EngineError::from_step("sql_script.install", "schema", source.into());
        assert_eq!(err.category(), ErrorCategory::Store);
    }

    #[test]
    fn test_wire_errors_keep_their_category() {
        let miss = wirekit::Error::NotFound {
            tag: "user".into(),
            column: 0,
            value: "bob".into(),
        };
        let err = EngineError::from_step("user.install", "bob", miss.into());
        assert_eq!(err.category(), ErrorCategory::NotFound);

        let corrupt: EngineError = wirekit::Error::Truncated { offset: 4 }.into();
        assert!(corrupt.is_fatal());
    }

    #[test]
    fn test_interruptions() {
        assert_eq!(EngineError::Cancelled.category(), ErrorCategory::Interrupted);
        assert_eq!(EngineError::Stopped.category(), ErrorCategory::Interrupted);
        assert!(!EngineError::Stopped.is_fatal());
    }
}
