//! Error types for script splitting and batch execution.
//!
//! Lexical errors are final. Only a busy/locked target is worth retrying.

use thiserror::Error;

/// Categories of batch errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unterminated comment or quoted literal
    Syntax,
    /// The target was locked by someone else (transient, retryable)
    Busy,
    /// The target rejected a batch
    Execution,
}

impl ErrorCategory {
    /// Whether this error category is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Syntax => "Script syntax error",
            Self::Busy => "Target is busy",
            Self::Execution => "Batch failed",
        }
    }
}

/// Errors that can occur while splitting or running a script.
#[derive(Debug, Error)]
pub enum Error {
    /// A block comment was opened and never closed
    #[error("unterminated block comment starting at byte {start} (scan stopped at byte {offset})")]
    UnterminatedComment {
        /// Byte offset of the opening `/*`
        start: usize,
        /// Byte offset where the scan stopped
        offset: usize,
    },

    /// A quoted literal was opened and never closed
    #[error("unterminated {quote} quote starting at byte {start} (scan stopped at byte {offset})")]
    UnterminatedQuote {
        /// The quote character
        quote: char,
        /// Byte offset of the opening quote
        start: usize,
        /// Byte offset where the scan stopped
        offset: usize,
    },

    /// The target is locked; the batch may succeed later
    #[error("target busy: {message}")]
    Busy {
        /// Details from the executor
        message: String,
    },

    /// The target rejected the batch
    #[error("batch {batch} failed: {message}")]
    Execution {
        /// Zero-based batch index within the script
        batch: usize,
        /// Details from the executor
        message: String,
    },
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnterminatedComment { .. } | Error::UnterminatedQuote { .. } => {
                ErrorCategory::Syntax
            }
            Error::Busy { .. } => ErrorCategory::Busy,
            Error::Execution { .. } => ErrorCategory::Execution,
        }
    }

    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this is a lexical error in the script itself.
    pub fn is_syntax(&self) -> bool {
        self.category() == ErrorCategory::Syntax
    }
}

/// Result type for batch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_busy_is_retryable() {
        assert!(ErrorCategory::Busy.is_retryable());
        assert!(!ErrorCategory::Syntax.is_retryable());
        assert!(!ErrorCategory::Execution.is_retryable());
    }

    #[test]
    fn test_syntax_errors_report_offsets() {
        let err = Error::UnterminatedQuote {
            quote: '\'',
            start: 7,
            offset: 20,
        };
        assert!(err.is_syntax());
        assert_eq!(
            err.to_string(),
            "unterminated ' quote starting at byte 7 (scan stopped at byte 20)"
        );
    }
}
