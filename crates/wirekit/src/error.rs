//! Error types for wire encoding, decoding and snapshot replay.
//!
//! Errors are grouped into categories so the consuming phase can tell a
//! corrupt buffer (fatal) from a lookup that simply found nothing.

use thiserror::Error;

/// Categories of wire errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A value could not be written into the buffer
    Encode,
    /// The buffer is corrupt or truncated
    Decode,
    /// A required snapshot lookup had no match
    NotFound,
    /// The caller asked for something the snapshot cannot answer
    Usage,
}

impl ErrorCategory {
    /// Whether this category must abort the consuming phase.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Decode)
    }

    /// Get a short description of this category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Encode => "encode failure",
            Self::Decode => "corrupt or truncated buffer",
            Self::NotFound => "no matching row",
            Self::Usage => "invalid snapshot request",
        }
    }
}

/// Errors that can occur while writing or replaying a wire buffer.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading ran past the end of the buffer
    #[error("truncated buffer at byte {offset}")]
    Truncated {
        /// Byte offset where the read started
        offset: usize,
    },

    /// A field had a tag other than the one the reader asked for
    #[error("unexpected field at byte {offset}: expected {expected}, found {found:?}")]
    UnexpectedTag {
        /// Byte offset of the field
        offset: usize,
        /// Name of the kind the reader expected
        expected: &'static str,
        /// Tag character actually present
        found: char,
    },

    /// A field payload could not be parsed
    #[error("malformed field at byte {offset}: {message}")]
    Malformed {
        /// Byte offset of the field
        offset: usize,
        /// What was wrong with it
        message: String,
    },

    /// Text already contains one of the private-use escape sentinels
    #[error("text contains reserved codepoint U+{codepoint:04X}")]
    ReservedChar {
        /// Scalar value of the offending character
        codepoint: u32,
    },

    /// A snapshot row does not have the declared number of columns
    #[error("row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        /// Index of the row
        row: usize,
        /// Declared column count
        expected: usize,
        /// Actual column count
        found: usize,
    },

    /// A snapshot declares more columns than the masks can describe
    #[error("snapshot has {columns} columns, at most {max} are supported")]
    TooManyColumns {
        /// Requested column count
        columns: usize,
        /// Maximum supported
        max: usize,
    },

    /// Two snapshots in one buffer share a tag
    #[error("duplicate snapshot tag: {tag}")]
    DuplicateTag {
        /// The repeated tag
        tag: String,
    },

    /// The apply side asked for a snapshot the plan never wrote
    #[error("no snapshot tagged {tag}")]
    MissingSnapshot {
        /// The requested tag
        tag: String,
    },

    /// A keyed lookup was attempted on a column not marked as a lookup key
    #[error("column {column} of snapshot {tag} is not a lookup column")]
    NotLookupColumn {
        /// Snapshot tag
        tag: String,
        /// Column index
        column: usize,
    },

    /// A column index outside the row arity
    #[error("column {column} out of range for snapshot {tag} ({columns} columns)")]
    ColumnOutOfRange {
        /// Snapshot tag
        tag: String,
        /// Requested column
        column: usize,
        /// Row arity
        columns: usize,
    },

    /// A cell did not hold the kind of value the caller needed
    #[error("column {column}: expected {expected}")]
    CellType {
        /// Column index
        column: usize,
        /// Expected kind name
        expected: &'static str,
    },

    /// A required lookup found no matching row
    #[error("{tag}: no row where column {column} = {value}")]
    NotFound {
        /// Snapshot tag
        tag: String,
        /// Lookup column
        column: usize,
        /// Rendered lookup value
        value: String,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Truncated { .. }
            | Error::UnexpectedTag { .. }
            | Error::Malformed { .. }
            | Error::DuplicateTag { .. }
            | Error::MissingSnapshot { .. } => ErrorCategory::Decode,
            Error::ReservedChar { .. } | Error::RaggedRow { .. } | Error::TooManyColumns { .. } => {
                ErrorCategory::Encode
            }
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::NotLookupColumn { .. }
            | Error::ColumnOutOfRange { .. }
            | Error::CellType { .. } => ErrorCategory::Usage,
        }
    }

    /// Whether this error must abort the consuming phase.
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }

    pub(crate) fn malformed(offset: usize, message: impl Into<String>) -> Self {
        Error::Malformed {
            offset,
            message: message.into(),
        }
    }
}

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
