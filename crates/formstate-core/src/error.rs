//! Core error types for the formstate workspace.
//!
//! Two kinds of failure exist and they never mix:
//!
//! - [`FieldError`] is a user-facing validation outcome attached to a field
//!   path. It is data, not a fault: it is stored in field metadata and handed
//!   to submit handlers.
//! - [`FormError`] is a fault raised by the controller itself, such as a
//!   reference to an undeclared path or an unreadable configuration file.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The category of a field validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required value is missing.
    Required,
    /// The raw value could not be coerced to the field's type.
    TypeMismatch,
    /// The value has the right type but the wrong shape (e.g. not an email).
    FormatInvalid,
    /// A numeric or length bound was violated.
    OutOfRange,
    /// The value is disallowed or already taken.
    Conflict,
    /// A remote check could not be completed.
    RemoteUnavailable,
}

impl ErrorKind {
    /// Returns a short machine-readable code for this kind.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::TypeMismatch => "type_mismatch",
            Self::FormatInvalid => "format_invalid",
            Self::OutOfRange => "out_of_range",
            Self::Conflict => "conflict",
            Self::RemoteUnavailable => "remote_unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A validation failure for a single field.
///
/// # Examples
///
/// ```
/// use formstate_core::error::{ErrorKind, FieldError};
///
/// let err = FieldError::required("Username is required");
/// assert_eq!(err.kind, ErrorKind::Required);
/// assert_eq!(err.to_string(), "Username is required");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// The failure category.
    pub kind: ErrorKind,
    /// The message shown next to the field.
    pub message: String,
}

impl FieldError {
    /// Creates a new `FieldError` with a kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a [`ErrorKind::Required`] error.
    pub fn required(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Required, message)
    }

    /// Shorthand for a [`ErrorKind::TypeMismatch`] error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    /// Shorthand for a [`ErrorKind::FormatInvalid`] error.
    pub fn format_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FormatInvalid, message)
    }

    /// Shorthand for a [`ErrorKind::OutOfRange`] error.
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfRange, message)
    }

    /// Shorthand for a [`ErrorKind::Conflict`] error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Shorthand for a [`ErrorKind::RemoteUnavailable`] error.
    pub fn remote_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteUnavailable, message)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FieldError {}

/// The fault type for the formstate workspace.
///
/// Variants in the first group are contract violations by the caller and
/// should be fixed in code; the rest are environmental.
#[derive(Error, Debug)]
pub enum FormError {
    // ── Contract violations ──────────────────────────────────────────

    /// The path does not name a field declared in the schema.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// The path string could not be parsed.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A list operation was applied to a path that is not a list.
    #[error("Not a list: {0}")]
    NotAList(String),

    /// A list index does not exist.
    #[error("Index {index} out of range for {path} (len {len})")]
    IndexOutOfRange {
        /// The list path.
        path: String,
        /// The requested index.
        index: usize,
        /// The current list length.
        len: usize,
    },

    /// The controller was mutated before its defaults were loaded.
    #[error("Form is not ready: defaults are still loading")]
    NotReady,

    // ── Environment ──────────────────────────────────────────────────

    /// Default values could not be produced.
    #[error("Defaults error: {0}")]
    Defaults(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FormError {
    /// Returns `true` when this error indicates a programming mistake rather
    /// than an environmental failure.
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::UnknownField(_)
                | Self::InvalidPath(_)
                | Self::NotAList(_)
                | Self::IndexOutOfRange { .. }
                | Self::NotReady
        )
    }
}

/// A convenience type alias for `Result<T, FormError>`.
pub type FormResult<T> = Result<T, FormError>;
