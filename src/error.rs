//! Unified error type for the visibility engine and its command handlers.
//!
//! `AppError` is the single error type returned by every command handler.
//! It serializes as `{ "kind": "...", "message": "..." }` so the presentation
//! layer can programmatically distinguish error categories.

use serde::ser::SerializeStruct;

/// Application-level error returned by all command handlers.
///
/// Each variant maps to a distinct failure domain. The presentation layer
/// receives a JSON object with `kind` (variant name) and `message`
/// (human-readable description).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Errors originating from SQLite / preference persistence.
    #[error("{0}")]
    Database(String),

    /// A privileged write was attempted without the elevated privilege.
    #[error("{0}")]
    PermissionDenied(String),

    /// Privilege is present but the platform write call failed.
    #[error("{0}")]
    Write(String),

    /// A network sample failed or its read permission is missing.
    /// Never leaves the observer; resolved to a fallback value there.
    #[error("{0}")]
    ObserverUnavailable(String),

    /// I/O and OS-level errors (process spawning, filesystem).
    #[error("{0}")]
    Io(String),

    /// Invalid or missing user input.
    #[error("{0}")]
    InvalidInput(String),
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "Database",
            AppError::PermissionDenied(_) => "PermissionDenied",
            AppError::Write(_) => "Write",
            AppError::ObserverUnavailable(_) => "ObserverUnavailable",
            AppError::Io(_) => "Io",
            AppError::InvalidInput(_) => "InvalidInput",
        }
    }

    /// Whether this error means the write privilege is gone.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AppError::PermissionDenied(_))
    }
}

/// Custom Serialize: produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

// ---- From implementations for ergonomic error conversion ----

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
