use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for playbox_core operations
#[derive(Debug, Error)]
pub enum PlayboxError {
    /// Underlying IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was superseded or abandoned via its cancellation token.
    ///
    /// This is not a failure for user-visible purposes; callers can use
    /// [`PlayboxError::is_cancelled`] to tell a stale attempt apart from a
    /// broken one.
    #[error("operation cancelled")]
    Cancelled,

    /// A lazy file's loader failed. The failure is shared between every
    /// caller attached to the same in-flight load, and is never cached.
    #[error("failed to load file '{path}': {source}")]
    FileLoad {
        /// Project-relative path of the file that failed to load.
        path: String,
        /// The loader's failure, shared across attached callers.
        source: Arc<PlayboxError>,
    },

    /// Transient remote-store failure (network/server error during a save or
    /// load). Recovered by retry-with-debounce plus a local safety copy.
    #[error("remote store error: {0}")]
    Remote(String),

    /// Local-store failure. The local store is already the fallback of last
    /// resort, so these are logged and otherwise ignored by the coordinators.
    #[error("local store error: {0}")]
    LocalStore(String),

    /// Malformed or unreadable archive container.
    #[error("archive error: {0}")]
    Archive(String),

    /// A path that is not a normalized project-relative path.
    #[error("invalid project-relative path '{0}'")]
    InvalidPath(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 decode failure in a cached snapshot or archive.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Settings TOML could not be parsed.
    #[error("settings parse error: {0}")]
    SettingsParse(#[from] toml::de::Error),

    /// Settings could not be serialized to TOML.
    #[error("settings serialize error: {0}")]
    SettingsSerialize(#[from] toml::ser::Error),
}

impl PlayboxError {
    /// Whether this error represents cancellation (a superseded or abandoned
    /// operation) rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            PlayboxError::Cancelled => true,
            PlayboxError::FileLoad { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Result type alias for playbox_core operations
pub type Result<T> = std::result::Result<T, PlayboxError>;

/// A serializable representation of PlayboxError for IPC (e.g., the editor shell)
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Whether the error represents cancellation rather than failure
    pub cancelled: bool,
}

impl From<&PlayboxError> for SerializableError {
    fn from(err: &PlayboxError) -> Self {
        let kind = match err {
            PlayboxError::Io(_) => "Io",
            PlayboxError::Cancelled => "Cancelled",
            PlayboxError::FileLoad { .. } => "FileLoad",
            PlayboxError::Remote(_) => "Remote",
            PlayboxError::LocalStore(_) => "LocalStore",
            PlayboxError::Archive(_) => "Archive",
            PlayboxError::InvalidPath(_) => "InvalidPath",
            PlayboxError::Json(_) => "Json",
            PlayboxError::Base64(_) => "Base64",
            PlayboxError::SettingsParse(_) => "SettingsParse",
            PlayboxError::SettingsSerialize(_) => "SettingsSerialize",
        }
        .to_string();

        Self {
            kind,
            message: err.to_string(),
            cancelled: err.is_cancelled(),
        }
    }
}

impl From<PlayboxError> for SerializableError {
    fn from(err: PlayboxError) -> Self {
        SerializableError::from(&err)
    }
}

impl PlayboxError {
    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}
