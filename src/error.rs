use thiserror::Error;

/// Cueline's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Cueline's crate-wide error type.
///
/// The taxonomy mirrors how failures propagate through a run:
/// - `MediaRead` and `ModelUnavailable` are fatal and abort the run.
/// - `SliceTranscription` is local to one slice; the dispatcher records it on
///   the affected job record and continues.
/// - `StoreCorruption` is recoverable; the store treats the record as pending
///   and the slice is re-derived.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// The input media could not be opened, probed, or decoded.
    #[error("failed to read media: {0}")]
    MediaRead(String),

    /// A VAD or transcription model could not be loaded.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Transcribing a single slice failed. The run continues past this.
    #[error("transcription of slice {index} failed: {reason}")]
    SliceTranscription { index: usize, reason: String },

    /// A persisted job record was unreadable or inconsistent.
    #[error("job store record {index} is corrupt: {reason}")]
    StoreCorruption { index: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Whether this error should abort the whole run rather than a single slice.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MediaRead(_) | Self::ModelUnavailable(_))
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Self::Message(format!("wav error: {err}"))
    }
}
