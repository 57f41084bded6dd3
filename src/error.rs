use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, UploadError>;

/// Typed error hierarchy for the upload pipeline.
///
/// Every variant is fatal for the current run: the driver stops at the
/// first error and leaves already-recorded submissions committed.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// One or more track names have no playlist mapping.
    #[error("No playlist configured for track(s): {}", .0.join(", "))]
    UnknownTrack(Vec<String>),

    /// The resumable session ran out of chunks without a video resource.
    #[error("Upload of {0} finished without a video id")]
    UploadIncomplete(String),

    #[error("{0}")]
    Other(String),
}

// ── From impls ─────────────────────────────────────────────────────────────

impl From<rusqlite::Error> for UploadError {
    fn from(e: rusqlite::Error) -> Self {
        UploadError::Database(e.to_string())
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(e: serde_json::Error) -> Self {
        UploadError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for UploadError {
    fn from(e: serde_yaml::Error) -> Self {
        UploadError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Http(e.to_string())
    }
}

/// Allows `.map_err(|e| format!("…", e))?` and `ok_or_else(|| format!(…))?`
/// to coerce into UploadError without changing the call sites.
impl From<String> for UploadError {
    fn from(s: String) -> Self {
        UploadError::Other(s)
    }
}

/// Allows `.ok_or("literal string")?` to coerce into UploadError.
impl From<&str> for UploadError {
    fn from(s: &str) -> Self {
        UploadError::Other(s.to_string())
    }
}
