use thiserror::Error;

use crate::pagination::PaginationError;

/// Failures the reader core recovers from locally.
///
/// None of these reach the user as anything other than a fallback page;
/// the session logs them and keeps running.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("content unavailable: {detail}")]
    ContentUnavailable { detail: String },

    #[error("layout is not ready (container has no size yet)")]
    LayoutNotReady,

    #[error("pagination failed: {0}")]
    PaginationFailure(#[from] PaginationError),

    #[error("mounted width {measured:.1}px exceeds predicted {predicted:.1}px")]
    WidthMismatch { measured: f32, predicted: f32 },

    #[error("storage: {0}")]
    Persistence(String),

    #[error("speech: {0}")]
    Speech(String),
}

impl ReaderError {
    pub fn content_unavailable(detail: impl Into<String>) -> Self {
        Self::ContentUnavailable {
            detail: detail.into(),
        }
    }
}
