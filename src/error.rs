use std::path::PathBuf;
use std::time::Duration;

/// Failure of a classification call.
///
/// Zero detections is never an error; it is a normal `DetectionResult`
/// with `box_count == 0`.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Input file is unreadable, corrupt, or in a container no decoder accepts.
    #[error("could not decode media {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Model weights are missing or cannot be loaded. Fatal, never retried.
    #[error("detection model unavailable: {0}")]
    ModelUnavailable(String),

    /// The backend accepted the frame but inference failed.
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("inference exceeded {0:?}")]
    Timeout(Duration),

    #[error("i/o error writing annotated output: {0}")]
    Io(#[from] std::io::Error),
}

impl ClassifyError {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that indicate an operational fault rather than a bad upload.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelUnavailable(_))
    }
}

pub type ClassifyResult<T> = std::result::Result<T, ClassifyError>;
