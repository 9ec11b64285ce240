// error.rs - 🚀 Memory Safe Error Types 🚀

use thiserror::Error;

/// Pipeline failures surfaced to callers. Each stage aborts the request on
/// its first hard error; partial results are never returned.
#[derive(Debug, Error)]
pub enum OmrError {
    /// The uploaded bytes could not be decoded as an image.
    #[error("could not decode image: {0}")]
    InvalidImage(String),

    /// Detection produced zero candidate bubble contours.
    #[error("no bubble contours detected, check image quality and parameters")]
    NoBubblesDetected,

    /// Grouping produced zero question rows.
    #[error("no structured rows detected, check bubble grouping parameters")]
    NoRowsDetected,

    /// Anything else that went wrong inside the pipeline.
    #[error("internal processing error: {0}")]
    Internal(String),
}
