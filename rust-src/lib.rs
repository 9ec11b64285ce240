// lib.rs - 🚀 Memory Safe 🚀 OMR answer-sheet decoding pipeline
//
// raw bytes → decoded raster → (gray, mask) → bubble contours → question
// lattice → per-bubble fill states → per-question marks → scored report.
// Every stage is pure over its inputs; nothing is shared across requests.

use tracing::info;

pub mod config;
pub mod detect;
pub mod error;
pub mod fill;
pub mod geometry;
pub mod group;
pub mod preprocess;
pub mod resolve;
pub mod score;

pub use config::DetectionConfig;
pub use detect::{detect_bubbles, Candidate};
pub use error::OmrError;
pub use fill::{analyze_fill, BubbleState};
pub use group::{group_bubbles, Row};
pub use preprocess::{preprocess, Preprocessed};
pub use resolve::{detect_marked_bubbles, resolve_row, MarkOutcome};
pub use score::{score_answers, AnswerKey, AnswerKeyError, SheetReport};

/// Decode one scanned answer sheet and score it against the key.
///
/// The number of questions is the key length; callers validate the key
/// against their exam definition before invoking this. The student id is
/// carried through into the report untouched.
pub fn decode_sheet(
    image_bytes: &[u8],
    key: &AnswerKey,
    student_id: &str,
) -> Result<SheetReport, OmrError> {
    decode_sheet_with_config(image_bytes, key, student_id, &DetectionConfig::default())
}

/// As [`decode_sheet`], with explicit detection parameters.
pub fn decode_sheet_with_config(
    image_bytes: &[u8],
    key: &AnswerKey,
    student_id: &str,
    config: &DetectionConfig,
) -> Result<SheetReport, OmrError> {
    let num_questions = key.len();
    info!(
        "Processing OMR image for student {} with {} questions",
        student_id, num_questions
    );

    let image =
        image::load_from_memory(image_bytes).map_err(|e| OmrError::InvalidImage(e.to_string()))?;
    info!(
        "Image loaded - Dimensions: {}x{}",
        image.width(),
        image.height()
    );

    let pre = preprocess::preprocess(&image);

    let candidates = detect::detect_bubbles(&pre.mask, &pre.gray, config);
    if candidates.is_empty() {
        return Err(OmrError::NoBubblesDetected);
    }
    info!("Detected {} bubble contours", candidates.len());

    let rows = group::group_bubbles(candidates, num_questions, config);
    if rows.is_empty() {
        return Err(OmrError::NoRowsDetected);
    }
    info!("Organized {} question rows", rows.len());

    let outcomes = resolve::detect_marked_bubbles(&pre.gray, &rows, num_questions, config);
    let report = score::score_answers(&outcomes, key, student_id);

    info!("OMR processing completed for student {}", student_id);
    Ok(report)
}
