//! Decode-pipeline error type

/// Errors a full scan decode can fail with.
///
/// `MarkersNotFound` is deliberately absent: a failed geometry validation is
/// not a hard error. The pipeline keeps running against a degraded
/// full-frame quad and the caller inspects
/// [`crate::ScanResult::markers_found`] instead of matching an `Err` variant.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Image(#[from] omr_core::OmrError),

    #[error("no question template is registered for {num_questions} questions")]
    TemplateUnknown { num_questions: usize },
}
