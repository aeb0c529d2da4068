/// Errors surfaced as values across the preprocessing boundary.
///
/// `MarkersNotFound` deliberately lives in `omr-detect` rather than here: by
/// the time preprocessing finishes, the pipeline always has *a* binary plane
/// to hand the detector, even if it is empty.
#[derive(thiserror::Error, Debug)]
pub enum OmrError {
    #[error("failed to decode image bytes: {0}")]
    InputDecodeError(String),

    #[error("image dimensions too small (width={width}, height={height}, minimum={min})")]
    DimensionError {
        width: usize,
        height: usize,
        min: usize,
    },
}
