//! Fiducial marker detection, temporal stabilization, template registry,
//! coordinate mapping, and bubble decoding for the OMR engine.
//!
//! Built on top of `omr-core`'s pixel planes; knows nothing about PDF
//! rendering or the CLI surface, which live one layer up in `omr-render`
//! and `omr`.

mod bubble;
mod decode;
mod error;
mod mapper;
mod marker_detector;
mod quad;
mod scan_result;
mod stabilizer;
mod template;

pub use bubble::{
    adaptive_threshold, adaptive_threshold_with_params, decode_answer_row,
    decode_answer_row_with_params, decode_id_column, decode_id_column_with_params, sample_bubble,
    sample_bubble_with_params, AnswerMark, BubbleKind, BubbleSample, BubbleSampleParams,
    Estimator,
};
pub use decode::{decode, DecodeOptions};
pub use error::DecodeError;
pub use mapper::CoordinateMapper;
pub use marker_detector::{detect_markers, detect_markers_with_params, MarkerDetectParams};
pub use quad::MarkerQuad;
pub use scan_result::{BubbleDebug, ScanResult, Source};
pub use stabilizer::{StabilizerParams, StabilizerState, DEADZONE, LOCK_THRESHOLD, SMOOTH};
pub use template::{
    layout_for, AnswerBlock, IdGridLayout, TemplateLayout, FRAME_HEIGHT_MM, FRAME_WIDTH_MM,
    MARKER_INSET_MM, PAGE_HEIGHT_MM, PAGE_WIDTH_MM,
};
