//! Facade crate re-exporting the OMR engine's three layers so downstream
//! crates (and this crate's own CLI) depend on one name instead of three.

pub use omr_core::{
    adaptive_threshold as binarize, camera_auto_crop, contrast_stretch_unsharp, grayscale,
    otsu_threshold, subtract_background, BinaryPlane, Channels, OmrError, PixelImage,
    PreprocessParams, MIN_DIMENSION,
};

pub use omr_detect::{
    decode, layout_for, AnswerBlock, AnswerMark, BubbleDebug, BubbleKind, BubbleSampleParams,
    CoordinateMapper, DecodeError, DecodeOptions, IdGridLayout, MarkerDetectParams, MarkerQuad,
    ScanResult, Source, StabilizerParams, StabilizerState, TemplateLayout,
};

pub use omr_render::{render, RenderError, SheetRequest};
