//! Core pixel types, image decoding, and the preprocessing/binarization
//! pipeline shared by the OMR marker detector and bubble decoder.
//!
//! This crate is intentionally narrow: it owns pixel buffers and turns raw
//! or encoded image bytes into the grayscale/binary planes the detector
//! needs. It does not know about fiducial markers, templates, or bubbles.

mod error;
mod geom;
mod logger;
mod pixel_image;
mod preprocess;

pub use error::OmrError;
pub use geom::{sample_bilinear, sample_bilinear_u8};
pub use logger::init_with_level;
pub use pixel_image::{Channels, PixelImage};
pub use preprocess::{
    adaptive_threshold, camera_auto_crop, contrast_stretch_unsharp, grayscale,
    otsu_threshold, subtract_background, BinaryPlane, PreprocessParams,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

/// Minimum accepted width/height, in pixels, for any decode (§7 DimensionError).
pub const MIN_DIMENSION: usize = 200;
