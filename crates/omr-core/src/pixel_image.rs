use crate::error::OmrError;
use crate::MIN_DIMENSION;

/// Pixel layout of a [`PixelImage`]'s buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channels {
    /// Interleaved 8-bit R, G, B, A.
    Rgba,
    /// Single 8-bit luma plane.
    Gray,
    /// Single 8-bit-per-pixel plane, 0 or 1 (see [`crate::BinaryPlane`] for
    /// the packed form used internally by the threshold stage).
    Binary,
}

impl Channels {
    fn count(self) -> usize {
        match self {
            Channels::Rgba => 4,
            Channels::Gray | Channels::Binary => 1,
        }
    }
}

/// Owns a raw pixel buffer with explicit width/height/channel layout.
///
/// Immutable once constructed: every preprocessing step that transforms an
/// image produces a new `PixelImage` rather than mutating in place, so a
/// decode call never observes a half-transformed buffer.
#[derive(Clone, Debug)]
pub struct PixelImage {
    pub width: usize,
    pub height: usize,
    pub channels: Channels,
    pub data: Vec<u8>,
}

impl PixelImage {
    /// Build a `PixelImage` from a raw buffer, validating the length invariant.
    pub fn from_raw(
        width: usize,
        height: usize,
        channels: Channels,
        data: Vec<u8>,
    ) -> Result<Self, OmrError> {
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(OmrError::DimensionError {
                width,
                height,
                min: MIN_DIMENSION,
            });
        }
        let expected = width * height * channels.count();
        if data.len() != expected {
            return Err(OmrError::InputDecodeError(format!(
                "buffer length {} does not match {}x{}x{}",
                data.len(),
                width,
                height,
                channels.count()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Decode a PNG/JPEG (or any format the `image` crate understands) byte
    /// stream into an RGBA `PixelImage`.
    pub fn from_encoded_bytes(bytes: &[u8]) -> Result<Self, OmrError> {
        let dyn_img = image::load_from_memory(bytes)
            .map_err(|err| OmrError::InputDecodeError(err.to_string()))?;
        let rgba = dyn_img.to_rgba8();
        let (width, height) = (rgba.width() as usize, rgba.height() as usize);
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(OmrError::DimensionError {
                width,
                height,
                min: MIN_DIMENSION,
            });
        }
        Ok(Self {
            width,
            height,
            channels: Channels::Rgba,
            data: rgba.into_raw(),
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> u8 {
        let stride = self.channels.count();
        self.data[(y * self.width + x) * stride + c]
    }
}
