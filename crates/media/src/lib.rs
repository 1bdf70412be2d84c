//! Image codec seam.
//!
//! Encoding and decoding is an external collaborator as far as the session
//! engines are concerned: both are generic over [`ImageCodec`] and only
//! ever see opaque image values. [`JpegCodec`] is the default
//! implementation; per-frame codec failures are non-fatal by contract —
//! callers log and skip the offending frame.

mod jpeg;

pub use jpeg::JpegCodec;

/// Errors from image encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Converts between in-memory images and compressed frame bytes.
pub trait ImageCodec: Send + Sync + 'static {
    /// Decoded image type. Opaque to the session engines.
    type Image: Send + Sync + 'static;

    /// Encodes an image at the given quality (1..=100).
    fn encode(&self, image: &Self::Image, quality: u8) -> Result<Vec<u8>, CodecError>;

    /// Decodes compressed frame bytes into an image.
    fn decode(&self, data: &[u8]) -> Result<Self::Image, CodecError>;

    /// Pixel dimensions of a decoded image.
    fn dimensions(&self, image: &Self::Image) -> (u32, u32);
}
