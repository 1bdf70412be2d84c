use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};

use crate::{CodecError, ImageCodec};

/// JPEG codec backed by the `image` crate, RGB8 in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl ImageCodec for JpegCodec {
    type Image = RgbImage;

    fn encode(&self, image: &RgbImage, quality: u8) -> Result<Vec<u8>, CodecError> {
        let quality = quality.clamp(1, 100);
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder
            .encode(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(out)
    }

    fn decode(&self, data: &[u8]) -> Result<RgbImage, CodecError> {
        image::load_from_memory(data)
            .map(|img| img.to_rgb8())
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn dimensions(&self, image: &RgbImage) -> (u32, u32) {
        image.dimensions()
    }
}
