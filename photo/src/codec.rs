//! Image decoding and encoding at the pipeline boundary.

use crate::{Result, StitchError};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Decodes an encoded image into 8-bit RGB; gray inputs are expanded to
/// three equal channels and alpha is dropped.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(StitchError::Input("image data is empty".into()));
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| StitchError::Input(format!("cannot decode image: {e}")))?;
    let rgb = decoded.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(StitchError::Input(format!(
            "decoded image is {}x{}",
            rgb.width(),
            rgb.height()
        )));
    }
    Ok(rgb)
}

pub fn load_image(path: impl AsRef<Path>) -> Result<RgbImage> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| StitchError::Input(format!("cannot read {}: {e}", path.display())))?;
    decode_image(&bytes)
}

pub fn encode_image(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, format)
        .map_err(|e| StitchError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}
