//! Feature detection, description and matching.
//!
//! Everything here accepts an optional region-of-interest mask so callers can
//! restrict detection to the parts of an image where correspondences are
//! expected.

pub mod descriptor;
pub mod fast;
pub mod matcher;
pub mod orb;
pub mod ransac;

pub use descriptor::*;
pub use fast::*;
pub use matcher::*;
pub use orb::*;
pub use ransac::*;

use image::GrayImage;

pub type Result<T> = std::result::Result<T, FeatureError>;

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Detection error: {0}")]
    DetectionError(String),

    #[error("Estimation error: {0}")]
    EstimationError(String),
}

/// Checks that an optional mask covers exactly the image it is applied to.
pub fn validate_mask(image: &GrayImage, mask: Option<&GrayImage>) -> Result<()> {
    match mask {
        Some(m) if m.dimensions() != image.dimensions() => {
            Err(FeatureError::DetectionError(format!(
                "mask is {}x{} but image is {}x{}",
                m.width(),
                m.height(),
                image.width(),
                image.height()
            )))
        }
        _ => Ok(()),
    }
}

#[inline]
pub(crate) fn mask_allows(mask: Option<&GrayImage>, x: u32, y: u32) -> bool {
    mask.map_or(true, |m| m.get_pixel(x, y)[0] != 0)
}
