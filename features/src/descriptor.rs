pub use cv_core::{Descriptor, Descriptors};

use cv_core::KeyPoints;
use image::GrayImage;

/// Computes descriptors for already detected keypoints.
///
/// Implementations may drop keypoints they cannot describe (too close to the
/// border), so they return the surviving keypoints alongside the descriptors;
/// the two outputs are index-aligned.
pub trait DescriptorExtractor {
    fn extract(&self, image: &GrayImage, keypoints: &KeyPoints) -> (KeyPoints, Descriptors);
}
