//! Collaborator seams of the pipeline and their default implementations.

use crate::{Result, SamplingMask, StitchConfig, StitchError};
use cv_core::{Descriptors, FeatureMatch, KeyPoints, RobustConfig};
use cv_features::ransac::estimate_homography_points;
use cv_features::{knn_match, Orb, OrbConfig};
use cv_imgproc::warp_perspective_rgb32f;
use image::{GrayImage, Rgb32FImage};
use nalgebra::{Matrix3, Point2};
use tracing::debug;

/// Detects keypoints inside a sampling mask and describes them.
///
/// Descriptor `i` must describe keypoint `i`.
pub trait FeatureDetector: Send + Sync {
    fn detect(&self, image: &GrayImage, mask: &SamplingMask) -> Result<(KeyPoints, Descriptors)>;
}

/// k-nearest-neighbour search, one ascending candidate list per query.
pub trait DescriptorMatcher: Send + Sync {
    fn knn_match(&self, query: &Descriptors, train: &Descriptors, k: usize)
        -> Vec<Vec<FeatureMatch>>;
}

/// Robust fit of `dst ~ H * src`, returning the model and a per-point
/// inlier flag.
pub trait HomographyEstimator: Send + Sync {
    fn estimate(
        &self,
        src: &[Point2<f64>],
        dst: &[Point2<f64>],
        threshold: f64,
    ) -> Option<(Matrix3<f64>, Vec<bool>)>;
}

/// Renders `src` into a `size` canvas through a forward homography.
pub trait PerspectiveWarper: Send + Sync {
    fn warp(
        &self,
        src: &Rgb32FImage,
        homography: &Matrix3<f64>,
        size: (u32, u32),
    ) -> Result<Rgb32FImage>;
}

/// ORB keypoints and steered BRIEF descriptors.
pub struct OrbDetector {
    orb: Orb,
}

impl OrbDetector {
    pub fn new(config: OrbConfig) -> Self {
        Self {
            orb: Orb::new(config),
        }
    }
}

impl Default for OrbDetector {
    fn default() -> Self {
        Self::new(OrbConfig::default())
    }
}

impl FeatureDetector for OrbDetector {
    fn detect(&self, image: &GrayImage, mask: &SamplingMask) -> Result<(KeyPoints, Descriptors)> {
        let (keypoints, descriptors) = self.orb.detect_and_compute(image, Some(mask.as_image()))?;
        debug!(
            keypoints = keypoints.len(),
            sampled = mask.sampled_count(),
            "orb features"
        );
        Ok((keypoints, descriptors))
    }
}

/// Exhaustive Hamming-distance search.
#[derive(Debug, Default, Clone, Copy)]
pub struct BruteForceMatcher;

impl DescriptorMatcher for BruteForceMatcher {
    fn knn_match(
        &self,
        query: &Descriptors,
        train: &Descriptors,
        k: usize,
    ) -> Vec<Vec<FeatureMatch>> {
        knn_match(query, train, k)
    }
}

/// Seeded RANSAC over normalised DLT fits.
#[derive(Debug, Clone)]
pub struct RansacHomography {
    pub max_iterations: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl RansacHomography {
    pub fn from_config(config: &StitchConfig) -> Self {
        Self {
            max_iterations: config.ransac_max_iterations,
            confidence: config.ransac_confidence,
            seed: config.ransac_seed,
        }
    }

    /// Engine settings for one estimate at `threshold` pixels.
    pub fn robust_config(&self, threshold: f64) -> RobustConfig {
        RobustConfig {
            threshold,
            max_iterations: self.max_iterations,
            confidence: self.confidence,
            seed: self.seed,
        }
    }
}

impl Default for RansacHomography {
    fn default() -> Self {
        Self::from_config(&StitchConfig::default())
    }
}

impl HomographyEstimator for RansacHomography {
    fn estimate(
        &self,
        src: &[Point2<f64>],
        dst: &[Point2<f64>],
        threshold: f64,
    ) -> Option<(Matrix3<f64>, Vec<bool>)> {
        let config = self.robust_config(threshold);
        let result = estimate_homography_points(src, dst, &config).ok()?;
        debug!(
            iterations = result.iterations,
            inliers = result.num_inliers,
            residual = result.residual,
            "ransac homography"
        );
        result.model.map(|h| (h, result.inliers))
    }
}

/// Bilinear inverse-mapping warp with a black border.
///
/// Output samples are rounded to whole intensity levels so the warped layer
/// carries the same precision as an 8-bit image.
#[derive(Debug, Default, Clone, Copy)]
pub struct BilinearWarper;

impl PerspectiveWarper for BilinearWarper {
    fn warp(
        &self,
        src: &Rgb32FImage,
        homography: &Matrix3<f64>,
        size: (u32, u32),
    ) -> Result<Rgb32FImage> {
        let mut warped = warp_perspective_rgb32f(src, homography, size.0, size.1)?;
        warped.iter_mut().for_each(|v| *v = v.round());
        Ok(warped)
    }
}

pub(crate) fn check_features(keypoints: &KeyPoints, descriptors: &Descriptors) -> Result<()> {
    if keypoints.len() != descriptors.len() {
        return Err(StitchError::Input(format!(
            "detector returned {} keypoints but {} descriptors",
            keypoints.len(),
            descriptors.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_sampling_mask, OverlapSide};
    use image::Rgb;

    #[test]
    fn ransac_recovers_translation() {
        let src: Vec<Point2<f64>> = (0..30)
            .map(|i| Point2::new((i * 17 % 97) as f64, (i * 31 % 89) as f64))
            .collect();
        let mut dst: Vec<Point2<f64>> =
            src.iter().map(|p| Point2::new(p.x + 450.0, p.y)).collect();
        dst[3] = Point2::new(-300.0, 900.0);

        let (h, inliers) = RansacHomography::default().estimate(&src, &dst, 5.0).unwrap();
        assert!(!inliers[3]);
        assert_eq!(inliers.iter().filter(|&&v| v).count(), 29);
        assert!((h[(0, 2)] / h[(2, 2)] - 450.0).abs() < 1e-6);
    }

    #[test]
    fn robust_config_carries_stitch_settings() {
        let config = StitchConfig {
            ransac_max_iterations: 123,
            ransac_seed: 9,
            ..StitchConfig::default()
        };
        let robust = RansacHomography::from_config(&config).robust_config(2.5);
        assert_eq!(robust.threshold, 2.5);
        assert_eq!(robust.max_iterations, 123);
        assert_eq!(robust.confidence, config.ransac_confidence);
        assert_eq!(robust.seed, 9);
    }

    #[test]
    fn ransac_gives_up_on_too_few_points() {
        let pts = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)];
        assert!(RansacHomography::default().estimate(&pts, &pts, 5.0).is_none());
    }

    #[test]
    fn warper_quantises_and_sizes_output() {
        let mut src = Rgb32FImage::new(4, 4);
        src.put_pixel(1, 1, Rgb([10.4, 200.6, 0.0]));
        let out = BilinearWarper
            .warp(&src, &Matrix3::identity(), (6, 5))
            .unwrap();
        assert_eq!(out.dimensions(), (6, 5));
        assert_eq!(out.get_pixel(1, 1).0, [10.0, 201.0, 0.0]);
    }

    #[test]
    fn orb_detector_respects_empty_mask() {
        let image = GrayImage::from_fn(120, 120, |x, y| {
            image::Luma([if ((x / 6) + (y / 6)) % 2 == 0 { 30 } else { 220 }])
        });
        let config = StitchConfig {
            sample_percentage: 100,
            ..StitchConfig::default()
        };
        let mask = build_sampling_mask(120, 120, OverlapSide::Left, &config).unwrap();
        let (kps, descs) = OrbDetector::default().detect(&image, &mask).unwrap();
        assert_eq!(kps.len(), descs.len());
        assert!(check_features(&kps, &descs).is_ok());

        let empty_config = StitchConfig {
            sample_percentage: 1,
            ..StitchConfig::default()
        };
        let narrow = build_sampling_mask(120, 120, OverlapSide::Left, &empty_config).unwrap();
        let (kps, _) = OrbDetector::default().detect(&image, &narrow).unwrap();
        // The one sampled column lies inside the descriptor margin.
        assert!(kps.is_empty());
    }
}
