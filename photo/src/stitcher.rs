use crate::backend::{
    check_features, BilinearWarper, BruteForceMatcher, DescriptorMatcher, FeatureDetector,
    HomographyEstimator, OrbDetector, PerspectiveWarper, RansacHomography,
};
use crate::{
    build_sampling_mask, composite, decode_image, encode_image, ratio_filter, Correspondences,
    HomographyPolicy, OverlapSide, Result, SamplingMask, StitchConfig, StitchError,
};
use cv_core::{Descriptors, KeyPoints};
use cv_imgproc::convert_rgb_to_gray;
use image::{ImageFormat, RgbImage};
use nalgebra::Matrix3;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Progress of one stitching call. Stages are entered in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StitchStage {
    Start,
    MasksBuilt,
    FeaturesDetected,
    Matched,
    Filtered,
    Estimated,
    Composited,
    Cropped,
    Done,
}

impl fmt::Display for StitchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StitchStage::Start => "start",
            StitchStage::MasksBuilt => "masks built",
            StitchStage::FeaturesDetected => "features detected",
            StitchStage::Matched => "matched",
            StitchStage::Filtered => "filtered",
            StitchStage::Estimated => "estimated",
            StitchStage::Composited => "composited",
            StitchStage::Cropped => "cropped",
            StitchStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Counts gathered along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StitchStats {
    pub primary_keypoints: usize,
    pub secondary_keypoints: usize,
    pub candidate_lists: usize,
    pub correspondences: usize,
    pub inliers: usize,
    pub canvas_size: (u32, u32),
    pub output_size: (u32, u32),
}

/// A stitched image and the transform that produced it.
#[derive(Debug, Clone)]
pub struct Panorama {
    pub image: RgbImage,
    /// Secondary-to-primary homography, normalised so `h[2][2] == 1`.
    pub homography: Matrix3<f64>,
    pub stats: StitchStats,
}

impl Panorama {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>> {
        encode_image(&self.image, format)
    }
}

/// Checks the optional deadline each time the pipeline advances.
struct StageClock {
    deadline: Option<Instant>,
}

impl StageClock {
    fn enter(&self, stage: StitchStage) -> Result<()> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(StitchError::DeadlineExceeded { stage });
            }
        }
        debug!(%stage, "stage entered");
        Ok(())
    }
}

struct ImageFeatures {
    keypoints: KeyPoints,
    descriptors: Descriptors,
}

/// Two-image panorama stitcher.
///
/// Collaborators are injected through the [`crate::backend`] traits; `new`
/// uses ORB, brute-force Hamming matching, seeded RANSAC and bilinear
/// warping. A stitcher holds no per-call state and can be shared between
/// threads.
pub struct Stitcher<
    D = OrbDetector,
    M = BruteForceMatcher,
    E = RansacHomography,
    W = BilinearWarper,
> {
    config: StitchConfig,
    detector: D,
    matcher: M,
    estimator: E,
    warper: W,
}

impl Stitcher {
    pub fn new(config: StitchConfig) -> Result<Self> {
        let detector = OrbDetector::new(config.orb.clone());
        let estimator = RansacHomography::from_config(&config);
        Self::with_components(config, detector, BruteForceMatcher, estimator, BilinearWarper)
    }
}

impl<D, M, E, W> Stitcher<D, M, E, W>
where
    D: FeatureDetector,
    M: DescriptorMatcher,
    E: HomographyEstimator,
    W: PerspectiveWarper,
{
    pub fn with_components(
        config: StitchConfig,
        detector: D,
        matcher: M,
        estimator: E,
        warper: W,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            detector,
            matcher,
            estimator,
            warper,
        })
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Stitches `secondary` onto the right of `primary`.
    pub fn stitch(&self, primary: &RgbImage, secondary: &RgbImage) -> Result<Panorama> {
        self.stitch_with_deadline(primary, secondary, None)
    }

    /// Decodes both inputs, then stitches them.
    pub fn stitch_bytes(&self, primary: &[u8], secondary: &[u8]) -> Result<Panorama> {
        let primary = decode_image(primary)?;
        let secondary = decode_image(secondary)?;
        self.stitch(&primary, &secondary)
    }

    /// Like [`Stitcher::stitch`], failing with `DeadlineExceeded` if
    /// `deadline` passes before the pipeline finishes. The deadline is
    /// checked between stages only.
    pub fn stitch_with_deadline(
        &self,
        primary: &RgbImage,
        secondary: &RgbImage,
        deadline: Option<Instant>,
    ) -> Result<Panorama> {
        let started = Instant::now();
        let result = self.run(primary, secondary, &StageClock { deadline });

        match &result {
            Ok(panorama) => info!(
                width = panorama.width(),
                height = panorama.height(),
                correspondences = panorama.stats.correspondences,
                inliers = panorama.stats.inliers,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "panorama stitched"
            ),
            Err(err) => warn!(error = %err, kind = ?err.kind(), "stitching failed"),
        }
        result
    }

    fn run(&self, primary: &RgbImage, secondary: &RgbImage, clock: &StageClock) -> Result<Panorama> {
        clock.enter(StitchStage::Start)?;
        for (name, img) in [("primary", primary), ("secondary", secondary)] {
            if img.width() == 0 || img.height() == 0 {
                return Err(StitchError::Input(format!(
                    "{name} image is {}x{}",
                    img.width(),
                    img.height()
                )));
            }
        }

        let (primary_mask, secondary_mask) = rayon::join(
            || build_sampling_mask(primary.width(), primary.height(), OverlapSide::Right, &self.config),
            || {
                build_sampling_mask(
                    secondary.width(),
                    secondary.height(),
                    OverlapSide::Left,
                    &self.config,
                )
            },
        );
        let (primary_mask, secondary_mask) = (primary_mask?, secondary_mask?);
        clock.enter(StitchStage::MasksBuilt)?;

        let (primary_features, secondary_features) = rayon::join(
            || self.features(primary, &primary_mask),
            || self.features(secondary, &secondary_mask),
        );
        let (primary_features, secondary_features) = (primary_features?, secondary_features?);
        let mut stats = StitchStats {
            primary_keypoints: primary_features.keypoints.len(),
            secondary_keypoints: secondary_features.keypoints.len(),
            ..StitchStats::default()
        };
        debug!(
            primary = stats.primary_keypoints,
            secondary = stats.secondary_keypoints,
            "keypoints detected"
        );
        clock.enter(StitchStage::FeaturesDetected)?;

        let candidates = self.matcher.knn_match(
            &primary_features.descriptors,
            &secondary_features.descriptors,
            2,
        );
        stats.candidate_lists = candidates.len();
        clock.enter(StitchStage::Matched)?;

        let pairs = ratio_filter(&candidates, self.config.ratio);
        let correspondences = Correspondences::from_pairs(
            pairs,
            &primary_features.keypoints,
            &secondary_features.keypoints,
        )?;
        stats.correspondences = correspondences.len();
        debug!(
            candidates = stats.candidate_lists,
            kept = stats.correspondences,
            "ratio test applied"
        );
        clock.enter(StitchStage::Filtered)?;

        let homography =
            HomographyPolicy::from_config(&self.config).resolve(&correspondences, &self.estimator)?;
        stats.inliers = homography.num_inliers();
        clock.enter(StitchStage::Estimated)?;

        let canvas = composite(
            primary,
            secondary,
            &homography,
            self.config.smoothing_window,
            &self.warper,
        )?;
        stats.canvas_size = canvas.dimensions();
        clock.enter(StitchStage::Composited)?;

        let (image, rect) = canvas.crop_to_content()?;
        stats.output_size = image.dimensions();
        debug!(x = rect.x, y = rect.y, width = rect.width, height = rect.height, "cropped");
        clock.enter(StitchStage::Cropped)?;

        clock.enter(StitchStage::Done)?;
        Ok(Panorama {
            image,
            homography: *homography.matrix(),
            stats,
        })
    }

    fn features(&self, image: &RgbImage, mask: &SamplingMask) -> Result<ImageFeatures> {
        let gray = convert_rgb_to_gray(image);
        let (keypoints, descriptors) = self.detector.detect(&gray, mask)?;
        check_features(&keypoints, &descriptors)?;
        Ok(ImageFeatures {
            keypoints,
            descriptors,
        })
    }
}
