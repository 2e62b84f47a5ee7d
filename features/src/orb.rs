//! ORB (Oriented FAST and Rotated BRIEF) implementation
//!
//! ORB combines the FAST keypoint detector with a modified BRIEF descriptor
//! that includes orientation information for rotation invariance. The BRIEF
//! sampling pattern is generated once from a fixed seed, so descriptors from
//! different images (and different runs) are comparable.

use crate::descriptor::{Descriptor, DescriptorExtractor, Descriptors};
use crate::fast::fast_detect;
use crate::{validate_mask, Result};
use cv_core::{KeyPoint, KeyPoints};
use image::imageops::{self, FilterType};
use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashMap;

/// Number of BRIEF tests; 256 bits = 32 bytes.
const DESCRIPTOR_BITS: usize = 256;

/// Radius of the binomial pre-smoothing applied before sampling BRIEF pairs.
const SMOOTH_RADIUS: i32 = 2;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OrbConfig {
    /// Maximum number of keypoints kept, strongest first.
    pub n_features: usize,
    pub fast_threshold: u8,
    /// Pyramid levels; 1 detects at full resolution only.
    pub n_levels: usize,
    pub scale_factor: f32,
    /// Side of the square patch used for orientation and BRIEF sampling.
    pub patch_size: u32,
    pub pattern_seed: u64,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            n_features: 3000,
            fast_threshold: 20,
            n_levels: 1,
            scale_factor: 1.2,
            patch_size: 31,
            pattern_seed: 0x0B5E_55ED,
        }
    }
}

/// ORB feature detector and descriptor
pub struct Orb {
    config: OrbConfig,
    pattern: Vec<(f32, f32, f32, f32)>,
}

impl Default for Orb {
    fn default() -> Self {
        Self::new(OrbConfig::default())
    }
}

impl Orb {
    pub fn new(config: OrbConfig) -> Self {
        let pattern = generate_steered_brief_pattern(config.patch_size, config.pattern_seed);
        Self { config, pattern }
    }

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    /// Distance from the border a keypoint needs for a full rotated patch.
    pub fn border_margin(&self) -> u32 {
        let half = self.config.patch_size as f32 / 2.0;
        (half * std::f32::consts::SQRT_2).ceil() as u32 + 1 + SMOOTH_RADIUS as u32
    }

    /// Detect keypoints using FAST at multiple scales, restricted to `mask`.
    ///
    /// Keypoints too close to the border to be described are discarded before
    /// the strongest `n_features` are selected.
    pub fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> Result<KeyPoints> {
        validate_mask(image, mask)?;

        let (w, h) = image.dimensions();
        let margin = self.border_margin() as f64;
        let levels = self.config.n_levels.max(1);
        let mut best: HashMap<(u32, u32), KeyPoint> = HashMap::new();
        let mut scale = 1.0f32;

        for level in 0..levels {
            let (level_image, level_mask) = if level == 0 {
                (None, None)
            } else {
                let lw = (w as f32 / scale) as u32;
                let lh = (h as f32 / scale) as u32;
                if lw < 8 || lh < 8 {
                    break;
                }
                let img = imageops::resize(image, lw, lh, FilterType::Triangle);
                let m = mask.map(|m| imageops::resize(m, lw, lh, FilterType::Nearest));
                (Some(img), m)
            };

            let kps = fast_detect(
                level_image.as_ref().unwrap_or(image),
                self.config.fast_threshold,
                if level == 0 { mask } else { level_mask.as_ref() },
            );

            for kp in kps.keypoints {
                let x = (kp.x * scale as f64).round();
                let y = (kp.y * scale as f64).round();
                if x < margin || y < margin || x >= w as f64 - margin || y >= h as f64 - margin {
                    continue;
                }
                let candidate = KeyPoint::new(x, y)
                    .with_size(self.config.patch_size as f64 * scale as f64)
                    .with_octave(level as i32)
                    .with_response(kp.response);

                // Coarse levels can land on a pixel already found at a finer level;
                // duplicate descriptors would defeat the ratio test.
                best.entry((x as u32, y as u32))
                    .and_modify(|existing| {
                        if candidate.response > existing.response {
                            *existing = candidate;
                        }
                    })
                    .or_insert(candidate);
            }

            scale *= self.config.scale_factor;
        }

        let mut all_keypoints: Vec<KeyPoint> = best.into_values().collect();
        all_keypoints.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then(a.y.total_cmp(&b.y))
                .then(a.x.total_cmp(&b.x))
        });
        all_keypoints.truncate(self.config.n_features);

        Ok(KeyPoints::from(all_keypoints))
    }

    /// Compute orientations for keypoints using intensity centroid
    pub fn compute_orientations(&self, image: &GrayImage, keypoints: &mut KeyPoints) {
        let half_patch = (self.config.patch_size / 2) as i32;
        let radius_sq = half_patch * half_patch;
        let width = image.width() as i32;
        let height = image.height() as i32;

        keypoints.keypoints.par_iter_mut().for_each(|kp| {
            let x = kp.x as i32;
            let y = kp.y as i32;

            let mut m01 = 0.0f64;
            let mut m10 = 0.0f64;

            for dy in -half_patch..=half_patch {
                for dx in -half_patch..=half_patch {
                    if dx * dx + dy * dy > radius_sq {
                        continue;
                    }
                    let px = x + dx;
                    let py = y + dy;
                    if px >= 0 && px < width && py >= 0 && py < height {
                        let intensity = image.get_pixel(px as u32, py as u32)[0] as f64;
                        m01 += intensity * dy as f64;
                        m10 += intensity * dx as f64;
                    }
                }
            }

            kp.angle = m01.atan2(m10).to_degrees();
        });
    }

    /// Detect, orient and describe in one pass.
    pub fn detect_and_compute(
        &self,
        image: &GrayImage,
        mask: Option<&GrayImage>,
    ) -> Result<(KeyPoints, Descriptors)> {
        let mut keypoints = self.detect(image, mask)?;
        self.compute_orientations(image, &mut keypoints);
        let (kept, descriptors) = self.extract(image, &keypoints);
        tracing::debug!(
            detected = keypoints.len(),
            described = kept.len(),
            "orb detect_and_compute"
        );
        Ok((kept, descriptors))
    }
}

impl DescriptorExtractor for Orb {
    fn extract(&self, image: &GrayImage, keypoints: &KeyPoints) -> (KeyPoints, Descriptors) {
        let smoothed = smooth_binomial(image);

        let described: Vec<(KeyPoint, Descriptor)> = keypoints
            .keypoints
            .par_iter()
            .filter_map(|kp| {
                compute_orb_descriptor(&smoothed, kp, &self.pattern).map(|d| (*kp, d))
            })
            .collect();

        let mut kept = KeyPoints::with_capacity(described.len());
        let mut descriptors = Descriptors::with_capacity(described.len());
        for (kp, d) in described {
            kept.push(kp);
            descriptors.push(d);
        }
        (kept, descriptors)
    }
}

/// Generate BRIEF sampling pattern with rotation support
fn generate_steered_brief_pattern(patch_size: u32, seed: u64) -> Vec<(f32, f32, f32, f32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let half_size = patch_size as f32 / 2.0;

    (0..DESCRIPTOR_BITS)
        .map(|_| {
            (
                rng.gen_range(-half_size..half_size),
                rng.gen_range(-half_size..half_size),
                rng.gen_range(-half_size..half_size),
                rng.gen_range(-half_size..half_size),
            )
        })
        .collect()
}

/// Compute ORB descriptor with rotation; `None` when any sample leaves the image.
fn compute_orb_descriptor(
    image: &GrayImage,
    kp: &KeyPoint,
    pattern: &[(f32, f32, f32, f32)],
) -> Option<Descriptor> {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let cx = kp.x as f32;
    let cy = kp.y as f32;

    let angle_rad = kp.angle.to_radians();
    let cos_a = angle_rad.cos() as f32;
    let sin_a = angle_rad.sin() as f32;

    let sample = |x: f32, y: f32| -> Option<u8> {
        let px = (cx + cos_a * x - sin_a * y).round() as i32;
        let py = (cy + sin_a * x + cos_a * y).round() as i32;
        if px < 0 || px >= width || py < 0 || py >= height {
            return None;
        }
        Some(image.get_pixel(px as u32, py as u32)[0])
    };

    let mut data = vec![0u8; DESCRIPTOR_BITS / 8];
    for (bit, &(x1, y1, x2, y2)) in pattern.iter().enumerate() {
        if sample(x1, y1)? < sample(x2, y2)? {
            data[bit / 8] |= 1 << (7 - bit % 8);
        }
    }

    Some(Descriptor::new(data))
}

/// Separable [1 4 6 4 1] / 16 smoothing with replicated borders.
fn smooth_binomial(image: &GrayImage) -> GrayImage {
    const KERNEL: [u32; 5] = [1, 4, 6, 4, 1];
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let width = w as usize;
    let src = image.as_raw();

    let mut horizontal = vec![0u32; src.len()];
    horizontal
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as i32 {
                row[x as usize] = (-SMOOTH_RADIUS..=SMOOTH_RADIUS)
                    .map(|k| {
                        let sx = (x + k).clamp(0, width as i32 - 1) as usize;
                        KERNEL[(k + SMOOTH_RADIUS) as usize] * src[y * width + sx] as u32
                    })
                    .sum();
            }
        });

    let mut out = vec![0u8; src.len()];
    out.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let acc: u32 = (-SMOOTH_RADIUS..=SMOOTH_RADIUS)
                    .map(|k| {
                        let sy = (y as i32 + k).clamp(0, h as i32 - 1) as usize;
                        KERNEL[(k + SMOOTH_RADIUS) as usize] * horizontal[sy * width + x]
                    })
                    .sum();
                row[x] = ((acc + 128) / 256) as u8;
            }
        });

    GrayImage::from_raw(w, h, out).unwrap_or_else(|| image.clone())
}
