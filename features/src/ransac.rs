//! RANSAC (Random Sample Consensus) for geometric verification
//!
//! RANSAC is used to robustly estimate the projective transform between two
//! views from point correspondences containing outliers. Minimal samples and
//! the final refit both go through a Hartley-normalised DLT.

use crate::{FeatureError, Result};
use cv_core::{Ransac, RobustConfig, RobustModel};
use nalgebra::{DMatrix, Matrix3, Point2, Vector3};

pub type RansacConfig = RobustConfig;
pub use cv_core::robust::RobustResult as RansacResult;

/// Samples whose triangles are thinner than this (in pixels²) are degenerate.
const MIN_TRIANGLE_AREA: f64 = 1e-6;

#[derive(Clone, Debug)]
pub struct MatchPair {
    pub src: Point2<f64>,
    pub dst: Point2<f64>,
}

/// Homography model: `dst ~ H * src`.
pub struct HomographyEstimator;

impl RobustModel<MatchPair> for HomographyEstimator {
    type Model = Matrix3<f64>;

    fn min_sample_size(&self) -> usize {
        4
    }

    fn estimate(&self, data: &[&MatchPair]) -> Option<Self::Model> {
        if is_degenerate(data) {
            return None;
        }
        solve_dlt_homography(data)
    }

    fn refine(&self, data: &[&MatchPair]) -> Option<Self::Model> {
        solve_dlt_homography(data)
    }

    fn compute_error(&self, model: &Self::Model, data: &MatchPair) -> f64 {
        match project(model, &data.src) {
            Some(p) => (p - data.dst).norm(),
            None => f64::INFINITY,
        }
    }
}

/// Applies `h` to `p`; `None` when the point maps to infinity.
pub fn project(h: &Matrix3<f64>, p: &Point2<f64>) -> Option<Point2<f64>> {
    let v = h * Vector3::new(p.x, p.y, 1.0);
    if v[2].abs() > 1e-12 {
        Some(Point2::new(v[0] / v[2], v[1] / v[2]))
    } else {
        None
    }
}

/// Estimate a homography mapping `src_points[i]` onto `dst_points[i]` using RANSAC.
pub fn estimate_homography_points(
    src_points: &[Point2<f64>],
    dst_points: &[Point2<f64>],
    config: &RansacConfig,
) -> Result<RansacResult<Matrix3<f64>>> {
    if src_points.len() != dst_points.len() {
        return Err(FeatureError::EstimationError(format!(
            "point sets differ in length: {} vs {}",
            src_points.len(),
            dst_points.len()
        )));
    }

    let data: Vec<MatchPair> = src_points
        .iter()
        .zip(dst_points)
        .map(|(&src, &dst)| MatchPair { src, dst })
        .collect();

    let ransac = Ransac::new(config.clone());
    Ok(ransac.run(&HomographyEstimator, &data))
}

fn is_degenerate(data: &[&MatchPair]) -> bool {
    let n = data.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let src = triangle_area(&data[i].src, &data[j].src, &data[k].src);
                let dst = triangle_area(&data[i].dst, &data[j].dst, &data[k].dst);
                if src < MIN_TRIANGLE_AREA || dst < MIN_TRIANGLE_AREA {
                    return true;
                }
            }
        }
    }
    false
}

fn triangle_area(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)).abs() * 0.5
}

/// Translate the centroid to the origin and scale the mean distance to sqrt(2).
fn normalize_points<'a>(pts: impl Iterator<Item = &'a Point2<f64>> + Clone) -> Matrix3<f64> {
    let n = pts.clone().count().max(1) as f64;
    let (sx, sy) = pts.clone().fold((0.0, 0.0), |acc, p| (acc.0 + p.x, acc.1 + p.y));
    let (cx, cy) = (sx / n, sy / n);
    let mean_dist = pts
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Solve DLT for homography using SVD
fn solve_dlt_homography(data: &[&MatchPair]) -> Option<Matrix3<f64>> {
    if data.len() < 4 {
        return None;
    }

    let t_src = normalize_points(data.iter().map(|m| &m.src));
    let t_dst = normalize_points(data.iter().map(|m| &m.dst));

    // At least 9 rows so the SVD yields a full 9x9 V^T.
    let rows = (data.len() * 2).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);

    for (i, m) in data.iter().enumerate() {
        let s = t_src * Vector3::new(m.src.x, m.src.y, 1.0);
        let d = t_dst * Vector3::new(m.dst.x, m.dst.y, 1.0);
        let (x1, y1) = (s[0], s[1]);
        let (x2, y2) = (d[0], d[1]);

        let r = i * 2;
        a[(r, 0)] = -x1;
        a[(r, 1)] = -y1;
        a[(r, 2)] = -1.0;
        a[(r, 6)] = x2 * x1;
        a[(r, 7)] = x2 * y1;
        a[(r, 8)] = x2;

        a[(r + 1, 3)] = -x1;
        a[(r + 1, 4)] = -y1;
        a[(r + 1, 5)] = -1.0;
        a[(r + 1, 6)] = y2 * x1;
        a[(r + 1, 7)] = y2 * y1;
        a[(r + 1, 8)] = y2;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = v_t.row(min_idx);

    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    let t_dst_inv = t_dst.try_inverse()?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(h / scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> Vec<Point2<f64>> {
        let mut pts = Vec::new();
        for j in 0..5 {
            for i in 0..6 {
                pts.push(Point2::new(20.0 + i as f64 * 37.0, 15.0 + j as f64 * 41.0));
            }
        }
        pts
    }

    fn config(threshold: f64) -> RansacConfig {
        RansacConfig {
            threshold,
            max_iterations: 1000,
            confidence: 0.999,
            seed: 11,
        }
    }

    #[test]
    fn recovers_translation_with_outliers() {
        let src = grid_points();
        let mut dst: Vec<Point2<f64>> = src.iter().map(|p| Point2::new(p.x + 450.0, p.y + 3.0)).collect();
        for (k, p) in dst.iter_mut().enumerate().take(6) {
            *p = Point2::new(900.0 - k as f64 * 113.0, 17.0 * k as f64 + 300.0);
        }

        let result = estimate_homography_points(&src, &dst, &config(5.0)).unwrap();
        let h = result.model.expect("homography");
        assert!((h[(0, 2)] - 450.0).abs() < 1e-6);
        assert!((h[(1, 2)] - 3.0).abs() < 1e-6);
        assert!((h[(0, 0)] - 1.0).abs() < 1e-9);
        assert_eq!(result.num_inliers, src.len() - 6);
        assert!(result.inliers.iter().take(6).all(|&i| !i));
    }

    #[test]
    fn recovers_projective_transform() {
        let truth = Matrix3::new(0.9, 0.05, 30.0, -0.04, 1.1, -12.0, 1e-4, -5e-5, 1.0);
        let src = grid_points();
        let dst: Vec<Point2<f64>> = src.iter().map(|p| project(&truth, p).unwrap()).collect();

        let result = estimate_homography_points(&src, &dst, &config(1.0)).unwrap();
        let h = result.model.unwrap();
        for (s, d) in src.iter().zip(&dst) {
            assert!((project(&h, s).unwrap() - d).norm() < 1e-6);
        }
    }

    #[test]
    fn collinear_points_have_no_model() {
        let src: Vec<Point2<f64>> = (0..10).map(|i| Point2::new(i as f64, 2.0 * i as f64)).collect();
        let dst = src.clone();
        let result = estimate_homography_points(&src, &dst, &config(1.0)).unwrap();
        assert!(result.model.is_none());
        assert_eq!(result.num_inliers, 0);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let src = grid_points();
        let dst = &src[..src.len() - 1];
        assert!(estimate_homography_points(&src, dst, &config(1.0)).is_err());
    }
}
