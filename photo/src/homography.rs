//! When to estimate a homography, and what counts as a usable one.

use crate::backend::HomographyEstimator;
use crate::{Correspondences, Result, StitchConfig, StitchError};
use nalgebra::{Matrix3, Point2, Vector3};
use tracing::debug;

/// Points in a minimal homography sample.
pub const MIN_HOMOGRAPHY_POINTS: usize = 4;

const SINGULAR_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    Sufficient,
    Insufficient,
}

/// Projective transform from secondary-image to primary-image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
    inliers: Vec<bool>,
}

impl Homography {
    /// Validates `matrix` and scales it so that `h[2][2] == 1`.
    pub fn new(matrix: Matrix3<f64>, inliers: Vec<bool>) -> Result<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(StitchError::HomographyFailure(
                "matrix has non-finite entries".into(),
            ));
        }
        let h33 = matrix[(2, 2)];
        if h33.abs() < SINGULAR_EPS {
            return Err(StitchError::HomographyFailure(
                "matrix cannot be normalised (h33 is zero)".into(),
            ));
        }
        let matrix = matrix / h33;
        let det = matrix.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPS {
            return Err(StitchError::HomographyFailure(format!(
                "matrix is singular (det = {det:e})"
            )));
        }
        Ok(Self { matrix, inliers })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn inliers(&self) -> &[bool] {
        &self.inliers
    }

    pub fn num_inliers(&self) -> usize {
        self.inliers.iter().filter(|&&v| v).count()
    }

    /// Maps a secondary-image point into primary coordinates.
    pub fn project(&self, p: &Point2<f64>) -> Option<Point2<f64>> {
        let v = self.matrix * Vector3::new(p.x, p.y, 1.0);
        (v[2].abs() > SINGULAR_EPS).then(|| Point2::new(v[0] / v[2], v[1] / v[2]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomographyPolicy {
    pub min_matches: usize,
    pub inlier_threshold: f64,
}

impl Default for HomographyPolicy {
    fn default() -> Self {
        Self {
            min_matches: 10,
            inlier_threshold: 5.0,
        }
    }
}

impl HomographyPolicy {
    pub fn from_config(config: &StitchConfig) -> Self {
        Self {
            min_matches: config.min_matches,
            inlier_threshold: config.ransac_threshold,
        }
    }

    pub fn decide(&self, count: usize) -> MatchDecision {
        if count < self.min_matches {
            MatchDecision::Insufficient
        } else {
            MatchDecision::Sufficient
        }
    }

    /// Estimates the secondary-to-primary homography, or explains why not.
    ///
    /// The estimator is only called when there are at least `min_matches`
    /// correspondences.
    pub fn resolve<E>(&self, correspondences: &Correspondences, estimator: &E) -> Result<Homography>
    where
        E: HomographyEstimator + ?Sized,
    {
        let found = correspondences.len();
        if self.decide(found) == MatchDecision::Insufficient {
            return Err(StitchError::InsufficientMatches {
                found,
                required: self.min_matches,
            });
        }

        let (matrix, inliers) = estimator
            .estimate(
                correspondences.secondary(),
                correspondences.primary(),
                self.inlier_threshold,
            )
            .ok_or_else(|| {
                StitchError::HomographyFailure("estimator found no consistent model".into())
            })?;

        if inliers.len() != found {
            return Err(StitchError::Input(format!(
                "estimator returned {} inlier flags for {found} correspondences",
                inliers.len()
            )));
        }

        let homography = Homography::new(matrix, inliers)?;
        let num_inliers = homography.num_inliers();
        if num_inliers < MIN_HOMOGRAPHY_POINTS {
            return Err(StitchError::HomographyFailure(format!(
                "only {num_inliers} inliers support the model"
            )));
        }

        debug!(found, num_inliers, "homography accepted");
        Ok(homography)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MatchIndexPair, StitchErrorKind};
    use cv_core::{KeyPoint, KeyPoints};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        result: Option<(Matrix3<f64>, Vec<bool>)>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(result: Option<(Matrix3<f64>, Vec<bool>)>) -> Self {
            Self {
                result,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl HomographyEstimator for Fixed {
        fn estimate(
            &self,
            _src: &[Point2<f64>],
            _dst: &[Point2<f64>],
            _threshold: f64,
        ) -> Option<(Matrix3<f64>, Vec<bool>)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn correspondences(n: usize) -> Correspondences {
        let kps: KeyPoints = (0..n)
            .map(|i| KeyPoint::new(i as f64, (i * i) as f64))
            .collect::<Vec<_>>()
            .into();
        let pairs = (0..n)
            .map(|i| MatchIndexPair {
                secondary_idx: i,
                primary_idx: i,
            })
            .collect();
        Correspondences::from_pairs(pairs, &kps, &kps).unwrap()
    }

    #[test]
    fn decision_threshold_is_inclusive() {
        let policy = HomographyPolicy::default();
        assert_eq!(policy.decide(9), MatchDecision::Insufficient);
        assert_eq!(policy.decide(10), MatchDecision::Sufficient);
    }

    #[test]
    fn insufficient_matches_skip_estimator() {
        let estimator = Fixed::new(Some((Matrix3::identity(), vec![true; 9])));
        let err = HomographyPolicy::default()
            .resolve(&correspondences(9), &estimator)
            .unwrap_err();
        assert!(matches!(
            err,
            StitchError::InsufficientMatches {
                found: 9,
                required: 10
            }
        ));
        assert_eq!(estimator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn accepted_model_is_normalised() {
        let m = Matrix3::new(2.0, 0.0, 10.0, 0.0, 2.0, 4.0, 0.0, 0.0, 2.0);
        let estimator = Fixed::new(Some((m, vec![true; 12])));
        let h = HomographyPolicy::default()
            .resolve(&correspondences(12), &estimator)
            .unwrap();
        assert_eq!(estimator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.matrix()[(2, 2)], 1.0);
        assert_eq!(h.num_inliers(), 12);
        let p = h.project(&Point2::new(1.0, 1.0)).unwrap();
        assert!((p - Point2::new(6.0, 3.0)).norm() < 1e-12);
    }

    #[test]
    fn degenerate_results_are_homography_failures() {
        let policy = HomographyPolicy::default();
        let corr = correspondences(10);

        let none = Fixed::new(None);
        assert_eq!(
            policy.resolve(&corr, &none).unwrap_err().kind(),
            StitchErrorKind::HomographyFailure
        );

        let singular = Fixed::new(Some((Matrix3::zeros(), vec![true; 10])));
        assert_eq!(
            policy.resolve(&corr, &singular).unwrap_err().kind(),
            StitchErrorKind::HomographyFailure
        );

        let mut nan = Matrix3::identity();
        nan[(0, 1)] = f64::NAN;
        let nan = Fixed::new(Some((nan, vec![true; 10])));
        assert_eq!(
            policy.resolve(&corr, &nan).unwrap_err().kind(),
            StitchErrorKind::HomographyFailure
        );

        let mut flags = vec![false; 10];
        flags[..3].fill(true);
        let weak = Fixed::new(Some((Matrix3::identity(), flags)));
        assert_eq!(
            policy.resolve(&corr, &weak).unwrap_err().kind(),
            StitchErrorKind::HomographyFailure
        );
    }

    #[test]
    fn inlier_mask_length_must_match() {
        let estimator = Fixed::new(Some((Matrix3::identity(), vec![true; 3])));
        let err = HomographyPolicy::default()
            .resolve(&correspondences(10), &estimator)
            .unwrap_err();
        assert_eq!(err.kind(), StitchErrorKind::InputError);
    }
}
