//! Ratio-test filtering of nearest-neighbour candidates.

use crate::{Result, StitchError};
use cv_core::{FeatureMatch, KeyPoints};
use nalgebra::Point2;

/// Keypoint indices of one accepted match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchIndexPair {
    pub secondary_idx: usize,
    pub primary_idx: usize,
}

/// Keeps the best candidate of each query whose distance is strictly below
/// `ratio` times the second-best distance.
///
/// Queries are primary-image descriptors and candidates index the secondary
/// image. Scan order is preserved; lists with fewer than two candidates are
/// skipped.
pub fn ratio_filter(candidates: &[Vec<FeatureMatch>], ratio: f32) -> Vec<MatchIndexPair> {
    candidates
        .iter()
        .filter_map(|list| match list.as_slice() {
            [best, second, ..] if best.distance < ratio * second.distance => {
                Some(MatchIndexPair {
                    secondary_idx: best.train_idx,
                    primary_idx: best.query_idx,
                })
            }
            _ => None,
        })
        .collect()
}

/// Index-aligned point sequences believed to image the same scene points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correspondences {
    primary: Vec<Point2<f64>>,
    secondary: Vec<Point2<f64>>,
    pairs: Vec<MatchIndexPair>,
}

impl Correspondences {
    /// Resolves index pairs against the keypoint sets they were matched from.
    pub fn from_pairs(
        pairs: Vec<MatchIndexPair>,
        primary: &KeyPoints,
        secondary: &KeyPoints,
    ) -> Result<Self> {
        let mut primary_pts = Vec::with_capacity(pairs.len());
        let mut secondary_pts = Vec::with_capacity(pairs.len());

        for pair in &pairs {
            let p = primary.point(pair.primary_idx).map_err(|e| {
                StitchError::Input(format!("matcher returned a stale primary index: {e}"))
            })?;
            let s = secondary.point(pair.secondary_idx).map_err(|e| {
                StitchError::Input(format!("matcher returned a stale secondary index: {e}"))
            })?;
            primary_pts.push(p);
            secondary_pts.push(s);
        }

        Ok(Self {
            primary: primary_pts,
            secondary: secondary_pts,
            pairs,
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn primary(&self) -> &[Point2<f64>] {
        &self.primary
    }

    pub fn secondary(&self) -> &[Point2<f64>] {
        &self.secondary
    }

    pub fn pairs(&self) -> &[MatchIndexPair] {
        &self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::KeyPoint;

    fn candidates(query: usize, dists: &[(usize, f32)]) -> Vec<FeatureMatch> {
        dists
            .iter()
            .map(|&(train, d)| FeatureMatch::new(query, train, d))
            .collect()
    }

    #[test]
    fn keeps_distinctive_matches_in_order() {
        let lists = vec![
            candidates(0, &[(7, 10.0), (3, 40.0)]),
            candidates(1, &[(2, 30.0), (5, 31.0)]),
            candidates(2, &[(4, 0.0), (1, 1.0)]),
        ];
        let kept = ratio_filter(&lists, 0.85);
        assert_eq!(
            kept,
            vec![
                MatchIndexPair { secondary_idx: 7, primary_idx: 0 },
                MatchIndexPair { secondary_idx: 4, primary_idx: 2 },
            ]
        );
    }

    #[test]
    fn ratio_boundary_is_strict() {
        let lists = vec![candidates(0, &[(0, 17.0), (1, 20.0)])];
        assert!(ratio_filter(&lists, 0.85).is_empty());
        assert_eq!(ratio_filter(&lists, 0.9).len(), 1);

        // Two exact matches are ambiguous.
        let ties = vec![candidates(0, &[(0, 0.0), (1, 0.0)])];
        assert!(ratio_filter(&ties, 0.85).is_empty());
    }

    #[test]
    fn short_candidate_lists_are_skipped() {
        let lists = vec![Vec::new(), candidates(1, &[(0, 1.0)])];
        assert!(ratio_filter(&lists, 0.85).is_empty());
    }

    #[test]
    fn no_survivor_violates_ratio() {
        let lists: Vec<Vec<FeatureMatch>> = (0..50)
            .map(|i| {
                let best = (i * 7 % 23) as f32;
                let second = best + (i % 5) as f32;
                candidates(i, &[(i, best), (i + 1, second)])
            })
            .collect();
        for pair in ratio_filter(&lists, 0.85) {
            let list = &lists[pair.primary_idx];
            assert!(list[0].distance < 0.85 * list[1].distance);
        }
    }

    #[test]
    fn resolves_points_and_rejects_stale_indices() {
        let primary = KeyPoints::from(vec![KeyPoint::new(1.0, 2.0), KeyPoint::new(3.0, 4.0)]);
        let secondary = KeyPoints::from(vec![KeyPoint::new(10.0, 20.0)]);

        let corr = Correspondences::from_pairs(
            vec![MatchIndexPair { secondary_idx: 0, primary_idx: 1 }],
            &primary,
            &secondary,
        )
        .unwrap();
        assert_eq!(corr.len(), 1);
        assert_eq!(corr.primary()[0], Point2::new(3.0, 4.0));
        assert_eq!(corr.secondary()[0], Point2::new(10.0, 20.0));

        let err = Correspondences::from_pairs(
            vec![MatchIndexPair { secondary_idx: 1, primary_idx: 0 }],
            &primary,
            &secondary,
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::StitchErrorKind::InputError);
    }
}
