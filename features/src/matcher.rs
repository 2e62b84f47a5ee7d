use crate::descriptor::Descriptors;
use cv_core::FeatureMatch;
use rayon::prelude::*;

/// Brute-force Hamming k-nearest-neighbour matching.
///
/// For every query descriptor returns up to `k` train matches ordered by
/// ascending distance; equal distances keep the lower train index first.
/// The outer vector is indexed by query.
pub fn knn_match(query: &Descriptors, train: &Descriptors, k: usize) -> Vec<Vec<FeatureMatch>> {
    if k == 0 {
        return vec![Vec::new(); query.len()];
    }

    query
        .descriptors
        .par_iter()
        .enumerate()
        .map(|(query_idx, q_desc)| {
            let mut nearest: Vec<(u32, usize)> = Vec::with_capacity(k + 1);

            for (train_idx, t_desc) in train.iter().enumerate() {
                let distance = q_desc.hamming_distance(t_desc);
                if nearest.len() == k && distance >= nearest[k - 1].0 {
                    continue;
                }
                let pos = nearest.partition_point(|&(d, _)| d <= distance);
                nearest.insert(pos, (distance, train_idx));
                nearest.truncate(k);
            }

            nearest
                .into_iter()
                .map(|(distance, train_idx)| {
                    FeatureMatch::new(query_idx, train_idx, distance as f32)
                })
                .collect()
        })
        .collect()
}
