//! Robust Estimation Module
//!
//! Provides a generic RANSAC implementation that can be used for any model estimation task.
//! Sampling is driven by a seeded RNG so repeated runs over the same data agree.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::marker::PhantomData;

/// Configuration for robust estimation
#[derive(Debug, Clone)]
pub struct RobustConfig {
    /// Maximum residual for a datum to count as an inlier.
    pub threshold: f64,
    pub max_iterations: usize,
    /// Desired probability of drawing at least one outlier-free sample.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            max_iterations: 1000,
            confidence: 0.99,
            seed: 0,
        }
    }
}

/// Result of robust estimation
#[derive(Debug, Clone)]
pub struct RobustResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    /// Mean residual over the inliers.
    pub residual: f64,
    pub iterations: usize,
}

impl<M> RobustResult<M> {
    fn failed(n: usize, iterations: usize) -> Self {
        Self {
            model: None,
            inliers: vec![false; n],
            num_inliers: 0,
            residual: f64::INFINITY,
            iterations,
        }
    }
}

/// Trait for models that can be estimated robustly
pub trait RobustModel<D> {
    type Model: Clone;

    /// Minimum number of data points required to estimate the model
    fn min_sample_size(&self) -> usize;

    /// Estimate model from a minimal sample
    fn estimate(&self, data: &[&D]) -> Option<Self::Model>;

    /// Re-estimate from the full inlier set. Defaults to `estimate`.
    fn refine(&self, data: &[&D]) -> Option<Self::Model> {
        self.estimate(data)
    }

    /// Compute error for a single data point against the model
    fn compute_error(&self, model: &Self::Model, data: &D) -> f64;
}

/// Generic RANSAC engine
pub struct Ransac<D, M: RobustModel<D>> {
    config: RobustConfig,
    _phantom: PhantomData<(D, M)>,
}

impl<D, M: RobustModel<D>> Ransac<D, M> {
    pub fn new(config: RobustConfig) -> Self {
        Self {
            config,
            _phantom: PhantomData,
        }
    }

    pub fn run(&self, estimator: &M, data: &[D]) -> RobustResult<M::Model> {
        let n = data.len();
        let k = estimator.min_sample_size();

        if n < k || k == 0 {
            return RobustResult::failed(n, 0);
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut best: Option<(M::Model, Vec<bool>, usize, f64)> = None;
        let mut required = self.config.max_iterations;
        let mut iterations = 0;

        while iterations < required.min(self.config.max_iterations) {
            iterations += 1;

            let sample: Vec<&D> = rand::seq::index::sample(&mut rng, n, k)
                .into_iter()
                .map(|i| &data[i])
                .collect();

            let Some(model) = estimator.estimate(&sample) else {
                continue;
            };

            let (inliers, num_inliers, residual) = self.score(estimator, &model, data);
            let improves = match &best {
                None => num_inliers > 0,
                Some((_, _, best_count, best_residual)) => {
                    num_inliers > *best_count
                        || (num_inliers == *best_count && residual < *best_residual)
                }
            };

            if improves {
                required = adaptive_iterations(self.config.confidence, num_inliers, n, k)
                    .max(1);
                best = Some((model, inliers, num_inliers, residual));
            }
        }

        let Some((model, inliers, num_inliers, residual)) = best else {
            tracing::debug!(iterations, "ransac found no consensus");
            return RobustResult::failed(n, iterations);
        };

        // Refit on the consensus set and keep the refit only if it does not lose support.
        let support: Vec<&D> = data
            .iter()
            .zip(&inliers)
            .filter_map(|(d, &keep)| keep.then_some(d))
            .collect();

        let (model, inliers, num_inliers, residual) = match estimator.refine(&support) {
            Some(refined) => {
                let (r_inliers, r_count, r_residual) = self.score(estimator, &refined, data);
                if r_count >= num_inliers {
                    (refined, r_inliers, r_count, r_residual)
                } else {
                    (model, inliers, num_inliers, residual)
                }
            }
            None => (model, inliers, num_inliers, residual),
        };

        tracing::debug!(iterations, num_inliers, total = n, residual, "ransac converged");

        RobustResult {
            model: Some(model),
            inliers,
            num_inliers,
            residual,
            iterations,
        }
    }

    fn score(&self, estimator: &M, model: &M::Model, data: &[D]) -> (Vec<bool>, usize, f64) {
        let mut inliers = vec![false; data.len()];
        let mut num_inliers = 0;
        let mut total_error = 0.0;

        for (j, d) in data.iter().enumerate() {
            let err = estimator.compute_error(model, d);
            if err < self.config.threshold {
                inliers[j] = true;
                num_inliers += 1;
                total_error += err;
            }
        }

        let residual = if num_inliers > 0 {
            total_error / num_inliers as f64
        } else {
            f64::INFINITY
        };
        (inliers, num_inliers, residual)
    }
}

/// Number of iterations needed to hit `confidence` given the observed inlier ratio.
pub fn adaptive_iterations(confidence: f64, num_inliers: usize, n: usize, k: usize) -> usize {
    if n == 0 || num_inliers == 0 {
        return usize::MAX;
    }
    let w = num_inliers as f64 / n as f64;
    let p_good = w.powi(k as i32);
    if p_good >= 1.0 {
        return 1;
    }
    let denom = (1.0 - p_good).ln();
    if denom >= 0.0 || !denom.is_finite() {
        return usize::MAX;
    }
    let iters = (1.0 - confidence.clamp(0.0, 1.0 - f64::EPSILON)).ln() / denom;
    if iters.is_finite() && iters >= 0.0 {
        iters.ceil() as usize
    } else {
        usize::MAX
    }
}
