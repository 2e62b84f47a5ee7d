//! Two-image panorama stitching.
//!
//! Re-exports the member crates under short names:
//!
//! - [`core`]: keypoints, descriptors, matches and robust estimation
//! - [`features`]: FAST, ORB, Hamming matching, RANSAC homographies
//! - [`imgproc`]: colour conversion and perspective warping
//! - [`photo`]: the stitching pipeline itself

pub use cv_core as core;
pub use cv_features as features;
pub use cv_imgproc as imgproc;
pub use cv_photo as photo;

pub use cv_photo::{Panorama, StitchConfig, StitchError, StitchErrorKind, Stitcher};

/// Initialize a single global Rayon thread pool for all CPU-parallel routines.
///
/// Call this once at application startup before stitching. Repeated calls
/// return the outcome of the first one.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `CV_STITCH_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> cv_core::Result<()> {
    cv_core::init_global_thread_pool(num_threads)
}
