//! Panorama compositing
//!
//! Stitches two overlapping photographs into one panorama. The primary image
//! is expected to overlap on its right edge, the secondary on its left.
//!
//! # Pipeline
//!
//! - **Sampling masks**: staggered tiles confined to the expected overlap band
//! - **Correspondence filter**: Lowe ratio test over 2-NN candidates
//! - **Homography policy**: decides when robust estimation is worth calling
//! - **Blend masks**: linear alpha ramp across the seam
//! - **Compositor**: warp, weight, sum and crop
//!
//! Detection, matching, estimation and warping are collaborators behind the
//! traits in [`backend`]; [`Stitcher::new`] wires the ORB / brute-force /
//! RANSAC / bilinear defaults.
//!
//! # Example
//!
//! ```no_run
//! # use cv_photo::{StitchConfig, Stitcher};
//! # use image::RgbImage;
//! let left = RgbImage::new(600, 400);
//! let right = RgbImage::new(600, 400);
//! let stitcher = Stitcher::new(StitchConfig::default()).unwrap();
//! // let panorama = stitcher.stitch(&left, &right)?;
//! ```

pub mod backend;
pub mod blend;
pub mod codec;
pub mod compositor;
pub mod config;
pub mod correspondence;
pub mod error;
pub mod homography;
pub mod sampling;
/// Two-image stitching pipeline
pub mod stitcher;

pub use backend::*;
pub use blend::*;
pub use codec::*;
pub use compositor::*;
pub use config::*;
pub use correspondence::*;
pub use error::*;
pub use homography::*;
pub use sampling::*;
pub use stitcher::*;

pub type Result<T> = std::result::Result<T, StitchError>;
