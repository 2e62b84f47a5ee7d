//! Core primitives shared by the stitching crates.
//!
//! Keypoints, binary descriptors, feature matches and the generic robust
//! estimation engine live here so that detection, matching and geometry
//! crates agree on one set of types.

pub mod descriptor;
pub mod keypoint;
pub mod robust;
pub mod runtime;

pub use descriptor::*;
pub use keypoint::*;
pub use robust::*;
pub use runtime::*;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Index out of range: {index} (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}
