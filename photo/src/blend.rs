//! Linear alpha masks across the seam.
//!
//! Every row of a blend mask is identical, so a mask is stored as one column
//! profile plus the canvas height.

use image::{ImageBuffer, Luma};

/// Single-channel weight grid of canvas size, values in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct BlendMask {
    columns: Vec<f32>,
    height: u32,
}

impl BlendMask {
    /// Builds the primary and secondary masks for a `height` x `(w1 + w2)`
    /// canvas.
    ///
    /// With `offset = window / 2` and `barrier = w1 - offset`, the ramp covers
    /// `[barrier - offset, barrier + offset)`. The ramp may start left of the
    /// canvas; only its visible columns are kept. The primary weight falls
    /// linearly from 1 to 0 across the ramp (both endpoints inclusive) and the
    /// secondary weight is `1 - primary` everywhere. A ramp shorter than two
    /// columns becomes a hard seam at `barrier`.
    pub fn pair(height: u32, w1: u32, w2: u32, window: u32) -> (BlendMask, BlendMask) {
        let width = (w1 + w2) as usize;
        let ramp = seam_ramp(w1, window);
        let n = ramp.end - ramp.start;

        let primary: Vec<f32> = (0..width as i64)
            .map(|c| {
                if n < 2 {
                    return if c < ramp.start { 1.0 } else { 0.0 };
                }
                let t = ((c - ramp.start) as f64 / (n - 1) as f64).clamp(0.0, 1.0);
                (1.0 - t) as f32
            })
            .collect();

        let secondary = primary.iter().map(|&p| 1.0 - p).collect();
        (
            BlendMask {
                columns: primary,
                height,
            },
            BlendMask {
                columns: secondary,
                height,
            },
        )
    }

    pub fn width(&self) -> u32 {
        self.columns.len() as u32
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height)
    }

    /// Weight at column `x`, shared by every row.
    pub fn column(&self, x: u32) -> f32 {
        self.columns[x as usize]
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        debug_assert!(y < self.height);
        self.column(x)
    }

    pub fn columns(&self) -> &[f32] {
        &self.columns
    }

    /// Expands the profile into a full grid.
    pub fn to_image(&self) -> ImageBuffer<Luma<f32>, Vec<f32>> {
        ImageBuffer::from_fn(self.width(), self.height, |x, _| Luma([self.column(x)]))
    }
}

/// Canvas columns covered by the linear ramp. The start is negative when the
/// window is wider than the primary image.
pub fn seam_ramp(w1: u32, window: u32) -> std::ops::Range<i64> {
    let offset = i64::from(window / 2);
    let barrier = i64::from(w1) - offset;
    barrier - offset..barrier + offset
}
