//! FAST-9 corner detection restricted to a region-of-interest mask.

use crate::mask_allows;
use cv_core::{KeyPoint, KeyPoints};
use image::GrayImage;
use rayon::prelude::*;

/// Contiguous arc length a corner needs on the 16-pixel circle.
pub const FAST_ARC_LENGTH: usize = 9;

/// Bresenham circle of radius 3, clockwise from the top.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

const BORDER: u32 = 3;

/// Detects FAST-9 corners on pixels where `mask` is non-zero.
///
/// Corners are scored by the sum of absolute differences beyond the threshold
/// and thinned with 3x3 non-maximum suppression. Keypoints come back in
/// raster order with `response` set to the score.
pub fn fast_detect(image: &GrayImage, threshold: u8, mask: Option<&GrayImage>) -> KeyPoints {
    let (w, h) = image.dimensions();
    if w <= 2 * BORDER || h <= 2 * BORDER {
        return KeyPoints::new();
    }

    let width = w as usize;
    let mut scores = vec![0u32; width * h as usize];

    scores
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            if y < BORDER || y >= h - BORDER {
                return;
            }
            for x in BORDER..w - BORDER {
                if !mask_allows(mask, x, y) {
                    continue;
                }
                if let Some(score) = fast_score(image, x, y, threshold) {
                    row[x as usize] = score;
                }
            }
        });

    let rows: Vec<Vec<KeyPoint>> = (BORDER..h - BORDER)
        .into_par_iter()
        .map(|y| {
            let y = y as usize;
            (BORDER as usize..width - BORDER as usize)
                .filter(|&x| scores[y * width + x] > 0 && is_local_max(&scores, width, x, y))
                .map(|x| {
                    KeyPoint::new(x as f64, y as f64).with_response(scores[y * width + x] as f64)
                })
                .collect()
        })
        .collect();

    KeyPoints::from(rows.into_iter().flatten().collect::<Vec<_>>())
}

/// FAST score at `(x, y)`, or `None` when the pixel is not a corner.
///
/// The caller guarantees a 3-pixel margin around `(x, y)`.
pub fn fast_score(image: &GrayImage, x: u32, y: u32, threshold: u8) -> Option<u32> {
    let width = image.width() as usize;
    let raw = image.as_raw();
    let center = raw[y as usize * width + x as usize] as i32;
    let t = threshold as i32;

    let mut ring = [0i32; 16];
    for (slot, &(dx, dy)) in ring.iter_mut().zip(CIRCLE.iter()) {
        let px = (x as i32 + dx) as usize;
        let py = (y as i32 + dy) as usize;
        *slot = raw[py * width + px] as i32;
    }

    let brighter = longest_arc(&ring, |v| v > center + t);
    let darker = longest_arc(&ring, |v| v < center - t);
    if brighter < FAST_ARC_LENGTH && darker < FAST_ARC_LENGTH {
        return None;
    }

    let bright_sad: i32 = ring
        .iter()
        .filter(|&&v| v > center + t)
        .map(|&v| v - center - t)
        .sum();
    let dark_sad: i32 = ring
        .iter()
        .filter(|&&v| v < center - t)
        .map(|&v| center - t - v)
        .sum();

    Some(bright_sad.max(dark_sad) as u32)
}

fn longest_arc(ring: &[i32; 16], pred: impl Fn(i32) -> bool) -> usize {
    let mut best = 0;
    let mut run = 0;
    // Walk the circle twice so arcs that wrap past index 15 are counted.
    for i in 0..32 {
        if pred(ring[i % 16]) {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best.min(16)
}

/// Ties are broken in favour of the earliest pixel in raster order.
fn is_local_max(scores: &[u32], width: usize, x: usize, y: usize) -> bool {
    let idx = y * width + x;
    let s = scores[idx];
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nidx = ((y as i32 + dy) as usize) * width + (x as i32 + dx) as usize;
            let n = scores[nidx];
            if n > s || (n == s && nidx < idx) {
                return false;
            }
        }
    }
    true
}
