//! Overlap-biased sampling masks.
//!
//! Feature search is restricted to a staggered grid of tiles inside the part
//! of each image where the overlap is expected: the right side of the primary
//! image and the left side of the secondary.

use crate::{Result, StitchConfig, StitchError};
use image::GrayImage;
use rayon::prelude::*;
use std::ops::Range;

/// Value written into sampled mask pixels.
pub const SAMPLED: u8 = 255;

/// Edge of an image that is expected to overlap the other image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapSide {
    /// Primary image: overlap on its right edge.
    Right,
    /// Secondary image: overlap on its left edge.
    Left,
}

/// Binary mask, same size as its source image; nonzero pixels are searched.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingMask {
    mask: GrayImage,
}

impl SamplingMask {
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    pub fn is_sampled(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.mask.get_pixel(x, y)[0] != 0
    }

    pub fn sampled_count(&self) -> usize {
        self.mask.as_raw().iter().filter(|&&v| v != 0).count()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.mask
    }

    pub fn into_image(self) -> GrayImage {
        self.mask
    }
}

/// Columns of an image of `width` that may be sampled for the given side.
pub fn sampling_band(width: u32, side: OverlapSide, percentage: u32) -> Range<u32> {
    let percentage = percentage.min(100) as u64;
    let w = width as u64;
    match side {
        OverlapSide::Right => (w * (100 - percentage) / 100) as u32..width,
        OverlapSide::Left => 0..(w * percentage / 100) as u32,
    }
}

/// Builds the tiled sampling mask for an image of `width` x `height`.
///
/// Tile rows are `tile_size` pixels tall. Within the sampling band tile slots
/// start every `2 * tile_size` columns; even tile rows fill the first half of
/// each slot and odd tile rows the second half. Tiles are clipped to the band.
pub fn build_sampling_mask(
    width: u32,
    height: u32,
    side: OverlapSide,
    config: &StitchConfig,
) -> Result<SamplingMask> {
    if width == 0 || height == 0 {
        return Err(StitchError::Input(format!(
            "cannot build a sampling mask for a {width}x{height} image"
        )));
    }
    if config.tile_size == 0 {
        return Err(StitchError::InvalidConfig("tile_size must be non-zero".into()));
    }

    let tile = config.tile_size as usize;
    let band = sampling_band(width, side, config.sample_percentage);
    let even = tile_row_pattern(width as usize, &band, tile, 0);
    let odd = tile_row_pattern(width as usize, &band, tile, tile);

    let mut mask = GrayImage::new(width, height);
    mask.as_mut()
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let pattern = if (y / tile) % 2 == 0 { &even } else { &odd };
            row.copy_from_slice(pattern);
        });

    Ok(SamplingMask { mask })
}

fn tile_row_pattern(width: usize, band: &Range<u32>, tile: usize, shift: usize) -> Vec<u8> {
    let mut row = vec![0u8; width];
    let (start, end) = (band.start as usize, band.end as usize);

    for slot in (start..end).step_by(2 * tile) {
        let x0 = (slot + shift).min(end);
        let x1 = (slot + shift + tile).min(end);
        row[x0..x1].fill(SAMPLED);
    }
    row
}
