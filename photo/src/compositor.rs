//! Canvas assembly, blending and cropping.

use crate::backend::PerspectiveWarper;
use crate::{BlendMask, Homography, Result, StitchError};
use cv_imgproc::{rgb32f_to_rgb8, rgb8_to_rgb32f};
use image::{imageops, Rgb32FImage, RgbImage};
use rayon::prelude::*;

/// Axis-aligned region of a canvas, `x..x + width` by `y..y + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Three-channel float layer the size of the output canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    layer: Rgb32FImage,
}

impl Canvas {
    pub fn blank(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(StitchError::Input(format!(
                "canvas must be non-empty, got {width}x{height}"
            )));
        }
        Ok(Self {
            layer: Rgb32FImage::new(width, height),
        })
    }

    /// Canvas with `image` copied into its top-left corner, zero elsewhere.
    pub fn with_image(image: &RgbImage, width: u32, height: u32) -> Result<Self> {
        if image.width() > width || image.height() > height {
            return Err(StitchError::DimensionMismatch(format!(
                "{}x{} image does not fit a {width}x{height} canvas",
                image.width(),
                image.height()
            )));
        }
        let mut canvas = Self::blank(width, height)?;
        imageops::replace(&mut canvas.layer, &rgb8_to_rgb32f(image), 0, 0);
        Ok(canvas)
    }

    pub fn from_layer(layer: Rgb32FImage) -> Result<Self> {
        if layer.width() == 0 || layer.height() == 0 {
            return Err(StitchError::Input("canvas layer is empty".into()));
        }
        Ok(Self { layer })
    }

    pub fn width(&self) -> u32 {
        self.layer.width()
    }

    pub fn height(&self) -> u32 {
        self.layer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.layer.dimensions()
    }

    pub fn as_image(&self) -> &Rgb32FImage {
        &self.layer
    }

    /// Multiplies every channel by the mask weight of its pixel.
    pub fn apply_mask(&mut self, mask: &BlendMask) -> Result<()> {
        if mask.dimensions() != self.dimensions() {
            return Err(StitchError::DimensionMismatch(format!(
                "mask is {:?} but canvas is {:?}",
                mask.dimensions(),
                self.dimensions()
            )));
        }
        let row_len = self.width() as usize * 3;
        let weights = mask.columns();
        self.layer
            .as_mut()
            .par_chunks_mut(row_len)
            .for_each(|row| {
                for (px, &w) in row.chunks_exact_mut(3).zip(weights) {
                    px.iter_mut().for_each(|v| *v *= w);
                }
            });
        Ok(())
    }

    /// Adds `other` pixel by pixel.
    pub fn add(&mut self, other: &Canvas) -> Result<()> {
        if other.dimensions() != self.dimensions() {
            return Err(StitchError::DimensionMismatch(format!(
                "cannot add a {:?} layer to a {:?} canvas",
                other.dimensions(),
                self.dimensions()
            )));
        }
        self.layer
            .as_mut()
            .par_iter_mut()
            .zip(other.layer.as_raw().par_iter())
            .for_each(|(a, &b)| *a += b);
        Ok(())
    }

    /// Rounds the canvas to 8 bits, clamping to [0, 255].
    pub fn to_rgb8(&self) -> RgbImage {
        rgb32f_to_rgb8(&self.layer)
    }

    /// Bounding box of pixels whose first channel is nonzero once rounded to
    /// 8 bits.
    pub fn content_bounds(&self) -> Option<CropRect> {
        content_bounds(&self.to_rgb8())
    }

    /// Rounds to 8 bits and crops to the content bounds of the rounded image.
    pub fn crop_to_content(&self) -> Result<(RgbImage, CropRect)> {
        let image = self.to_rgb8();
        let rect = content_bounds(&image).ok_or(StitchError::EmptyResult)?;
        let cropped = imageops::crop_imm(&image, rect.x, rect.y, rect.width, rect.height).to_image();
        Ok((cropped, rect))
    }
}

/// Bounding box of pixels whose first channel is not zero.
pub fn content_bounds(image: &RgbImage) -> Option<CropRect> {
    let width = image.width() as usize;
    if width == 0 {
        return None;
    }
    let rows: Vec<Option<(usize, usize)>> = image
        .as_raw()
        .par_chunks(width * 3)
        .map(|row| {
            let first = row.chunks_exact(3).position(|px| px[0] != 0)?;
            let last = row.chunks_exact(3).rposition(|px| px[0] != 0)?;
            Some((first, last))
        })
        .collect();

    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for (y, span) in rows.into_iter().enumerate() {
        let Some((x0, x1)) = span else { continue };
        bounds = Some(match bounds {
            None => (x0, x1, y, y),
            Some((min_x, max_x, min_y, _)) => (min_x.min(x0), max_x.max(x1), min_y, y),
        });
    }

    bounds.map(|(min_x, max_x, min_y, max_y)| CropRect {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

/// Canvas size for a stitch of `primary` and `secondary`: primary height by
/// the sum of the widths.
pub fn canvas_size(primary: &RgbImage, secondary: &RgbImage) -> (u32, u32) {
    (primary.width() + secondary.width(), primary.height())
}

/// Blends `primary` and the warped `secondary` into one canvas.
pub fn composite<W>(
    primary: &RgbImage,
    secondary: &RgbImage,
    homography: &Homography,
    smoothing_window: u32,
    warper: &W,
) -> Result<Canvas>
where
    W: PerspectiveWarper + ?Sized,
{
    let (width, height) = canvas_size(primary, secondary);
    let (primary_mask, secondary_mask) =
        BlendMask::pair(height, primary.width(), secondary.width(), smoothing_window);

    let mut canvas = Canvas::with_image(primary, width, height)?;
    canvas.apply_mask(&primary_mask)?;

    let warped = warper.warp(&rgb8_to_rgb32f(secondary), homography.matrix(), (width, height))?;
    if warped.dimensions() != (width, height) {
        return Err(StitchError::DimensionMismatch(format!(
            "warper produced {:?}, expected {:?}",
            warped.dimensions(),
            (width, height)
        )));
    }
    let mut layer = Canvas::from_layer(warped)?;
    layer.apply_mask(&secondary_mask)?;

    canvas.add(&layer)?;
    Ok(canvas)
}
