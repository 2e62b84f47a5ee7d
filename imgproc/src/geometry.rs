use crate::{validate_image_size, ImgprocError, Result};
use image::Rgb32FImage;
use nalgebra::{Matrix3, Point2};
use rayon::prelude::*;

const CHANNELS: usize = 3;

/// Source coordinates beyond this magnitude are treated as outside the image.
const MAX_SOURCE_COORD: f64 = 1e9;

fn sample_pixel(img: &Rgb32FImage, x: isize, y: isize) -> [f32; CHANNELS] {
    let width = img.width() as isize;
    let height = img.height() as isize;
    if x < 0 || y < 0 || x >= width || y >= height {
        return [0.0; CHANNELS];
    }
    let base = (y as usize * width as usize + x as usize) * CHANNELS;
    let raw = img.as_raw();
    [raw[base], raw[base + 1], raw[base + 2]]
}

/// Bilinear sample at a sub-pixel position; taps outside the image read zero.
fn bilinear_sample(src: &Rgb32FImage, x: f64, y: f64) -> [f32; CHANNELS] {
    if !(x.abs() < MAX_SOURCE_COORD && y.abs() < MAX_SOURCE_COORD) {
        return [0.0; CHANNELS];
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = (x - x0) as f32;
    let fy = (y - y0) as f32;
    let (x0, y0) = (x0 as isize, y0 as isize);

    let v00 = sample_pixel(src, x0, y0);
    let v10 = sample_pixel(src, x0 + 1, y0);
    let v01 = sample_pixel(src, x0, y0 + 1);
    let v11 = sample_pixel(src, x0 + 1, y0 + 1);

    let mut out = [0.0; CHANNELS];
    for c in 0..CHANNELS {
        let v0 = v00[c] * (1.0 - fx) + v10[c] * fx;
        let v1 = v01[c] * (1.0 - fx) + v11[c] * fx;
        out[c] = v0 * (1.0 - fy) + v1 * fy;
    }
    out
}

/// Warps `src` into a `width` x `height` canvas.
///
/// `homography` maps source coordinates to destination coordinates; every
/// destination pixel is filled by bilinear sampling of the source at the
/// inverse-mapped position. Destination pixels whose preimage lies outside
/// the source stay black.
pub fn warp_perspective_rgb32f(
    src: &Rgb32FImage,
    homography: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> Result<Rgb32FImage> {
    validate_image_size(width, height)?;
    let inverse = homography.try_inverse().ok_or_else(|| {
        ImgprocError::AlgorithmError("homography is not invertible".to_string())
    })?;

    let mut dst = Rgb32FImage::new(width, height);
    let row_len = width as usize * CHANNELS;

    dst.as_mut()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let Some(src_pt) = transform_point(&inverse, &Point2::new(x as f64, y as f64))
                else {
                    continue;
                };
                let val = bilinear_sample(src, src_pt.x, src_pt.y);
                row[x * CHANNELS..(x + 1) * CHANNELS].copy_from_slice(&val);
            }
        });

    Ok(dst)
}

/// Projects `pt` through `matrix`; `None` for points at infinity.
pub fn transform_point(matrix: &Matrix3<f64>, pt: &Point2<f64>) -> Option<Point2<f64>> {
    let x = pt.x;
    let y = pt.y;

    let w = matrix[(2, 0)] * x + matrix[(2, 1)] * y + matrix[(2, 2)];
    if w.abs() <= 1e-12 {
        return None;
    }

    Some(Point2::new(
        (matrix[(0, 0)] * x + matrix[(0, 1)] * y + matrix[(0, 2)]) / w,
        (matrix[(1, 0)] * x + matrix[(1, 1)] * y + matrix[(1, 2)]) / w,
    ))
}
