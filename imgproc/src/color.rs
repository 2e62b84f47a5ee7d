use image::{GrayImage, Rgb32FImage, RgbImage};
use rayon::prelude::*;
use rayon::ThreadPool;

pub fn convert_rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    convert_rgb_to_gray_in_pool(rgb, None)
}

/// BT.601 luma, truncated to u8.
pub fn convert_rgb_to_gray_in_pool(rgb: &RgbImage, pool: Option<&ThreadPool>) -> GrayImage {
    let run = || {
        let (w, h) = rgb.dimensions();
        let gray_data: Vec<u8> = rgb
            .as_raw()
            .par_chunks_exact(3)
            .map(|p| (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32) as u8)
            .collect();

        GrayImage::from_raw(w, h, gray_data).unwrap_or_else(|| GrayImage::new(w, h))
    };

    match pool {
        Some(p) => p.install(run),
        None => run(),
    }
}

/// Widens an 8-bit image to float samples in the same [0, 255] range.
pub fn rgb8_to_rgb32f(rgb: &RgbImage) -> Rgb32FImage {
    let (w, h) = rgb.dimensions();
    let data: Vec<f32> = rgb.as_raw().par_iter().map(|&v| v as f32).collect();
    Rgb32FImage::from_raw(w, h, data).unwrap_or_else(|| Rgb32FImage::new(w, h))
}

/// Rounds float samples back to 8 bits, clamping to [0, 255].
pub fn rgb32f_to_rgb8(img: &Rgb32FImage) -> RgbImage {
    let (w, h) = img.dimensions();
    let data: Vec<u8> = img
        .as_raw()
        .par_iter()
        .map(|&v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    RgbImage::from_raw(w, h, data).unwrap_or_else(|| RgbImage::new(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn gray_uses_bt601_weights() {
        let rgb = RgbImage::from_pixel(4, 3, Rgb([100, 150, 200]));
        let gray = convert_rgb_to_gray(&rgb);
        assert_eq!(gray.dimensions(), (4, 3));
        // 29.9 + 88.05 + 22.8 = 140.75
        assert!(gray.pixels().all(|p| p[0] == 140));
    }

    #[test]
    fn float_round_trip_clamps() {
        let rgb = RgbImage::from_pixel(2, 2, Rgb([0, 128, 255]));
        let mut f = rgb8_to_rgb32f(&rgb);
        assert_eq!(f.get_pixel(1, 1).0, [0.0, 128.0, 255.0]);

        f.put_pixel(0, 0, image::Rgb([-4.0, 127.6, 300.0]));
        let back = rgb32f_to_rgb8(&f);
        assert_eq!(back.get_pixel(0, 0).0, [0, 128, 255]);
        assert_eq!(back.get_pixel(1, 0).0, [0, 128, 255]);
    }
}
