use cv_imgproc::*;
use image::{Rgb, Rgb32FImage, RgbImage};
use nalgebra::{Matrix3, Point2, Vector2};

#[test]
fn test_rgb_float_round_trip() {
    let rgb = RgbImage::from_fn(13, 7, |x, y| Rgb([x as u8 * 19, y as u8 * 36, 255]));
    let float = rgb8_to_rgb32f(&rgb);
    assert_eq!(float.get_pixel(12, 6).0, [228.0, 216.0, 255.0]);
    assert_eq!(rgb32f_to_rgb8(&float), rgb);
}

#[test]
fn test_float_to_rgb_clamps_and_rounds() {
    let mut img = Rgb32FImage::new(1, 1);
    img.put_pixel(0, 0, Rgb([-4.0, 127.5, 300.0]));
    assert_eq!(rgb32f_to_rgb8(&img).get_pixel(0, 0).0, [0, 128, 255]);
}

#[test]
fn test_warp_translation_matches_shift() {
    let src = rgb8_to_rgb32f(&RgbImage::from_fn(20, 10, |x, y| {
        Rgb([(x * 10 + 5) as u8, (y * 20 + 3) as u8, 9])
    }));
    let h = Matrix3::new_translation(&Vector2::new(15.0, 0.0));
    let out = warp_perspective_rgb32f(&src, &h, 40, 10).unwrap();

    for y in 0..10 {
        for x in 0..20 {
            assert_eq!(out.get_pixel(x + 15, y), src.get_pixel(x, y));
        }
        assert_eq!(out.get_pixel(14, y).0, [0.0; 3]);
        assert_eq!(out.get_pixel(35, y).0, [0.0; 3]);
    }
}

#[test]
fn test_warp_scale_uses_inverse_mapping() {
    let src = rgb8_to_rgb32f(&RgbImage::from_fn(8, 8, |x, _| Rgb([(x * 30) as u8, 0, 0])));
    let h = Matrix3::new(2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0);
    let out = warp_perspective_rgb32f(&src, &h, 16, 16).unwrap();

    // Destination x samples source x / 2.
    assert_eq!(out.get_pixel(4, 4)[0], 60.0);
    assert_eq!(out.get_pixel(5, 4)[0], 75.0);
}

#[test]
fn test_warp_fractional_shift_blends_columns() {
    let src = rgb8_to_rgb32f(&RgbImage::from_fn(4, 4, |x, _| Rgb([(x * 40) as u8, 0, 0])));
    let h = Matrix3::new_translation(&Vector2::new(0.5, 0.0));
    let out = warp_perspective_rgb32f(&src, &h, 6, 4).unwrap();
    // Destination x samples source x - 0.5; the left edge blends with black.
    assert_eq!(out.get_pixel(0, 0)[0], 0.0);
    assert_eq!(out.get_pixel(1, 0)[0], 20.0);
    assert_eq!(out.get_pixel(2, 0)[0], 60.0);
    assert_eq!(out.get_pixel(4, 0)[0], 60.0);
    assert_eq!(out.get_pixel(5, 0)[0], 0.0);
}

#[test]
fn test_transform_point_projective() {
    let h = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.5, 0.0, 1.0);
    let p = transform_point(&h, &Point2::new(2.0, 4.0)).unwrap();
    assert!((p.x - 1.0).abs() < 1e-12 && (p.y - 2.0).abs() < 1e-12);
    assert!(transform_point(&h, &Point2::new(-2.0, 0.0)).is_none());
}
