use super::*;

#[test]
fn opaque_formats_report_full_alpha() {
    let mut g = RasterBuffer::new(2, 1, PixelFormat::Gray8);
    g.set_pixel(1, 0, [77, 1, 2, 3]);
    assert_eq!(g.pixel(1, 0), [77, 77, 77, 255]);
    assert_eq!(g.pixel(0, 0), [0, 0, 0, 255]);

    let mut c = RasterBuffer::new(1, 1, PixelFormat::Rgb8);
    c.set_pixel(0, 0, [1, 2, 3, 4]);
    assert_eq!(c.pixel(0, 0), [1, 2, 3, 255]);
}

#[test]
fn extract_alpha_copies_channel() {
    let mut b = RasterBuffer::new(2, 2, PixelFormat::Rgba8Premul);
    b.set_pixel(0, 0, [10, 10, 10, 10]);
    b.set_pixel(1, 1, [200, 0, 0, 200]);
    let m = b.extract_alpha();
    assert_eq!(m.data(), &[10, 0, 0, 200]);

    let opaque = RasterBuffer::new(2, 1, PixelFormat::Rgb8).extract_alpha();
    assert_eq!(opaque.data(), &[255, 255]);
}

#[test]
fn from_raw_validates_length() {
    assert!(RasterBuffer::from_raw(2, 2, PixelFormat::Rgb8, vec![0; 12]).is_ok());
    assert!(RasterBuffer::from_raw(2, 2, PixelFormat::Rgb8, vec![0; 11]).is_err());
}

#[test]
fn blend_pixel_normal_over_transparent_is_source() {
    let mut b = RasterBuffer::new(1, 1, PixelFormat::Rgba8Premul);
    b.blend_pixel(0, 0, [40, 50, 60, 128], BlendMode::Normal);
    assert_eq!(b.pixel(0, 0), [40, 50, 60, 128]);
}

#[test]
fn to_rgba_image_unpremultiplies() {
    let mut b = RasterBuffer::new(1, 1, PixelFormat::Rgba8Premul);
    b.set_pixel(0, 0, [64, 0, 0, 128]);
    let img = b.to_rgba_image().unwrap();
    let px = img.get_pixel(0, 0).0;
    assert_eq!(px[3], 128);
    assert!((i32::from(px[0]) - 128).abs() <= 1);
}
