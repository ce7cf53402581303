use super::*;
use crate::foundation::core::Vec2;

fn solid(w: u32, h: u32, px: [u8; 4]) -> RasterBuffer {
    let mut b = RasterBuffer::new(w, h, PixelFormat::Rgba8Premul);
    for y in 0..h {
        for x in 0..w {
            b.set_pixel(x, y, px);
        }
    }
    b
}

fn tile_at(x: f64, y: f64, w: u32, h: u32) -> ImageTile {
    ImageTile::new(
        TileId(1),
        LayerId(0),
        solid(w, h, [255, 0, 0, 255]),
        Affine::translate((x, y)),
    )
    .unwrap()
}

#[test]
fn renders_at_its_placement() {
    let t = tile_at(3.0, 2.0, 4, 2);
    let mut target = RasterBuffer::new(10, 6, PixelFormat::Rgba8Premul);
    t.render(&mut target, Affine::IDENTITY, BlendMode::Normal).unwrap();
    for y in 0..6 {
        for x in 0..10 {
            let inside = (3..7).contains(&x) && (2..4).contains(&y);
            assert_eq!(target.pixel(x, y)[3] == 255, inside, "({x},{y})");
        }
    }
    assert_eq!(t.world_bounds(), Rect::new(3.0, 2.0, 7.0, 4.0));
}

#[test]
fn appended_translation_moves_bounds_and_pixels() {
    let t = tile_at(0.0, 0.0, 2, 2);
    t.append_transform(Arc::new(Affine::translate((5.0, 1.0)))).unwrap();
    assert_eq!(t.local_bounds(), Rect::new(5.0, 1.0, 7.0, 3.0));
    assert_eq!(t.world_bounds(), Rect::new(5.0, 1.0, 7.0, 3.0));
    assert_eq!(t.state().transforms, 1);

    let mut target = RasterBuffer::new(8, 4, PixelFormat::Rgba8Premul);
    t.render(&mut target, Affine::IDENTITY, BlendMode::Normal).unwrap();
    assert_eq!(target.pixel(5, 1), [255, 0, 0, 255]);
    assert_eq!(target.pixel(0, 0), [0, 0, 0, 0]);
}

#[test]
fn non_affine_chain_renders_through_mesh() {
    #[derive(Debug)]
    struct Shift;
    impl CoordinateTransform for Shift {
        fn apply(&self, p: Point) -> Point {
            p + Vec2::new(2.0, 0.0)
        }
    }
    let t = tile_at(0.0, 0.0, 4, 4);
    t.append_transform(Arc::new(Shift)).unwrap();
    assert!(t.transform_chain().as_affine().is_none());

    let mut target = RasterBuffer::new(8, 4, PixelFormat::Rgba8Premul);
    t.render(&mut target, Affine::IDENTITY, BlendMode::Normal).unwrap();
    assert_eq!(target.pixel(1, 1)[3], 0);
    assert_eq!(target.pixel(2, 1)[3], 255);
    assert_eq!(target.pixel(5, 3)[3], 255);
    assert_eq!(target.pixel(6, 1)[3], 0);
}

#[test]
fn pyramid_regeneration_builds_levels() {
    let t = tile_at(0.0, 0.0, 80, 40);
    let before = t.state().pyramid_revision;
    let levels = t.regenerate_pyramid().wait().unwrap();
    // 80 -> 40 -> 20
    assert_eq!(levels, 3);
    assert_eq!(t.state().pyramid_revision, before + 1);
    let l1 = t.pyramid_level(1).unwrap();
    assert_eq!((l1.width(), l1.height()), (40, 20));
    assert_eq!(l1.pixel(3, 3), [255, 0, 0, 255]);
}

#[test]
fn grayscale_detection_and_builders() {
    let img = image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(2, 2, image::Luma([90])));
    let t = ImageTile::from_image(TileId(2), LayerId(0), &img, Affine::IDENTITY).unwrap();
    assert!(t.is_grayscale());
    assert_eq!(t.pixels().pixel(0, 0), [90, 90, 90, 255]);

    let t = t.with_blend_mode(BlendMode::Multiply).unwrap();
    assert_eq!(t.blend_mode(), BlendMode::Multiply);
    let shared = t.clone();
    assert!(t.with_grayscale(false).is_err());
    drop(shared);
}

#[test]
fn rejects_singular_placement() {
    let err = ImageTile::new(
        TileId(3),
        LayerId(0),
        solid(1, 1, [0, 0, 0, 255]),
        Affine::scale_non_uniform(1.0, 0.0),
    );
    assert!(err.is_err());
}
