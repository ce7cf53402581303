use super::*;
use crate::foundation::core::{Affine, LayerId, Rect, TileId};
use crate::grouping::range::build_ranges;
use crate::raster::buffer::PixelFormat;
use crate::raster::pool::{RasterPool, RasterPoolOpts};
use crate::tile::ImageTile;

fn tile(id: u64, x: f64, color: [u8; 4]) -> Arc<dyn Tile> {
    let mut px = RasterBuffer::new(3, 3, PixelFormat::Rgba8Premul);
    for y in 0..3 {
        for xx in 0..3 {
            px.set_pixel(xx, y, color);
        }
    }
    Arc::new(ImageTile::new(TileId(id), LayerId(0), px, Affine::translate((x, 1.0))).unwrap())
}

fn viewport() -> Viewport {
    Viewport::new(Rect::new(0.0, 0.0, 12.0, 6.0), 1.0).unwrap()
}

fn cache_for(selection: &[Arc<dyn Tile>], visible: &[Arc<dyn Tile>]) -> RangeCache {
    let mut pool = RasterPool::new(RasterPoolOpts::default());
    RangeCache::build(1, viewport(), 4, build_ranges(selection, visible), &mut pool).unwrap()
}

#[test]
fn substitution_dedups_ranges_and_keeps_uncovered_tiles() {
    let a = tile(0, 0.0, [255, 0, 0, 255]);
    let b = tile(1, 2.0, [0, 255, 0, 255]);
    let c = tile(2, 4.0, [0, 0, 255, 255]);
    let d = tile(3, 6.0, [9, 9, 9, 255]);
    let all = vec![a.clone(), b.clone(), c.clone(), d.clone()];
    // c is not selected: a+b and d form separate ranges.
    let cache = cache_for(&[a, b, d], &all);
    assert_eq!(cache.ranges.len(), 2);

    let items = substitute(&cache, &all);
    let kinds: Vec<&str> = items
        .iter()
        .map(|i| match i {
            PaintItem::Tile(_) => "tile",
            PaintItem::Range(_) => "range",
        })
        .collect();
    assert_eq!(kinds, vec!["range", "tile", "range"]);
    match &items[1] {
        PaintItem::Tile(t) => assert_eq!(t.tile().id(), TileId(2)),
        PaintItem::Range(_) => unreachable!(),
    }
}

#[test]
fn flushed_ranges_fall_back_to_tiles() {
    let a = tile(0, 0.0, [255, 0, 0, 255]);
    let cache = cache_for(&[a.clone()], &[a.clone()]);
    cache.flush();
    let items = substitute(&cache, &[a]);
    assert!(matches!(items[0], PaintItem::Tile(_)));
}

#[test]
fn unwarped_ranges_paint_like_their_tiles() {
    let a = tile(0, 1.0, [255, 0, 0, 255]);
    let b = tile(1, 2.0, [0, 128, 0, 128]);
    let c = tile(2, 7.0, [10, 20, 30, 255]);
    let all = vec![a.clone(), b.clone(), c.clone()];
    let cache = cache_for(&[a.clone(), b.clone()], &all);
    let vp = viewport();
    let (w, h) = vp.screen_size();

    let mut via_ranges = RasterBuffer::new(w, h, PixelFormat::Rgba8Premul);
    paint_all(&substitute(&cache, &all), &mut via_ranges, &vp).unwrap();

    // The bottom range is opaque, so compare against tiles over opaque black.
    let mut direct = RasterBuffer::new(w, h, PixelFormat::Rgba8Premul);
    for y in 0..h {
        for x in 0..w {
            direct.set_pixel(x, y, [0, 0, 0, 255]);
        }
    }
    let plain: Vec<PaintItem> = all
        .iter()
        .map(|t| PaintItem::Tile(TilePaintable::new(t.clone())))
        .collect();
    paint_all(&plain, &mut direct, &vp).unwrap();

    assert_eq!(via_ranges, direct);
}

#[test]
fn masked_range_paints_with_coverage() {
    let a = tile(0, 0.0, [255, 0, 0, 255]);
    let b = tile(1, 5.0, [0, 0, 200, 200]);
    let all = vec![a.clone(), b.clone()];
    // Only b is selected; it sits above a and keeps an alpha mask.
    let cache = cache_for(&[b.clone()], &all);
    assert!(cache.ranges[0].source_mask().is_some());

    let vp = viewport();
    let (w, h) = vp.screen_size();
    let mut target = RasterBuffer::new(w, h, PixelFormat::Rgba8Premul);
    paint_all(&substitute(&cache, &all), &mut target, &vp).unwrap();
    assert_eq!(target.pixel(6, 2), [0, 0, 200, 200]);
    assert_eq!(target.pixel(1, 2), [255, 0, 0, 255]);
    assert_eq!(target.pixel(10, 2), [0, 0, 0, 0]);
}
