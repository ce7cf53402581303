use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::foundation::core::{Point, Viewport};
use crate::foundation::error::WarpResult;
use crate::grouping::rasterize::{CachedRange, RangeCache, WarpedRaster};
use crate::raster::buffer::RasterBuffer;
use crate::raster::composite::with_coverage;
use crate::tile::Tile;
use crate::transform::coordinate::invert_affine;

/// Something the display can draw into a screen-sized buffer.
pub trait Paintable: Send + Sync {
    /// Called once per paint cycle before [`paint`](Self::paint).
    fn pre_paint(&self, _viewport: &Viewport) {}

    /// `target` covers `viewport` in device pixels.
    fn paint(&self, target: &mut RasterBuffer, viewport: &Viewport) -> WarpResult<()>;
}

/// Paints a cached range's warped raster in place of its member tiles.
#[derive(Debug)]
pub struct RangePaintable {
    range: Arc<CachedRange>,
    pinned: Mutex<Option<Arc<WarpedRaster>>>,
}

impl RangePaintable {
    pub fn new(range: Arc<CachedRange>) -> Self {
        Self {
            range,
            pinned: Mutex::new(None),
        }
    }

    pub fn range(&self) -> &Arc<CachedRange> {
        &self.range
    }
}

impl Paintable for RangePaintable {
    fn pre_paint(&self, _viewport: &Viewport) {
        *self.pinned.lock().unwrap_or_else(PoisonError::into_inner) = Some(self.range.warped());
    }

    fn paint(&self, target: &mut RasterBuffer, viewport: &Viewport) -> WarpResult<()> {
        let warped = self
            .pinned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| self.range.warped());
        let src = &warped.raster;
        if src.is_empty() || target.is_empty() {
            return Ok(());
        }

        // Buffer pixels -> world at rasterization time -> current screen.
        let to_screen = viewport.world_to_screen()
            * self.range.viewport().buffer_to_world(self.range.pad());
        let inv = invert_affine(to_screen)?;
        let mode = self.range.blend_mode();
        let (sw, sh) = (f64::from(src.width()), f64::from(src.height()));
        for y in 0..target.height() {
            for x in 0..target.width() {
                let s = inv * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if !(s.x >= 0.0 && s.y >= 0.0 && s.x < sw && s.y < sh) {
                    continue;
                }
                let (sx, sy) = (s.x.floor() as u32, s.y.floor() as u32);
                let px = match &warped.mask {
                    Some(mask) => with_coverage(src.pixel(sx, sy), mask.get(sx, sy)),
                    None => src.pixel(sx, sy),
                };
                target.blend_pixel(x, y, px, mode);
            }
        }
        Ok(())
    }
}

/// Paints a single tile directly.
#[derive(Debug)]
pub struct TilePaintable {
    tile: Arc<dyn Tile>,
}

impl TilePaintable {
    pub fn new(tile: Arc<dyn Tile>) -> Self {
        Self { tile }
    }

    pub fn tile(&self) -> &Arc<dyn Tile> {
        &self.tile
    }
}

impl Paintable for TilePaintable {
    fn paint(&self, target: &mut RasterBuffer, viewport: &Viewport) -> WarpResult<()> {
        self.tile
            .render(target, viewport.world_to_screen(), self.tile.blend_mode())
    }
}

/// One entry of the display list after substitution.
#[derive(Debug)]
pub enum PaintItem {
    Tile(TilePaintable),
    Range(RangePaintable),
}

impl PaintItem {
    fn as_paintable(&self) -> &dyn Paintable {
        match self {
            Self::Tile(t) => t,
            Self::Range(r) => r,
        }
    }
}

impl Paintable for PaintItem {
    fn pre_paint(&self, viewport: &Viewport) {
        self.as_paintable().pre_paint(viewport);
    }

    fn paint(&self, target: &mut RasterBuffer, viewport: &Viewport) -> WarpResult<()> {
        self.as_paintable().paint(target, viewport)
    }
}

/// Replace every tile covered by a live cached range with that range, once per range.
pub fn substitute(cache: &RangeCache, items: &[Arc<dyn Tile>]) -> Vec<PaintItem> {
    let mut emitted = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for tile in items {
        match cache.range_for(tile.id()) {
            Some(range) if !range.is_flushed() => {
                if emitted.insert(Arc::as_ptr(range)) {
                    out.push(PaintItem::Range(RangePaintable::new(Arc::clone(range))));
                }
            }
            _ => out.push(PaintItem::Tile(TilePaintable::new(Arc::clone(tile)))),
        }
    }
    out
}

/// Run a full paint cycle over `items`.
pub fn paint_all(items: &[PaintItem], target: &mut RasterBuffer, viewport: &Viewport) -> WarpResult<()> {
    for item in items {
        item.pre_paint(viewport);
    }
    for item in items {
        item.paint(target, viewport)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/grouping/source.rs"]
mod tests;
