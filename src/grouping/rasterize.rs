use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;

use crate::foundation::core::{TileId, Viewport};
use crate::foundation::error::WarpResult;
use crate::grouping::range::{Range, RangePlan};
use crate::raster::buffer::{AlphaMask, PixelFormat, RasterBuffer};
use crate::raster::composite::BlendMode;
use crate::raster::pool::RasterPool;
use crate::tile::Tile;

/// Output of one warp pass over a cached range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarpedRaster {
    pub raster: RasterBuffer,
    pub mask: Option<AlphaMask>,
}

impl WarpedRaster {
    fn released() -> Self {
        Self {
            raster: RasterBuffer::new(0, 0, PixelFormat::Gray8),
            mask: None,
        }
    }
}

/// A range rasterized at one viewport, with its current warped output.
///
/// Source buffers never change after construction. Warped output is replaced wholesale by each
/// warp pass.
#[derive(Debug)]
pub struct CachedRange {
    range: Range,
    viewport: Viewport,
    pad: u32,
    source: RasterBuffer,
    source_mask: Option<AlphaMask>,
    warped: ArcSwap<WarpedRaster>,
    flushed: AtomicBool,
}

impl CachedRange {
    pub fn range(&self) -> &Range {
        &self.range
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn pad(&self) -> u32 {
        self.pad
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.range.blend_mode()
    }

    pub fn source(&self) -> &RasterBuffer {
        &self.source
    }

    pub fn source_mask(&self) -> Option<&AlphaMask> {
        self.source_mask.as_ref()
    }

    pub fn warped(&self) -> Arc<WarpedRaster> {
        self.warped.load_full()
    }

    /// Ignored once the range has been flushed.
    pub fn publish_warped(&self, warped: WarpedRaster) {
        if !self.is_flushed() {
            self.warped.store(Arc::new(warped));
        }
    }

    /// Drop the warped output; the range paints nothing afterwards.
    pub fn flush(&self) {
        self.flushed.store(true, Ordering::Release);
        self.warped.store(Arc::new(WarpedRaster::released()));
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::Acquire)
    }
}

/// Buffer format for a range: bottom ranges need no alpha, grayscale ones a single channel.
pub fn pixel_format_for(range: &Range) -> PixelFormat {
    match (range.starts_at_bottom(), range.is_grayscale()) {
        (true, true) => PixelFormat::Gray8,
        (true, false) => PixelFormat::Rgb8,
        (false, _) => PixelFormat::Rgba8Premul,
    }
}

/// Render `range` at `viewport` into a padded buffer.
pub fn rasterize_range(
    range: Range,
    viewport: &Viewport,
    pad: u32,
    pool: &mut RasterPool,
) -> WarpResult<CachedRange> {
    let (w, h) = viewport.padded_size(pad);
    let mut source = pool.borrow(w, h, pixel_format_for(&range));
    let to_buffer = viewport.world_to_buffer(pad);
    for tile in range.tiles() {
        tile.render(&mut source, to_buffer, BlendMode::Normal)?;
    }
    let source_mask = (!range.starts_at_bottom()).then(|| source.extract_alpha());
    let warped = WarpedRaster {
        raster: source.clone(),
        mask: source_mask.clone(),
    };
    Ok(CachedRange {
        range,
        viewport: *viewport,
        pad,
        source,
        source_mask,
        warped: ArcSwap::from_pointee(warped),
        flushed: AtomicBool::new(false),
    })
}

/// One installed generation of cached ranges.
#[derive(Debug)]
pub struct RangeCache {
    pub generation: u64,
    /// `None` until the first rebuild.
    pub viewport: Option<Viewport>,
    pub pad: u32,
    pub ranges: Vec<Arc<CachedRange>>,
    /// Selected tiles outside the viewport at rebuild time.
    pub offscreen: Vec<Arc<dyn Tile>>,
    by_tile: HashMap<TileId, usize>,
}

impl RangeCache {
    pub fn empty(pad: u32) -> Self {
        Self {
            generation: 0,
            viewport: None,
            pad,
            ranges: Vec::new(),
            offscreen: Vec::new(),
            by_tile: HashMap::new(),
        }
    }

    pub fn build(
        generation: u64,
        viewport: Viewport,
        pad: u32,
        plan: RangePlan,
        pool: &mut RasterPool,
    ) -> WarpResult<Self> {
        let mut ranges = Vec::with_capacity(plan.ranges.len());
        let mut by_tile = HashMap::new();
        for (i, range) in plan.ranges.into_iter().enumerate() {
            by_tile.extend(range.ids().map(|id| (id, i)));
            ranges.push(Arc::new(rasterize_range(range, &viewport, pad, pool)?));
        }
        Ok(Self {
            generation,
            viewport: Some(viewport),
            pad,
            ranges,
            offscreen: plan.offscreen,
            by_tile,
        })
    }

    pub fn range_for(&self, id: TileId) -> Option<&Arc<CachedRange>> {
        self.by_tile.get(&id).and_then(|&i| self.ranges.get(i))
    }

    /// Every tile the cache represents: range members bottom to top, then offscreen ones.
    pub fn tiles(&self) -> impl Iterator<Item = &Arc<dyn Tile>> + '_ {
        self.ranges
            .iter()
            .flat_map(|r| r.range().tiles())
            .chain(self.offscreen.iter())
    }

    pub fn flush(&self) {
        for r in &self.ranges {
            r.flush();
        }
    }

    /// Hand buffers of ranges nobody else holds back to `pool`.
    pub fn recycle(self, pool: &mut RasterPool) {
        for r in self.ranges {
            let Ok(r) = Arc::try_unwrap(r) else {
                continue;
            };
            if let Ok(w) = Arc::try_unwrap(r.warped.into_inner()) {
                if !w.raster.is_empty() {
                    pool.release(w.raster);
                }
            }
            pool.release(r.source);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/grouping/rasterize.rs"]
mod tests;
