use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::foundation::core::TileId;
use crate::raster::composite::BlendMode;
use crate::tile::Tile;

/// A run of z-consecutive, blend-compatible tiles flattened into one raster.
#[derive(Clone, Debug)]
pub struct Range {
    tiles: SmallVec<[Arc<dyn Tile>; 4]>,
    starts_at_bottom: bool,
    is_grayscale: bool,
}

impl Range {
    fn start(tile: Arc<dyn Tile>, starts_at_bottom: bool) -> Self {
        let is_grayscale = tile.is_grayscale();
        let mut tiles = SmallVec::new();
        tiles.push(tile);
        Self {
            tiles,
            starts_at_bottom,
            is_grayscale,
        }
    }

    fn push(&mut self, tile: Arc<dyn Tile>) {
        self.is_grayscale &= tile.is_grayscale();
        self.tiles.push(tile);
    }

    pub fn tiles(&self) -> &[Arc<dyn Tile>] {
        &self.tiles
    }

    pub fn ids(&self) -> impl Iterator<Item = TileId> + '_ {
        self.tiles.iter().map(|t| t.id())
    }

    /// Holds the bottommost visible tile, so nothing shows through it.
    pub fn starts_at_bottom(&self) -> bool {
        self.starts_at_bottom
    }

    pub fn is_grayscale(&self) -> bool {
        self.is_grayscale
    }

    /// Blend mode the flattened raster composites with.
    pub fn blend_mode(&self) -> BlendMode {
        self.tiles
            .first()
            .map_or(BlendMode::Normal, |t| t.blend_mode())
    }
}

impl PartialEq for Range {
    fn eq(&self, other: &Self) -> bool {
        self.starts_at_bottom == other.starts_at_bottom
            && self.is_grayscale == other.is_grayscale
            && self.ids().eq(other.ids())
    }
}

/// Result of partitioning a selection against the visible stack.
#[derive(Clone, Debug, Default)]
pub struct RangePlan {
    pub ranges: Vec<Range>,
    /// Selected tiles outside the viewport.
    pub offscreen: Vec<Arc<dyn Tile>>,
}

/// Partition `selection` (bottom to top) into ranges.
///
/// `visible` is every tile intersecting the viewport, bottom to top, selected or not. A new range
/// starts at the bottommost visible tile, wherever an unselected visible tile interrupts the run,
/// and around every tile with a non-normal blend mode.
pub fn build_ranges(selection: &[Arc<dyn Tile>], visible: &[Arc<dyn Tile>]) -> RangePlan {
    let position: HashMap<TileId, usize> = visible
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id(), i))
        .collect();

    let mut plan = RangePlan::default();
    let mut current: Option<Range> = None;
    let mut last: Option<(usize, BlendMode)> = None;

    for tile in selection {
        let Some(&i) = position.get(&tile.id()) else {
            plan.offscreen.push(Arc::clone(tile));
            continue;
        };
        let mode = tile.blend_mode();
        let split = match (last, current.as_ref()) {
            (_, None) | (None, _) => true,
            (Some((last_i, last_mode)), Some(_)) => {
                i == 0 || i != last_i + 1 || !mode.is_normal() || !last_mode.is_normal()
            }
        };
        if split {
            plan.ranges.extend(current.take());
            current = Some(Range::start(Arc::clone(tile), i == 0));
        } else if let Some(r) = current.as_mut() {
            r.push(Arc::clone(tile));
        }
        last = Some((i, mode));
    }
    plan.ranges.extend(current);
    plan
}

#[cfg(test)]
#[path = "../../tests/unit/grouping/range.rs"]
mod tests;
