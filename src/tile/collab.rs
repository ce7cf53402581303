use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::foundation::core::{LayerId, Rect, TileId, Viewport};
use crate::tile::{Tile, TileState};

/// Spatial lookup of tiles in world space.
pub trait TileIndex: Send + Sync {
    /// Tiles whose world bounds intersect `rect`, bottom to top.
    fn find_visible(&self, rect: Rect) -> Vec<Arc<dyn Tile>>;

    /// Stacking position of a tile, `None` if it is not indexed.
    fn z_index(&self, id: TileId) -> Option<usize>;

    /// Every tile of `layer`, bottom to top.
    fn layer_tiles(&self, layer: LayerId) -> Vec<Arc<dyn Tile>>;
}

/// Vector-backed index, stacking order is insertion order.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    tiles: RwLock<Vec<Arc<dyn Tile>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, tile: Arc<dyn Tile>) {
        self.tiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tile);
    }

    pub fn all(&self) -> Vec<Arc<dyn Tile>> {
        self.tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TileIndex for InMemoryIndex {
    fn find_visible(&self, rect: Rect) -> Vec<Arc<dyn Tile>> {
        self.tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| !t.world_bounds().intersect(rect).is_zero_area())
            .cloned()
            .collect()
    }

    fn z_index(&self, id: TileId) -> Option<usize> {
        self.tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .position(|t| t.id() == id)
    }

    fn layer_tiles(&self, layer: LayerId) -> Vec<Arc<dyn Tile>> {
        self.tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| t.layer() == layer)
            .cloned()
            .collect()
    }
}

/// Attributes a transform change touches.
pub const TRANSFORM_ATTRIBUTES: [&str; 4] = ["pixels", "affine", "width", "height"];

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct EditStep {
    pub attributes: Vec<&'static str>,
    pub tiles: Vec<TileState>,
}

impl EditStep {
    pub fn capture(tiles: &[Arc<dyn Tile>], attributes: &[&'static str]) -> Self {
        Self {
            attributes: attributes.to_vec(),
            tiles: tiles.iter().map(|t| t.state()).collect(),
        }
    }
}

pub trait UndoLog: Send + Sync {
    fn add_edit_step(&self, step: EditStep);
}

#[derive(Debug, Default)]
pub struct InMemoryUndoLog {
    steps: Mutex<Vec<EditStep>>,
}

impl InMemoryUndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<EditStep> {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl UndoLog for InMemoryUndoLog {
    fn add_edit_step(&self, step: EditStep) {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(step);
    }
}

/// The surface the preview is shown on.
pub trait DisplayCanvas: Send + Sync {
    fn request_repaint(&self);

    fn viewport(&self) -> Viewport;
}

/// Canvas that only counts repaint requests.
#[derive(Debug)]
pub struct RecordingCanvas {
    viewport: Mutex<Viewport>,
    repaints: AtomicU64,
}

impl RecordingCanvas {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport: Mutex::new(viewport),
            repaints: AtomicU64::new(0),
        }
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        *self.viewport.lock().unwrap_or_else(PoisonError::into_inner) = viewport;
    }

    pub fn repaint_count(&self) -> u64 {
        self.repaints.load(Ordering::Acquire)
    }
}

impl DisplayCanvas for RecordingCanvas {
    fn request_repaint(&self) {
        self.repaints.fetch_add(1, Ordering::AcqRel);
    }

    fn viewport(&self) -> Viewport {
        *self.viewport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tile/collab.rs"]
mod tests;
