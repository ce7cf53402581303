//! Tiles and the collaborators the pipeline reads them through.

pub(crate) mod collab;
pub(crate) mod image_tile;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crossbeam_channel::{Receiver, bounded};

use crate::foundation::core::{Affine, LayerId, Point, Rect, TileId};
use crate::foundation::error::{WarpError, WarpResult};
use crate::raster::buffer::RasterBuffer;
use crate::raster::composite::BlendMode;
use crate::transform::coordinate::{CoordinateTransform, TransformChain};

/// Snapshot of the tile attributes a transform change affects.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct TileState {
    pub id: TileId,
    pub affine: Affine,
    pub bounds: Rect,
    pub transforms: usize,
    pub pyramid_revision: u64,
}

/// An externally owned raster element placed in world space.
///
/// Pixel coordinates go through [`transform_chain`](Self::transform_chain) into local space, whose
/// bounding box is [`local_bounds`](Self::local_bounds). [`affine`](Self::affine) places that box,
/// relative to its own origin, in world space.
pub trait Tile: Send + Sync + fmt::Debug {
    fn id(&self) -> TileId;

    fn layer(&self) -> LayerId;

    fn blend_mode(&self) -> BlendMode;

    /// Single-channel 8/16-bit source.
    fn is_grayscale(&self) -> bool;

    fn local_bounds(&self) -> Rect;

    fn affine(&self) -> Affine;

    fn world_bounds(&self) -> Rect {
        let size = self.local_bounds().size();
        self.affine()
            .transform_rect_bbox(Rect::from_origin_size(Point::ORIGIN, size))
    }

    fn transform_chain(&self) -> TransformChain;

    /// Append to the chain; placement is adjusted so untouched pixels stay where they were.
    fn append_transform(&self, t: Arc<dyn CoordinateTransform>) -> WarpResult<()>;

    /// Composite the tile into `target`, `to_target` mapping world to target pixels.
    fn render(&self, target: &mut RasterBuffer, to_target: Affine, mode: BlendMode) -> WarpResult<()>;

    /// Start rebuilding the resampled pyramid from the current chain.
    fn regenerate_pyramid(&self) -> PyramidHandle;

    fn state(&self) -> TileState;
}

/// Completion handle for a background pyramid rebuild.
#[derive(Debug)]
pub struct PyramidHandle {
    tile: TileId,
    rx: Receiver<WarpResult<usize>>,
}

impl PyramidHandle {
    /// Run `job` on the rayon pool. A panicking job resolves the handle with an error.
    pub fn spawn<F>(tile: TileId, job: F) -> Self
    where
        F: FnOnce() -> WarpResult<usize> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        rayon::spawn(move || {
            let res = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                Err(WarpError::bake(format!("pyramid job for tile {} panicked", tile.0)))
            });
            let _ = tx.send(res);
        });
        Self { tile, rx }
    }

    /// Already-resolved handle.
    pub fn ready(tile: TileId, result: WarpResult<usize>) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(result);
        Self { tile, rx }
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }

    /// Block until the rebuild finishes; `Ok` carries the number of levels.
    pub fn wait(self) -> WarpResult<usize> {
        self.rx.recv().unwrap_or_else(|_| {
            Err(WarpError::bake(format!(
                "pyramid job for tile {} dropped its handle",
                self.tile.0
            )))
        })
    }
}

pub use collab::{
    DisplayCanvas, EditStep, InMemoryIndex, InMemoryUndoLog, RecordingCanvas, TRANSFORM_ATTRIBUTES,
    TileIndex, UndoLog,
};
pub use image_tile::ImageTile;
