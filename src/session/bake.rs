use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use anyhow::Context;
use arc_swap::ArcSwap;

use crate::foundation::core::{Affine, TileId};
use crate::foundation::error::{WarpError, WarpResult};
use crate::grouping::rasterize::RangeCache;
use crate::tile::{EditStep, PyramidHandle, TRANSFORM_ATTRIBUTES, Tile, UndoLog};
use crate::transform::coordinate::{Conjugated, CoordinateTransform};
use crate::transform::mls::Deformation;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileFailure {
    pub tile: TileId,
    pub reason: String,
}

/// Per-tile outcome of a bake. Failed tiles do not stop the others.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BakeReport {
    pub succeeded: Vec<TileId>,
    pub failed: Vec<TileFailure>,
}

impl BakeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Inputs for folding a deformation into tiles.
pub(crate) struct BakeJob {
    /// Read under `rebuild_lock`, so no rebuild can slip in between bake and flush.
    pub(crate) cache: Arc<ArcSwap<RangeCache>>,
    pub(crate) extra: Vec<Arc<dyn Tile>>,
    pub(crate) deformation: Arc<Deformation>,
    pub(crate) undo: Arc<dyn UndoLog>,
    pub(crate) rebuild_lock: Arc<Mutex<()>>,
}

fn dedup_tiles<'a>(tiles: impl Iterator<Item = &'a Arc<dyn Tile>>) -> Vec<Arc<dyn Tile>> {
    let mut seen = HashSet::new();
    tiles
        .filter(|t| seen.insert(t.id()))
        .cloned()
        .collect()
}

/// `local → world`, deformation, `world → local` for one tile.
fn tile_transform(tile: &dyn Tile, deformation: &Arc<Deformation>) -> WarpResult<Conjugated> {
    let origin = tile.local_bounds().origin().to_vec2();
    let to_world = tile.affine() * Affine::translate(-origin);
    Conjugated::new(to_world, Arc::clone(deformation) as Arc<dyn CoordinateTransform>)
}

impl BakeJob {
    #[tracing::instrument(level = "info", skip_all)]
    pub(crate) fn run(self) -> BakeReport {
        let mut report = BakeReport::default();
        let (tiles, handles) = {
            let _rebuild = self
                .rebuild_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let cache = self.cache.load_full();
            let tiles = dedup_tiles(cache.tiles().chain(self.extra.iter()));
            tracing::debug!(generation = cache.generation, tiles = tiles.len(), "baking");
            self.undo
                .add_edit_step(EditStep::capture(&tiles, &TRANSFORM_ATTRIBUTES));

            let mut handles: Vec<PyramidHandle> = Vec::with_capacity(tiles.len());
            for tile in &tiles {
                let applied = tile_transform(tile.as_ref(), &self.deformation)
                    .and_then(|t| tile.append_transform(Arc::new(t)));
                match applied {
                    Ok(()) => handles.push(tile.regenerate_pyramid()),
                    Err(e) => handles.push(PyramidHandle::ready(tile.id(), Err(e))),
                }
            }
            cache.flush();
            (tiles, handles)
        };

        for handle in handles {
            let tile = handle.tile();
            match handle.wait() {
                Ok(_) => report.succeeded.push(tile),
                Err(e) => {
                    tracing::warn!(tile = tile.0, error = %e, "tile bake failed");
                    report.failed.push(TileFailure {
                        tile,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.undo
            .add_edit_step(EditStep::capture(&tiles, &TRANSFORM_ATTRIBUTES));
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "bake finished"
        );
        report
    }
}

/// A bake running on its own thread.
#[derive(Debug)]
pub struct BakeTask {
    handle: JoinHandle<BakeReport>,
}

impl BakeTask {
    pub(crate) fn spawn(f: impl FnOnce() -> BakeReport + Send + 'static) -> WarpResult<Self> {
        let handle = std::thread::Builder::new()
            .name("tilewarp-bake".to_owned())
            .spawn(f)
            .context("spawn bake thread")?;
        Ok(Self { handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn wait(self) -> WarpResult<BakeReport> {
        self.handle
            .join()
            .map_err(|_| WarpError::bake("bake thread panicked"))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/bake.rs"]
mod tests;
