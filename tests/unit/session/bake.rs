use super::*;
use crate::foundation::core::{LayerId, Rect, Vec2, Viewport};
use crate::grouping::range::build_ranges;
use crate::raster::buffer::{PixelFormat, RasterBuffer};
use crate::raster::pool::{RasterPool, RasterPoolOpts};
use crate::tile::{ImageTile, InMemoryUndoLog};

fn tile(id: u64, x: f64) -> Arc<dyn Tile> {
    Arc::new(
        ImageTile::new(
            TileId(id),
            LayerId(0),
            RasterBuffer::new(4, 4, PixelFormat::Rgba8Premul),
            Affine::translate((x, 2.0)),
        )
        .unwrap(),
    )
}

fn job(
    selection: &[Arc<dyn Tile>],
    visible: &[Arc<dyn Tile>],
    extra: Vec<Arc<dyn Tile>>,
    deformation: Deformation,
    undo: Arc<InMemoryUndoLog>,
) -> BakeJob {
    let vp = Viewport::new(Rect::new(0.0, 0.0, 20.0, 20.0), 1.0).unwrap();
    let mut pool = RasterPool::new(RasterPoolOpts::default());
    let cache = RangeCache::build(1, vp, 2, build_ranges(selection, visible), &mut pool).unwrap();
    BakeJob {
        cache: Arc::new(ArcSwap::from_pointee(cache)),
        extra,
        deformation: Arc::new(deformation),
        undo,
        rebuild_lock: Arc::new(Mutex::new(())),
    }
}

#[test]
fn translation_bake_moves_every_cached_tile() {
    let a = tile(0, 1.0);
    let b = tile(1, 8.0);
    let off = tile(2, 100.0);
    let undo = Arc::new(InMemoryUndoLog::new());
    let j = job(
        &[a.clone(), b.clone(), off.clone()],
        &[a.clone(), b.clone()],
        Vec::new(),
        Deformation::Translation(Vec2::new(5.0, -1.0)),
        undo.clone(),
    );
    let cache = j.cache.load_full();
    let report = j.run();

    assert!(report.is_complete());
    assert_eq!(report.succeeded, vec![TileId(0), TileId(1), TileId(2)]);
    assert_eq!(a.world_bounds(), Rect::new(6.0, 1.0, 10.0, 5.0));
    assert_eq!(off.world_bounds(), Rect::new(105.0, 1.0, 109.0, 5.0));
    assert!(cache.ranges.iter().all(|r| r.is_flushed()));

    let steps = undo.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].tiles[0].transforms, 0);
    assert_eq!(steps[1].tiles[0].transforms, 1);
    assert_eq!(steps[1].tiles[0].pyramid_revision, 1);
}

#[test]
fn extra_tiles_are_deduplicated() {
    let a = tile(0, 1.0);
    let c = tile(3, 12.0);
    let undo = Arc::new(InMemoryUndoLog::new());
    let j = job(
        &[a.clone()],
        &[a.clone()],
        vec![a.clone(), c.clone()],
        Deformation::Identity,
        undo.clone(),
    );
    let report = j.run();
    assert_eq!(report.succeeded, vec![TileId(0), TileId(3)]);
    assert_eq!(a.transform_chain().len(), 1);
    assert_eq!(undo.steps()[0].tiles.len(), 2);
}

#[test]
fn identity_bake_keeps_placement() {
    let a = tile(0, 3.0);
    let before = a.world_bounds();
    let undo = Arc::new(InMemoryUndoLog::new());
    job(&[a.clone()], &[a.clone()], Vec::new(), Deformation::Identity, undo).run();
    assert_eq!(a.world_bounds(), before);
}

#[test]
fn bake_task_reports_thread_result() {
    let task = BakeTask::spawn(BakeReport::default).unwrap();
    assert_eq!(task.wait().unwrap(), BakeReport::default());
}
