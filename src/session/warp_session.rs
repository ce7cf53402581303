use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use crate::foundation::core::{LayerId, Point, Rect, Viewport};
use crate::foundation::error::{WarpError, WarpResult};
use crate::grouping::range::build_ranges;
use crate::grouping::rasterize::RangeCache;
use crate::grouping::source::{PaintItem, substitute};
use crate::raster::pool::{RasterPool, RasterPoolOpts, RasterPoolStats};
use crate::session::bake::{BakeJob, BakeReport, BakeTask};
use crate::session::editor::{ControlPointEditor, Modifiers, PressOutcome};
use crate::session::scheduler::Worker;
use crate::tile::{DisplayCanvas, Tile, TileIndex, UndoLog};
use crate::transform::engine::{EngineOpts, Interpolation, MeshTransformEngine, PassOutcome};
use crate::transform::mls::ControlPoint;

/// Session configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarpSessionOpts {
    /// Margin, in device pixels, added on every side of range buffers.
    pub pad: u32,
    /// Mesh cells along the shorter side of a buffer.
    pub mesh_subdivisions: u32,
    /// Moving-least-squares stiffness.
    pub alpha: f64,
    /// On-screen control-point capture radius.
    pub capture_radius_px: f64,
    pub interpolation: Interpolation,
    pub pool: RasterPoolOpts,
}

impl Default for WarpSessionOpts {
    fn default() -> Self {
        Self {
            pad: 100,
            mesh_subdivisions: 32,
            alpha: 1.0,
            capture_radius_px: 8.0,
            interpolation: Interpolation::Nearest,
            pool: RasterPoolOpts::default(),
        }
    }
}

impl WarpSessionOpts {
    /// Largest accepted `pad`.
    pub const MAX_PAD: u32 = 4096;

    pub fn validate(&self) -> WarpResult<()> {
        if self.pad > Self::MAX_PAD {
            return Err(WarpError::validation(format!(
                "pad must be <= {}",
                Self::MAX_PAD
            )));
        }
        if self.mesh_subdivisions == 0 {
            return Err(WarpError::validation("mesh_subdivisions must be >= 1"));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(WarpError::validation("alpha must be finite and > 0"));
        }
        if !(self.capture_radius_px.is_finite() && self.capture_radius_px > 0.0) {
            return Err(WarpError::validation("capture_radius_px must be finite and > 0"));
        }
        Ok(())
    }

    fn engine_opts(&self) -> EngineOpts {
        EngineOpts {
            mesh_subdivisions: self.mesh_subdivisions,
            alpha: self.alpha,
            interpolation: self.interpolation,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub rebuilds: u64,
    pub passes_completed: u64,
    pub passes_abandoned: u64,
    pub passes_skipped: u64,
    pub generation: u64,
    pub pool: RasterPoolStats,
}

#[derive(Default)]
struct Counters {
    rebuilds: AtomicU64,
    passes_completed: AtomicU64,
    passes_abandoned: AtomicU64,
    passes_skipped: AtomicU64,
}

/// State shared by the workers, the session handle and the bake.
struct Core {
    opts: WarpSessionOpts,
    engine: MeshTransformEngine,
    index: Arc<dyn TileIndex>,
    canvas: Arc<dyn DisplayCanvas>,
    selection: Vec<Arc<dyn Tile>>,
    cache: Arc<ArcSwap<RangeCache>>,
    generation: AtomicU64,
    points: ArcSwap<Vec<ControlPoint>>,
    rebuild_lock: Arc<Mutex<()>>,
    /// Only the updater touches the pool; readers see the snapshot taken after each rebuild.
    pool: Mutex<RasterPool>,
    pool_stats: ArcSwap<RasterPoolStats>,
    counters: Counters,
    finished: AtomicBool,
}

impl Core {
    #[tracing::instrument(level = "debug", skip(self), fields(zoom = viewport.zoom))]
    fn rebuild(&self, viewport: Viewport) -> bool {
        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.finished.load(Ordering::Acquire) {
            return false;
        }

        let visible = self.index.find_visible(viewport.rect);
        let plan = build_ranges(&self.selection, &visible);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let built = {
            let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
            RangeCache::build(generation, viewport, self.opts.pad, plan, &mut pool)
        };
        let cache = match built {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(generation, error = %e, "range rebuild failed");
                return false;
            }
        };
        tracing::debug!(
            generation,
            ranges = cache.ranges.len(),
            offscreen = cache.offscreen.len(),
            "installed range cache"
        );

        let old = self.cache.swap(Arc::new(cache));
        self.counters.rebuilds.fetch_add(1, Ordering::AcqRel);
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if let Ok(old) = Arc::try_unwrap(old) {
            old.recycle(&mut pool);
        }
        self.pool_stats.store(Arc::new(pool.stats()));
        true
    }

    fn warp(&self) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }
        let cache = self.cache.load_full();
        let points = self.points.load_full();
        let generation = cache.generation;
        let outcome = self.engine.run_pass(&cache, &points, || {
            self.cache.load().generation == generation
        });
        let counter = match outcome {
            PassOutcome::Completed { .. } => {
                self.canvas.request_repaint();
                &self.counters.passes_completed
            }
            PassOutcome::Abandoned { .. } => &self.counters.passes_abandoned,
            PassOutcome::Skipped(_) => &self.counters.passes_skipped,
        };
        counter.fetch_add(1, Ordering::AcqRel);
    }
}

/// Interactive warp preview over a selection of tiles, ending in a bake or a cancel.
///
/// The range updater rebuilds cached ranges when the viewport changes; the mesh painter re-warps
/// them whenever the ranges or the control points change. Both run on their own threads and never
/// block the caller.
pub struct WarpSession {
    core: Arc<Core>,
    updater: Arc<Worker<Viewport>>,
    painter: Arc<Worker<()>>,
    editor: Mutex<ControlPointEditor>,
    viewport: Mutex<Viewport>,
    undo: Arc<dyn UndoLog>,
}

impl WarpSession {
    /// Start both workers and request the first rebuild at the canvas viewport.
    pub fn start(
        selection: Vec<Arc<dyn Tile>>,
        index: Arc<dyn TileIndex>,
        canvas: Arc<dyn DisplayCanvas>,
        undo: Arc<dyn UndoLog>,
        opts: WarpSessionOpts,
    ) -> WarpResult<Self> {
        opts.validate()?;
        let mut selection = selection;
        selection.sort_by_key(|t| index.z_index(t.id()).unwrap_or(usize::MAX));

        let viewport = canvas.viewport();
        let viewport = Viewport::new(viewport.rect, viewport.zoom)?;
        let core = Arc::new(Core {
            engine: MeshTransformEngine::new(opts.engine_opts()),
            cache: Arc::new(ArcSwap::from_pointee(RangeCache::empty(opts.pad))),
            pool: Mutex::new(RasterPool::new(opts.pool)),
            pool_stats: ArcSwap::from_pointee(RasterPoolStats::default()),
            generation: AtomicU64::new(0),
            points: ArcSwap::from_pointee(Vec::new()),
            rebuild_lock: Arc::new(Mutex::new(())),
            counters: Counters::default(),
            finished: AtomicBool::new(false),
            opts,
            index,
            canvas,
            selection,
        });

        let painter = {
            let core = Arc::clone(&core);
            Arc::new(Worker::spawn("painter", move |()| core.warp())?)
        };
        let updater = {
            let core = Arc::clone(&core);
            let painter = Arc::clone(&painter);
            Arc::new(Worker::spawn("updater", move |vp: Viewport| {
                if core.rebuild(vp) {
                    painter.request(());
                }
            })?)
        };

        let editor = ControlPointEditor::new(core.opts.capture_radius_px);
        updater.request(viewport);
        tracing::info!(tiles = core.selection.len(), "warp session started");
        Ok(Self {
            core,
            updater,
            painter,
            editor: Mutex::new(editor),
            viewport: Mutex::new(viewport),
            undo,
        })
    }

    pub fn opts(&self) -> &WarpSessionOpts {
        &self.core.opts
    }

    pub fn is_finished(&self) -> bool {
        self.core.finished.load(Ordering::Acquire)
    }

    pub fn viewport(&self) -> Viewport {
        *self.viewport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Currently installed cache snapshot.
    pub fn cache(&self) -> Arc<RangeCache> {
        self.core.cache.load_full()
    }

    pub fn control_points(&self) -> Vec<ControlPoint> {
        self.core.points.load().as_ref().clone()
    }

    pub fn stats(&self) -> SessionStats {
        let c = &self.core.counters;
        SessionStats {
            rebuilds: c.rebuilds.load(Ordering::Acquire),
            passes_completed: c.passes_completed.load(Ordering::Acquire),
            passes_abandoned: c.passes_abandoned.load(Ordering::Acquire),
            passes_skipped: c.passes_skipped.load(Ordering::Acquire),
            generation: self.core.cache.load().generation,
            pool: self.core.pool_stats.load().as_ref().clone(),
        }
    }

    fn set_viewport(&self, next: Viewport) {
        if self.is_finished() {
            return;
        }
        {
            let mut vp = self.viewport.lock().unwrap_or_else(PoisonError::into_inner);
            if *vp == next {
                return;
            }
            *vp = next;
        }
        self.updater.request(next);
    }

    /// The visible world rectangle moved or resized.
    pub fn notify_viewport_changed(&self, rect: Rect) -> WarpResult<()> {
        let zoom = self.viewport().zoom;
        self.set_viewport(Viewport::new(rect, zoom)?);
        Ok(())
    }

    pub fn notify_zoom_changed(&self, zoom: f64) -> WarpResult<()> {
        let rect = self.viewport().rect;
        self.set_viewport(Viewport::new(rect, zoom)?);
        Ok(())
    }

    fn editor(&self) -> std::sync::MutexGuard<'_, ControlPointEditor> {
        self.editor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_points(&self, points: Vec<ControlPoint>) {
        self.core.points.store(Arc::new(points));
        self.painter.request(());
    }

    fn pointer_viewport(&self, zoom: f64) -> WarpResult<Viewport> {
        Viewport::new(self.viewport().rect, zoom)
    }

    /// Pointer press at device coordinates.
    pub fn on_press(
        &self,
        device: Point,
        zoom: f64,
        modifiers: Modifiers,
    ) -> WarpResult<PressOutcome> {
        if self.is_finished() {
            return Ok(PressOutcome::Missed);
        }
        let vp = self.pointer_viewport(zoom)?;
        let world = vp.screen_to_world(device);
        let mut editor = self.editor();
        let outcome = editor.press(world, &vp, modifiers, &self.core.engine);
        if outcome.changed_points() {
            self.publish_points(editor.points().to_vec());
        }
        Ok(outcome)
    }

    pub fn on_drag(&self, device: Point, zoom: f64) -> WarpResult<bool> {
        if self.is_finished() {
            return Ok(false);
        }
        let world = self.pointer_viewport(zoom)?.screen_to_world(device);
        let mut editor = self.editor();
        let moved = editor.drag(world);
        if moved {
            self.publish_points(editor.points().to_vec());
        }
        Ok(moved)
    }

    pub fn on_release(&self, device: Point, zoom: f64) -> WarpResult<bool> {
        if self.is_finished() {
            return Ok(false);
        }
        let world = self.pointer_viewport(zoom)?.screen_to_world(device);
        let mut editor = self.editor();
        let moved = editor.release(world);
        if moved {
            self.publish_points(editor.points().to_vec());
        }
        Ok(moved)
    }

    /// Replace all control points at once.
    pub fn set_control_points(&self, points: Vec<ControlPoint>) {
        if self.is_finished() {
            return;
        }
        let mut editor = self.editor();
        editor.set_points(points);
        self.publish_points(editor.points().to_vec());
    }

    /// Control-point targets in current screen coordinates, for drawing handles.
    pub fn overlay_points(&self) -> Vec<Point> {
        let to_screen = self.viewport().world_to_screen();
        self.core
            .points
            .load()
            .iter()
            .map(|cp| to_screen * cp.world)
            .collect()
    }

    /// Substitute cached ranges into the canvas's paint list.
    pub fn graphics_source(&self, items: &[Arc<dyn Tile>]) -> Vec<PaintItem> {
        substitute(&self.core.cache.load(), items)
    }

    /// Block until both workers have drained their pending work.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if !self.updater.wait_idle(left) || !self.painter.wait_idle(left) {
                return false;
            }
            // The updater may have queued a painter run while the painter drained.
            if self.updater.is_idle() && self.painter.is_idle() {
                return true;
            }
        }
    }

    /// Bake the current deformation into every cached tile and the tiles of `layers`.
    ///
    /// Runs on its own thread; workers are stopped when it finishes.
    pub fn apply_async(&self, layers: Option<&[LayerId]>) -> WarpResult<BakeTask> {
        if self.is_finished() {
            return Err(WarpError::validation("warp session already finished"));
        }
        let deformation = self.core.engine.fit(&self.control_points())?;
        self.core.finished.store(true, Ordering::Release);

        // The selection covers tiles the first rebuild has not reached yet.
        let extra = self
            .core
            .selection
            .iter()
            .cloned()
            .chain(
                layers
                    .unwrap_or_default()
                    .iter()
                    .flat_map(|&l| self.core.index.layer_tiles(l)),
            )
            .collect();
        let job = BakeJob {
            cache: Arc::clone(&self.core.cache),
            extra,
            deformation,
            undo: Arc::clone(&self.undo),
            rebuild_lock: Arc::clone(&self.core.rebuild_lock),
        };
        let updater = Arc::clone(&self.updater);
        let painter = Arc::clone(&self.painter);
        BakeTask::spawn(move || {
            let report = job.run();
            updater.quit();
            painter.quit();
            report
        })
    }

    /// [`apply_async`](Self::apply_async) and wait for it.
    pub fn apply(&self, layers: Option<&[LayerId]>) -> WarpResult<BakeReport> {
        let report = self.apply_async(layers)?.wait()?;
        self.shutdown();
        Ok(report)
    }

    /// Stop the workers without baking and release cached buffers.
    pub fn cancel(&self) -> WarpResult<()> {
        self.core.finished.store(true, Ordering::Release);
        self.shutdown();
        self.core.cache.load().flush();
        tracing::info!("warp session cancelled");
        Ok(())
    }

    fn shutdown(&self) {
        self.updater.quit();
        self.painter.quit();
    }
}

impl Drop for WarpSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/warp_session.rs"]
mod tests;
