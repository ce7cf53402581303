//! Tilewarp deforms stacks of z-ordered raster tiles with a moving-least-squares mesh warp.
//!
//! A [`WarpSession`] groups the selected tiles into ranges of consecutive stacking positions,
//! rasterizes each range once per viewport, and re-warps the cached rasters in the background as
//! control points move. When the user is done, [`WarpSession::apply`] bakes the deformation into
//! every affected tile.
//!
//! - Collaborators: [`TileIndex`], [`DisplayCanvas`], [`UndoLog`]
//! - Tiles: the [`Tile`] trait and the in-memory [`ImageTile`]
//! - Preview: [`WarpSession::graphics_source`] substitutes cached ranges into a paint list
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod grouping;
pub(crate) mod raster;
pub(crate) mod session;
pub(crate) mod tile;
pub(crate) mod transform;

pub use crate::foundation::core::{Affine, LayerId, Point, Rect, Size, TileId, Vec2, Viewport};
pub use crate::foundation::error::{FitError, WarpError, WarpResult};

pub use crate::grouping::range::{Range, RangePlan, build_ranges};
pub use crate::grouping::rasterize::{CachedRange, RangeCache, WarpedRaster};
pub use crate::grouping::source::{
    PaintItem, Paintable, RangePaintable, TilePaintable, paint_all, substitute,
};
pub use crate::raster::buffer::{AlphaMask, PixelFormat, RasterBuffer};
pub use crate::raster::composite::{BlendMode, PremulRgba8};
pub use crate::raster::pool::{RasterPool, RasterPoolOpts, RasterPoolStats};
pub use crate::session::bake::{BakeReport, BakeTask, TileFailure};
pub use crate::session::editor::{ControlPointEditor, Modifiers, PressOutcome};
pub use crate::session::warp_session::{SessionStats, WarpSession, WarpSessionOpts};
pub use crate::tile::{
    DisplayCanvas, EditStep, ImageTile, InMemoryIndex, InMemoryUndoLog, PyramidHandle,
    RecordingCanvas, TRANSFORM_ATTRIBUTES, Tile, TileIndex, TileState, UndoLog,
};
pub use crate::transform::coordinate::{Conjugated, CoordinateTransform, TransformChain};
pub use crate::transform::engine::{
    EngineOpts, Interpolation, MeshTransformEngine, PassOutcome, WarpPlan,
};
pub use crate::transform::mesh::WarpMesh;
pub use crate::transform::mls::{
    ControlPoint, Deformation, LocalModel, Mls, fit_deformation, fit_with_model,
};
