use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;

use crate::foundation::core::{Affine, LayerId, Point, Rect, TileId};
use crate::foundation::error::{WarpError, WarpResult};
use crate::foundation::math::premultiply_rgba8_in_place;
use crate::raster::buffer::{PixelFormat, RasterBuffer};
use crate::raster::composite::BlendMode;
use crate::tile::{PyramidHandle, Tile, TileState};
use crate::transform::coordinate::{CoordinateTransform, TransformChain, invert_affine};

/// Mesh resolution used when a tile's chain is not affine.
const TILE_MESH_SUBDIVISIONS: u32 = 32;
/// Pyramid levels stop once the longer side fits in this many pixels.
const PYRAMID_MIN_SIDE: u32 = 32;

#[derive(Debug)]
struct Geometry {
    /// Local -> world placement, excluding the bounding-box offset.
    base: Affine,
    chain: TransformChain,
    bounds: Rect,
}

#[derive(Debug)]
struct Inner {
    id: TileId,
    layer: LayerId,
    blend: BlendMode,
    grayscale: bool,
    pixels: RasterBuffer,
    geometry: RwLock<Geometry>,
    pyramid: RwLock<Vec<RasterBuffer>>,
    pyramid_revision: AtomicU64,
}

/// In-memory tile over premultiplied RGBA8 pixels.
///
/// Clones share state, so a clone handed to the pipeline observes appended transforms.
#[derive(Clone, Debug)]
pub struct ImageTile {
    inner: Arc<Inner>,
}

impl ImageTile {
    /// `pixels` must be [`PixelFormat::Rgba8Premul`]; `placement` maps pixel space to world.
    pub fn new(id: TileId, layer: LayerId, pixels: RasterBuffer, placement: Affine) -> WarpResult<Self> {
        Self::build(id, layer, pixels, placement, BlendMode::Normal, false)
    }

    fn build(
        id: TileId,
        layer: LayerId,
        pixels: RasterBuffer,
        placement: Affine,
        blend: BlendMode,
        grayscale: bool,
    ) -> WarpResult<Self> {
        if pixels.format() != PixelFormat::Rgba8Premul {
            return Err(WarpError::validation(format!(
                "tile {} pixels must be premultiplied rgba8, got {:?}",
                id.0,
                pixels.format()
            )));
        }
        invert_affine(placement)?;
        let bounds = Rect::new(0.0, 0.0, f64::from(pixels.width()), f64::from(pixels.height()));
        Ok(Self {
            inner: Arc::new(Inner {
                id,
                layer,
                blend,
                grayscale,
                pixels,
                geometry: RwLock::new(Geometry {
                    base: placement,
                    chain: TransformChain::new(),
                    bounds,
                }),
                pyramid: RwLock::new(Vec::new()),
                pyramid_revision: AtomicU64::new(0),
            }),
        })
    }

    /// Decode an image; single-channel sources are flagged grayscale.
    pub fn from_image(
        id: TileId,
        layer: LayerId,
        img: &image::DynamicImage,
        placement: Affine,
    ) -> WarpResult<Self> {
        let grayscale = matches!(
            img,
            image::DynamicImage::ImageLuma8(_) | image::DynamicImage::ImageLuma16(_)
        );
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        let mut data = rgba.into_raw();
        premultiply_rgba8_in_place(&mut data);
        let pixels = RasterBuffer::from_raw(w, h, PixelFormat::Rgba8Premul, data)?;
        Self::build(id, layer, pixels, placement, BlendMode::Normal, grayscale)
    }

    pub fn open(id: TileId, layer: LayerId, path: &Path, placement: Affine) -> WarpResult<Self> {
        let img = image::open(path).with_context(|| format!("decode tile image {}", path.display()))?;
        Self::from_image(id, layer, &img, placement)
    }

    /// Set the blend mode. Only valid before the tile is shared.
    pub fn with_blend_mode(self, blend: BlendMode) -> WarpResult<Self> {
        let grayscale = self.inner.grayscale;
        self.rebuild(blend, grayscale)
    }

    pub fn with_grayscale(self, grayscale: bool) -> WarpResult<Self> {
        let blend = self.inner.blend;
        self.rebuild(blend, grayscale)
    }

    fn rebuild(self, blend: BlendMode, grayscale: bool) -> WarpResult<Self> {
        let inner = Arc::try_unwrap(self.inner)
            .map_err(|_| WarpError::validation("tile is already shared"))?;
        Ok(Self {
            inner: Arc::new(Inner {
                blend,
                grayscale,
                ..inner
            }),
        })
    }

    pub fn pixels(&self) -> &RasterBuffer {
        &self.inner.pixels
    }

    /// Finest pyramid level, if one has been built.
    pub fn pyramid_level(&self, level: usize) -> Option<RasterBuffer> {
        self.inner
            .pyramid
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(level)
            .cloned()
    }

    fn geometry(&self) -> std::sync::RwLockReadGuard<'_, Geometry> {
        self.inner.geometry.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Composite with `full` mapping pixel space after the chain (local space) to target pixels.
    fn render_local(&self, target: &mut RasterBuffer, full: Affine, mode: BlendMode) -> WarpResult<()> {
        let chain = self.geometry().chain.clone();
        let src = &self.inner.pixels;
        if src.is_empty() || target.is_empty() {
            return Ok(());
        }
        let (sw, sh) = (f64::from(src.width()), f64::from(src.height()));
        let (tw, th) = (target.width(), target.height());
        let sample = |s: Point| -> Option<[u8; 4]> {
            (s.x >= 0.0 && s.y >= 0.0 && s.x < sw && s.y < sh)
                .then(|| src.pixel(s.x.floor() as u32, s.y.floor() as u32))
        };

        if let Some(c) = chain.as_affine() {
            let m = full * c;
            let inv = invert_affine(m)?;
            let bbox = m
                .transform_rect_bbox(Rect::new(0.0, 0.0, sw, sh))
                .intersect(Rect::new(0.0, 0.0, f64::from(tw), f64::from(th)));
            if bbox.is_zero_area() {
                return Ok(());
            }
            let x0 = bbox.x0.floor().max(0.0) as u32;
            let y0 = bbox.y0.floor().max(0.0) as u32;
            let x1 = (bbox.x1.ceil() as u32).min(tw);
            let y1 = (bbox.y1.ceil() as u32).min(th);
            for y in y0..y1 {
                for x in x0..x1 {
                    let s = inv * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                    if let Some(px) = sample(s) {
                        target.blend_pixel(x, y, px, mode);
                    }
                }
            }
        } else {
            let mesh = chain.build_mesh(sw, sh, TILE_MESH_SUBDIVISIONS).then(full);
            mesh.for_each_target_pixel(tw, th, |x, y, s| {
                if let Some(px) = sample(s) {
                    target.blend_pixel(x, y, px, mode);
                }
            });
        }
        Ok(())
    }
}

fn downsample_2x(src: &RasterBuffer) -> RasterBuffer {
    let w = src.width().div_ceil(2).max(1);
    let h = src.height().div_ceil(2).max(1);
    let mut out = RasterBuffer::new(w, h, src.format());
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u32; 4];
            let mut n = 0u32;
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (sx, sy) = (2 * x + dx, 2 * y + dy);
                if sx < src.width() && sy < src.height() {
                    let px = src.pixel(sx, sy);
                    for i in 0..4 {
                        acc[i] += u32::from(px[i]);
                    }
                    n += 1;
                }
            }
            let n = n.max(1);
            out.set_pixel(x, y, acc.map(|v| ((v + n / 2) / n) as u8));
        }
    }
    out
}

impl Tile for ImageTile {
    fn id(&self) -> TileId {
        self.inner.id
    }

    fn layer(&self) -> LayerId {
        self.inner.layer
    }

    fn blend_mode(&self) -> BlendMode {
        self.inner.blend
    }

    fn is_grayscale(&self) -> bool {
        self.inner.grayscale
    }

    fn local_bounds(&self) -> Rect {
        self.geometry().bounds
    }

    fn affine(&self) -> Affine {
        let g = self.geometry();
        g.base * Affine::translate(g.bounds.origin().to_vec2())
    }

    fn transform_chain(&self) -> TransformChain {
        self.geometry().chain.clone()
    }

    fn append_transform(&self, t: Arc<dyn CoordinateTransform>) -> WarpResult<()> {
        let mut g = self
            .inner
            .geometry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut chain = g.chain.clone();
        chain.push(t);
        let px = &self.inner.pixels;
        let bounds = chain.bounds_of(
            Rect::new(0.0, 0.0, f64::from(px.width()), f64::from(px.height())),
            TILE_MESH_SUBDIVISIONS,
        );
        if !bounds.is_finite() {
            return Err(WarpError::validation(format!(
                "transform maps tile {} to non-finite bounds",
                self.inner.id.0
            )));
        }
        g.chain = chain;
        g.bounds = bounds;
        Ok(())
    }

    fn render(&self, target: &mut RasterBuffer, to_target: Affine, mode: BlendMode) -> WarpResult<()> {
        let base = self.geometry().base;
        self.render_local(target, to_target * base, mode)
    }

    fn regenerate_pyramid(&self) -> PyramidHandle {
        let tile = self.clone();
        PyramidHandle::spawn(self.inner.id, move || {
            let bounds = tile.local_bounds();
            let w = bounds.width().ceil().max(1.0) as u32;
            let h = bounds.height().ceil().max(1.0) as u32;
            let mut level = RasterBuffer::new(w, h, PixelFormat::Rgba8Premul);
            tile.render_local(
                &mut level,
                Affine::translate(-bounds.origin().to_vec2()),
                BlendMode::Normal,
            )?;

            let mut levels = vec![level];
            while let Some(last) = levels.last()
                && last.width().max(last.height()) > PYRAMID_MIN_SIDE
            {
                let next = downsample_2x(last);
                levels.push(next);
            }
            let count = levels.len();
            *tile
                .inner
                .pyramid
                .write()
                .unwrap_or_else(PoisonError::into_inner) = levels;
            tile.inner.pyramid_revision.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(tile = tile.inner.id.0, levels = count, "pyramid regenerated");
            Ok(count)
        })
    }

    fn state(&self) -> TileState {
        let g = self.geometry();
        TileState {
            id: self.inner.id,
            affine: g.base * Affine::translate(g.bounds.origin().to_vec2()),
            bounds: g.bounds,
            transforms: g.chain.len(),
            pyramid_revision: self.inner.pyramid_revision.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tile/image_tile.rs"]
mod tests;
