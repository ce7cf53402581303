use std::sync::Arc;

use crate::foundation::core::{Affine, Point, Viewport};
use crate::foundation::error::{WarpError, WarpResult};
use crate::grouping::rasterize::{CachedRange, RangeCache, WarpedRaster};
use crate::raster::buffer::{AlphaMask, RasterBuffer};
use crate::transform::coordinate::{Conjugated, CoordinateTransform, invert_affine};
use crate::transform::mesh::WarpMesh;
use crate::transform::mls::{ControlPoint, Deformation, fit_deformation};

/// Resampling used when remapping cached rasters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineOpts {
    pub mesh_subdivisions: u32,
    pub alpha: f64,
    pub interpolation: Interpolation,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            mesh_subdivisions: 32,
            alpha: 1.0,
            interpolation: Interpolation::Nearest,
        }
    }
}

/// How target pixels of one cache snapshot find their source.
#[derive(Clone, Debug)]
pub enum WarpPlan {
    /// Warped output is a verbatim copy.
    Identity,
    /// Target -> source affine.
    Affine(Affine),
    Mesh(WarpMesh),
}

#[derive(Debug)]
pub enum PassOutcome {
    Completed { ranges: usize },
    /// The cache was replaced mid-pass; `mapped` ranges were published before stopping.
    Abandoned { mapped: usize },
    /// Soft failure: nothing was published.
    Skipped(WarpError),
}

/// Turns control points into a pixel remapping and applies it to cached ranges.
#[derive(Clone, Debug, Default)]
pub struct MeshTransformEngine {
    opts: EngineOpts,
}

impl MeshTransformEngine {
    pub fn new(opts: EngineOpts) -> Self {
        Self { opts }
    }

    pub fn opts(&self) -> &EngineOpts {
        &self.opts
    }

    pub fn fit(&self, points: &[ControlPoint]) -> WarpResult<Arc<Deformation>> {
        Ok(Arc::new(fit_deformation(points, self.opts.alpha)?))
    }

    /// `buffer → world`, deformation, `world → buffer` for a padded buffer of `viewport`.
    pub fn composite(
        &self,
        deformation: Arc<Deformation>,
        viewport: &Viewport,
        pad: u32,
    ) -> WarpResult<Conjugated> {
        Conjugated::new(viewport.buffer_to_world(pad), deformation)
    }

    pub fn plan(
        &self,
        deformation: &Arc<Deformation>,
        viewport: &Viewport,
        pad: u32,
    ) -> WarpResult<WarpPlan> {
        if deformation.is_identity() {
            return Ok(WarpPlan::Identity);
        }
        let composite = self.composite(Arc::clone(deformation), viewport, pad)?;
        if let Some(a) = composite.as_affine() {
            return Ok(WarpPlan::Affine(invert_affine(a)?));
        }
        let (w, h) = viewport.padded_size(pad);
        let mesh = composite.build_mesh(f64::from(w), f64::from(h), self.opts.mesh_subdivisions);
        if mesh.triangle_count() == 0 {
            return Err(WarpError::NonInvertible { x: 0.0, y: 0.0 });
        }
        Ok(WarpPlan::Mesh(mesh))
    }

    pub fn map_range(&self, plan: &WarpPlan, range: &CachedRange) -> WarpedRaster {
        let source = range.source();
        let mask = range.source_mask();
        match plan {
            WarpPlan::Identity => WarpedRaster {
                raster: source.clone(),
                mask: mask.cloned(),
            },
            WarpPlan::Affine(inv) => {
                let (w, h) = (source.width(), source.height());
                let mut out = self.empty_like(source, mask);
                for y in 0..h {
                    for x in 0..w {
                        let c = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                        self.sample_into(source, mask, &mut out, x, y, *inv * c);
                    }
                }
                out
            }
            WarpPlan::Mesh(mesh) => {
                let mut out = self.empty_like(source, mask);
                mesh.for_each_target_pixel(source.width(), source.height(), |x, y, s| {
                    self.sample_into(source, mask, &mut out, x, y, s);
                });
                out
            }
        }
    }

    /// Fit, plan and map every range of `cache`, publishing each warped result as it completes.
    ///
    /// `is_current` is checked before each range; once it reports false the pass stops.
    #[tracing::instrument(level = "debug", skip_all, fields(generation = cache.generation, points = points.len()))]
    pub fn run_pass(
        &self,
        cache: &RangeCache,
        points: &[ControlPoint],
        is_current: impl Fn() -> bool,
    ) -> PassOutcome {
        let Some(viewport) = cache.viewport else {
            return PassOutcome::Completed { ranges: 0 };
        };
        let plan = match self
            .fit(points)
            .and_then(|d| self.plan(&d, &viewport, cache.pad))
        {
            Ok(plan) => plan,
            Err(e) => {
                if e.is_soft() {
                    tracing::debug!(error = %e, "warp pass skipped");
                } else {
                    tracing::error!(error = %e, "warp pass failed");
                }
                return PassOutcome::Skipped(e);
            }
        };

        let mut mapped = 0;
        for range in &cache.ranges {
            if !is_current() {
                tracing::debug!(mapped, "cache superseded, abandoning warp pass");
                return PassOutcome::Abandoned { mapped };
            }
            if range.is_flushed() {
                continue;
            }
            range.publish_warped(self.map_range(&plan, range));
            mapped += 1;
        }
        PassOutcome::Completed { ranges: mapped }
    }

    fn empty_like(&self, source: &RasterBuffer, mask: Option<&AlphaMask>) -> WarpedRaster {
        WarpedRaster {
            raster: RasterBuffer::new(source.width(), source.height(), source.format()),
            mask: mask.map(|m| AlphaMask::new(m.width(), m.height())),
        }
    }

    fn sample_into(
        &self,
        source: &RasterBuffer,
        mask: Option<&AlphaMask>,
        out: &mut WarpedRaster,
        x: u32,
        y: u32,
        s: Point,
    ) {
        let (w, h) = (source.width(), source.height());
        if !(s.x >= 0.0 && s.y >= 0.0 && s.x < f64::from(w) && s.y < f64::from(h)) {
            return;
        }
        match self.opts.interpolation {
            Interpolation::Nearest => {
                let (sx, sy) = (s.x.floor() as u32, s.y.floor() as u32);
                out.raster
                    .raw_pixel_mut(x, y)
                    .copy_from_slice(source.raw_pixel(sx, sy));
                if let (Some(m), Some(om)) = (mask, out.mask.as_mut()) {
                    om.set(x, y, m.get(sx, sy));
                }
            }
            Interpolation::Bilinear => {
                let taps = BilinearTaps::new(s, w, h);
                let bpp = source.format().bytes_per_pixel();
                let dst = out.raster.raw_pixel_mut(x, y);
                for (c, d) in dst.iter_mut().enumerate().take(bpp) {
                    *d = taps.sample(|tx, ty| source.raw_pixel(tx, ty)[c]);
                }
                if let (Some(m), Some(om)) = (mask, out.mask.as_mut()) {
                    om.set(x, y, taps.sample(|tx, ty| m.get(tx, ty)));
                }
            }
        }
    }
}

struct BilinearTaps {
    x0: u32,
    x1: u32,
    y0: u32,
    y1: u32,
    fx: f64,
    fy: f64,
}

impl BilinearTaps {
    fn new(s: Point, w: u32, h: u32) -> Self {
        let u = (s.x - 0.5).clamp(0.0, f64::from(w - 1));
        let v = (s.y - 0.5).clamp(0.0, f64::from(h - 1));
        let x0 = u.floor() as u32;
        let y0 = v.floor() as u32;
        Self {
            x0,
            x1: (x0 + 1).min(w - 1),
            y0,
            y1: (y0 + 1).min(h - 1),
            fx: u - f64::from(x0),
            fy: v - f64::from(y0),
        }
    }

    fn sample(&self, get: impl Fn(u32, u32) -> u8) -> u8 {
        let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;
        let top = lerp(
            f64::from(get(self.x0, self.y0)),
            f64::from(get(self.x1, self.y0)),
            self.fx,
        );
        let bottom = lerp(
            f64::from(get(self.x0, self.y1)),
            f64::from(get(self.x1, self.y1)),
            self.fx,
        );
        lerp(top, bottom, self.fy).round().clamp(0.0, 255.0) as u8
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transform/engine.rs"]
mod tests;
