use std::fmt;
use std::sync::Arc;

use crate::foundation::core::{Affine, Point, Rect};
use crate::foundation::error::{WarpError, WarpResult};
use crate::transform::mesh::WarpMesh;

/// Affines whose determinant magnitude falls below this are not inverted.
pub(crate) const MIN_DETERMINANT: f64 = 1e-12;

/// A point mapping between two 2D spaces.
///
/// Implementations that are globally affine report it through [`as_affine`](Self::as_affine) so
/// callers can skip mesh discretization.
pub trait CoordinateTransform: Send + Sync + fmt::Debug {
    fn apply(&self, p: Point) -> Point;

    /// Analytic inverse, where one exists.
    fn apply_inverse(&self, p: Point) -> WarpResult<Point> {
        Err(WarpError::NonInvertible { x: p.x, y: p.y })
    }

    fn as_affine(&self) -> Option<Affine> {
        None
    }

    /// Discretize over `[0, width] × [0, height]`.
    fn build_mesh(&self, width: f64, height: f64, subdivisions: u32) -> WarpMesh {
        WarpMesh::build(self, width, height, subdivisions)
    }
}

pub(crate) fn invert_affine(a: Affine) -> WarpResult<Affine> {
    let det = a.determinant();
    if !det.is_finite() || det.abs() < MIN_DETERMINANT {
        let [.., x, y] = a.as_coeffs();
        return Err(WarpError::NonInvertible { x, y });
    }
    Ok(a.inverse())
}

impl CoordinateTransform for Affine {
    fn apply(&self, p: Point) -> Point {
        *self * p
    }

    fn apply_inverse(&self, p: Point) -> WarpResult<Point> {
        Ok(invert_affine(*self)? * p)
    }

    fn as_affine(&self) -> Option<Affine> {
        Some(*self)
    }
}

/// `frame⁻¹ ∘ inner ∘ frame`: evaluates `inner` in the space `frame` maps into.
///
/// Used both for the preview (frame = buffer → world) and for bake (frame = tile local → world).
#[derive(Clone, Debug)]
pub struct Conjugated {
    frame: Affine,
    frame_inv: Affine,
    inner: Arc<dyn CoordinateTransform>,
}

impl Conjugated {
    pub fn new(frame: Affine, inner: Arc<dyn CoordinateTransform>) -> WarpResult<Self> {
        let frame_inv = invert_affine(frame)?;
        Ok(Self {
            frame,
            frame_inv,
            inner,
        })
    }

    pub fn frame(&self) -> Affine {
        self.frame
    }
}

impl CoordinateTransform for Conjugated {
    fn apply(&self, p: Point) -> Point {
        self.frame_inv * self.inner.apply(self.frame * p)
    }

    fn apply_inverse(&self, p: Point) -> WarpResult<Point> {
        Ok(self.frame_inv * self.inner.apply_inverse(self.frame * p)?)
    }

    fn as_affine(&self) -> Option<Affine> {
        self.inner
            .as_affine()
            .map(|a| self.frame_inv * a * self.frame)
    }
}

/// Ordered list of transforms, applied first to last.
#[derive(Clone, Debug, Default)]
pub struct TransformChain {
    items: Vec<Arc<dyn CoordinateTransform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, t: Arc<dyn CoordinateTransform>) {
        self.items.push(t);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bounding box of `rect` after mapping, sampled along its border.
    pub fn bounds_of(&self, rect: Rect, samples_per_edge: u32) -> Rect {
        if let Some(a) = self.as_affine() {
            return a.transform_rect_bbox(rect);
        }
        let n = samples_per_edge.max(1);
        let mut out: Option<Rect> = None;
        for i in 0..=n {
            let t = f64::from(i) / f64::from(n);
            let x = rect.x0 + t * rect.width();
            let y = rect.y0 + t * rect.height();
            for p in [
                Point::new(x, rect.y0),
                Point::new(x, rect.y1),
                Point::new(rect.x0, y),
                Point::new(rect.x1, y),
            ] {
                let q = self.apply(p);
                out = Some(match out {
                    Some(r) => r.union_pt(q),
                    None => Rect::from_points(q, q),
                });
            }
        }
        out.unwrap_or(rect)
    }
}

impl CoordinateTransform for TransformChain {
    fn apply(&self, p: Point) -> Point {
        self.items.iter().fold(p, |p, t| t.apply(p))
    }

    fn apply_inverse(&self, p: Point) -> WarpResult<Point> {
        self.items
            .iter()
            .rev()
            .try_fold(p, |p, t| t.apply_inverse(p))
    }

    fn as_affine(&self) -> Option<Affine> {
        self.items
            .iter()
            .try_fold(Affine::IDENTITY, |acc, t| t.as_affine().map(|a| a * acc))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transform/coordinate.rs"]
mod tests;
