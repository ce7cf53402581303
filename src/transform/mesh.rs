use crate::foundation::core::{Affine, Point, Rect};
use crate::foundation::error::{WarpError, WarpResult};
use crate::transform::coordinate::CoordinateTransform;
use crate::transform::model::triangle_affine;

/// Barycentric tolerance for point-in-triangle tests on shared edges.
const EDGE_EPS: f64 = 1e-9;

#[derive(Clone, Debug)]
struct Triangle {
    src: [Point; 3],
    dst: [Point; 3],
    forward: Affine,
    inverse: Affine,
}

fn contains(tri: &[Point; 3], p: Point) -> bool {
    let cross = |a: Point, b: Point| (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let d0 = cross(tri[0], tri[1]);
    let d1 = cross(tri[1], tri[2]);
    let d2 = cross(tri[2], tri[0]);
    let has_neg = d0 < -EDGE_EPS || d1 < -EDGE_EPS || d2 < -EDGE_EPS;
    let has_pos = d0 > EDGE_EPS || d1 > EDGE_EPS || d2 > EDGE_EPS;
    !(has_neg && has_pos)
}

fn tri_bounds(tri: &[Point; 3]) -> Rect {
    Rect::from_points(tri[0], tri[1]).union_pt(tri[2])
}

/// A transform discretized over a regular triangulated grid.
///
/// The grid covers `[0, width] × [0, height]` with `subdivisions` cells along the shorter side and
/// square-ish cells along the longer one; each cell is split into two triangles that map linearly.
/// Triangles that collapse under the transform are dropped.
#[derive(Clone, Debug)]
pub struct WarpMesh {
    width: f64,
    height: f64,
    triangles: Vec<Triangle>,
}

impl WarpMesh {
    pub fn build<T: CoordinateTransform + ?Sized>(
        t: &T,
        width: f64,
        height: f64,
        subdivisions: u32,
    ) -> Self {
        let n = f64::from(subdivisions.max(1));
        let cell = (width.min(height) / n).max(f64::MIN_POSITIVE);
        let nx = ((width / cell).round() as usize).max(1);
        let ny = ((height / cell).round() as usize).max(1);
        let dx = width / nx as f64;
        let dy = height / ny as f64;

        let stride = nx + 1;
        let mut src = Vec::with_capacity(stride * (ny + 1));
        let mut dst = Vec::with_capacity(stride * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                let p = Point::new(i as f64 * dx, j as f64 * dy);
                src.push(p);
                dst.push(t.apply(p));
            }
        }

        let mut triangles = Vec::with_capacity(nx * ny * 2);
        for j in 0..ny {
            for i in 0..nx {
                let a = j * stride + i;
                let b = a + 1;
                let c = a + stride;
                let d = c + 1;
                for [i0, i1, i2] in [[a, b, c], [b, d, c]] {
                    let s = [src[i0], src[i1], src[i2]];
                    let q = [dst[i0], dst[i1], dst[i2]];
                    let (Some(forward), Some(inverse)) = (triangle_affine(s, q), triangle_affine(q, s))
                    else {
                        continue;
                    };
                    triangles.push(Triangle {
                        src: s,
                        dst: q,
                        forward,
                        inverse,
                    });
                }
            }
        }

        Self {
            width,
            height,
            triangles,
        }
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Append `post` to every triangle's target side.
    pub fn then(&self, post: Affine) -> Self {
        let triangles = self
            .triangles
            .iter()
            .filter_map(|t| {
                let dst = t.dst.map(|p| post * p);
                let forward = triangle_affine(t.src, dst)?;
                let inverse = triangle_affine(dst, t.src)?;
                Some(Triangle {
                    src: t.src,
                    dst,
                    forward,
                    inverse,
                })
            })
            .collect();
        Self {
            width: self.width,
            height: self.height,
            triangles,
        }
    }

    /// Bounding box of the mesh in target space.
    pub fn target_bounds(&self) -> Option<Rect> {
        self.triangles
            .iter()
            .map(|t| tri_bounds(&t.dst))
            .reduce(|a, b| a.union(b))
    }

    pub fn apply(&self, p: Point) -> WarpResult<Point> {
        self.triangles
            .iter()
            .find(|t| contains(&t.src, p))
            .map(|t| t.forward * p)
            .ok_or(WarpError::NonInvertible { x: p.x, y: p.y })
    }

    pub fn apply_inverse(&self, p: Point) -> WarpResult<Point> {
        self.triangles
            .iter()
            .find(|t| contains(&t.dst, p))
            .map(|t| t.inverse * p)
            .ok_or(WarpError::NonInvertible { x: p.x, y: p.y })
    }

    /// Visit every target pixel of a `width × height` grid whose center is covered by the mesh,
    /// exactly once, with the source location its center maps back to.
    pub fn for_each_target_pixel(&self, width: u32, height: u32, mut f: impl FnMut(u32, u32, Point)) {
        if width == 0 || height == 0 {
            return;
        }
        let mut visited = vec![false; (width as usize) * (height as usize)];
        for t in &self.triangles {
            let b = tri_bounds(&t.dst);
            let x0 = (b.x0 - 0.5).ceil().max(0.0) as u32;
            let y0 = (b.y0 - 0.5).ceil().max(0.0) as u32;
            let x1 = (b.x1 - 0.5).floor().min(f64::from(width) - 1.0);
            let y1 = (b.y1 - 0.5).floor().min(f64::from(height) - 1.0);
            if x1 < 0.0 || y1 < 0.0 {
                continue;
            }
            let (x1, y1) = (x1 as u32, y1 as u32);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let idx = (y as usize) * (width as usize) + (x as usize);
                    if visited[idx] {
                        continue;
                    }
                    let c = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                    if contains(&t.dst, c) {
                        visited[idx] = true;
                        f(x, y, t.inverse * c);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transform/mesh.rs"]
mod tests;
