//! Weighted least-squares fits of 2D models to point correspondences.
//!
//! Every fit maps `ps[i]` onto `qs[i]` minimizing `Σ ws[i]·|M·ps[i] − qs[i]|²`.

use crate::foundation::core::{Affine, Point, Vec2};
use crate::foundation::error::FitError;

/// Relative determinant below which a fit is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

fn weighted_centroids(ps: &[Point], qs: &[Point], ws: &[f64]) -> Result<(Point, Point, f64), FitError> {
    let mut sw = 0.0;
    let mut pc = Vec2::ZERO;
    let mut qc = Vec2::ZERO;
    for ((p, q), &w) in ps.iter().zip(qs).zip(ws) {
        sw += w;
        pc += p.to_vec2() * w;
        qc += q.to_vec2() * w;
    }
    if !(sw.is_finite() && sw > 0.0) {
        return Err(FitError::singular("weights do not sum to a positive value"));
    }
    Ok(((pc / sw).to_point(), (qc / sw).to_point(), sw))
}

fn check_count(model: &'static str, required: usize, available: usize) -> Result<(), FitError> {
    if available < required {
        return Err(FitError::InsufficientData {
            model,
            required,
            available,
        });
    }
    Ok(())
}

pub(crate) fn fit_translation(ps: &[Point], qs: &[Point], ws: &[f64]) -> Result<Affine, FitError> {
    check_count("translation", 1, ps.len())?;
    let (pc, qc, _) = weighted_centroids(ps, qs, ws)?;
    Ok(Affine::translate(qc - pc))
}

pub(crate) fn fit_similarity(ps: &[Point], qs: &[Point], ws: &[f64]) -> Result<Affine, FitError> {
    check_count("similarity", 2, ps.len())?;
    let (pc, qc, _) = weighted_centroids(ps, qs, ws)?;

    let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
    for ((p, q), &w) in ps.iter().zip(qs).zip(ws) {
        let d1 = *p - pc;
        let d2 = *q - qc;
        a += w * (d1.x * d2.x + d1.y * d2.y);
        b += w * (d1.x * d2.y - d1.y * d2.x);
        c += w * (d1.x * d1.x + d1.y * d1.y);
    }
    if !(c.is_finite() && c > f64::EPSILON) {
        return Err(FitError::singular("similarity fit over coincident points"));
    }

    let scos = a / c;
    let ssin = b / c;
    let tx = qc.x - scos * pc.x + ssin * pc.y;
    let ty = qc.y - ssin * pc.x - scos * pc.y;
    Ok(Affine::new([scos, ssin, -ssin, scos, tx, ty]))
}

pub(crate) fn fit_affine(ps: &[Point], qs: &[Point], ws: &[f64]) -> Result<Affine, FitError> {
    check_count("affine", 3, ps.len())?;
    let (pc, qc, _) = weighted_centroids(ps, qs, ws)?;

    let (mut a00, mut a01, mut a11) = (0.0, 0.0, 0.0);
    let (mut b00, mut b01, mut b10, mut b11) = (0.0, 0.0, 0.0, 0.0);
    for ((p, q), &w) in ps.iter().zip(qs).zip(ws) {
        let d1 = *p - pc;
        let d2 = *q - qc;
        a00 += w * d1.x * d1.x;
        a01 += w * d1.x * d1.y;
        a11 += w * d1.y * d1.y;
        b00 += w * d1.x * d2.x;
        b01 += w * d1.x * d2.y;
        b10 += w * d1.y * d2.x;
        b11 += w * d1.y * d2.y;
    }

    let det = a00 * a11 - a01 * a01;
    let scale = a00 * a11;
    if !det.is_finite() || scale <= 0.0 || det.abs() <= SINGULAR_EPS * scale {
        return Err(FitError::singular("affine fit over collinear points"));
    }

    let m00 = (a11 * b00 - a01 * b10) / det;
    let m01 = (a00 * b10 - a01 * b00) / det;
    let m10 = (a11 * b01 - a01 * b11) / det;
    let m11 = (a00 * b11 - a01 * b01) / det;
    let m02 = qc.x - m00 * pc.x - m01 * pc.y;
    let m12 = qc.y - m10 * pc.x - m11 * pc.y;
    Ok(Affine::new([m00, m10, m01, m11, m02, m12]))
}

/// Exact affine through three correspondences, `None` for a degenerate source triangle.
pub(crate) fn triangle_affine(src: [Point; 3], dst: [Point; 3]) -> Option<Affine> {
    let s1 = src[1] - src[0];
    let s2 = src[2] - src[0];
    let d1 = dst[1] - dst[0];
    let d2 = dst[2] - dst[0];

    let det = s1.x * s2.y - s1.y * s2.x;
    if !det.is_finite() || det.abs() <= SINGULAR_EPS * (s1.hypot2() * s2.hypot2()).max(f64::MIN_POSITIVE) {
        return None;
    }

    let m00 = (d1.x * s2.y - d2.x * s1.y) / det;
    let m01 = (-d1.x * s2.x + d2.x * s1.x) / det;
    let m10 = (d1.y * s2.y - d2.y * s1.y) / det;
    let m11 = (-d1.y * s2.x + d2.y * s1.x) / det;
    let tx = dst[0].x - (m00 * src[0].x + m01 * src[0].y);
    let ty = dst[0].y - (m10 * src[0].x + m11 * src[0].y);
    Some(Affine::new([m00, m10, m01, m11, tx, ty]))
}

#[cfg(test)]
#[path = "../../tests/unit/transform/model.rs"]
mod tests;
