//! Moving-least-squares deformation driven by control points.
//!
//! Each evaluated location fits its own local model, weighting every control point by
//! `1 / |p_i − x|^(2α)`. The model kind follows the number of points: one point is a global
//! translation, two use a similarity, three or more an affine.

use crate::foundation::core::{Affine, Point, Vec2};
use crate::foundation::error::{FitError, WarpError, WarpResult};
use crate::transform::coordinate::CoordinateTransform;
use crate::transform::model::{fit_affine, fit_similarity, fit_translation};

/// A correspondence between a reference (`local`) and a target (`world`) location.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ControlPoint {
    pub local: Point,
    pub world: Point,
}

impl ControlPoint {
    pub fn new(local: Point, world: Point) -> Self {
        Self { local, world }
    }

    /// Point whose reference and target coincide.
    pub fn fixed(at: Point) -> Self {
        Self::new(at, at)
    }
}

/// Local model fitted at every evaluated location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalModel {
    Translation,
    Similarity,
    Affine,
}

impl LocalModel {
    pub fn min_points(self) -> usize {
        match self {
            Self::Translation => 1,
            Self::Similarity => 2,
            Self::Affine => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Translation => "translation",
            Self::Similarity => "similarity",
            Self::Affine => "affine",
        }
    }

    /// Model used for `n` control points, `None` when there are none.
    pub fn for_count(n: usize) -> Option<Self> {
        match n {
            0 => None,
            1 => Some(Self::Translation),
            2 => Some(Self::Similarity),
            _ => Some(Self::Affine),
        }
    }

    fn fit(self, ps: &[Point], qs: &[Point], ws: &[f64]) -> Result<Affine, FitError> {
        match self {
            Self::Translation => fit_translation(ps, qs, ws),
            Self::Similarity => fit_similarity(ps, qs, ws),
            Self::Affine => fit_affine(ps, qs, ws),
        }
    }
}

/// Fitted moving-least-squares state.
#[derive(Clone, Debug, PartialEq)]
pub struct Mls {
    model: LocalModel,
    alpha: f64,
    ps: Vec<Point>,
    qs: Vec<Point>,
}

impl Mls {
    pub fn model(&self) -> LocalModel {
        self.model
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn eval(&self, x: Point) -> Point {
        let mut ws = Vec::with_capacity(self.ps.len());
        for (p, q) in self.ps.iter().zip(&self.qs) {
            let d2 = (*p - x).hypot2();
            if d2 <= 0.0 {
                return *q;
            }
            ws.push(1.0 / d2.powf(self.alpha));
        }
        match self.model.fit(&self.ps, &self.qs, &ws) {
            Ok(m) => m * x,
            // Locally degenerate weights: leave the location where it is.
            Err(_) => x,
        }
    }
}

/// The deformation selected by the current control-point set.
#[derive(Clone, Debug, PartialEq)]
pub enum Deformation {
    Identity,
    Translation(Vec2),
    TranslationMls(Mls),
    Similarity(Mls),
    AffineMls(Mls),
}

impl Deformation {
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }
}

impl CoordinateTransform for Deformation {
    fn apply(&self, p: Point) -> Point {
        match self {
            Self::Identity => p,
            Self::Translation(t) => p + *t,
            Self::TranslationMls(m) | Self::Similarity(m) | Self::AffineMls(m) => m.eval(p),
        }
    }

    fn apply_inverse(&self, p: Point) -> WarpResult<Point> {
        match self {
            Self::Identity => Ok(p),
            Self::Translation(t) => Ok(p - *t),
            _ => Err(WarpError::NonInvertible { x: p.x, y: p.y }),
        }
    }

    fn as_affine(&self) -> Option<Affine> {
        match self {
            Self::Identity => Some(Affine::IDENTITY),
            Self::Translation(t) => Some(Affine::translate(*t)),
            _ => None,
        }
    }
}

fn check_finite(points: &[ControlPoint]) -> Result<(), FitError> {
    let finite = |p: Point| p.x.is_finite() && p.y.is_finite();
    if points.iter().all(|c| finite(c.local) && finite(c.world)) {
        Ok(())
    } else {
        Err(FitError::singular("control point with non-finite coordinates"))
    }
}

/// Fit with the model implied by the number of points.
pub fn fit_deformation(points: &[ControlPoint], alpha: f64) -> Result<Deformation, FitError> {
    match LocalModel::for_count(points.len()) {
        None => Ok(Deformation::Identity),
        Some(model) => fit_with_model(points, model, alpha),
    }
}

/// Fit a specific local model, rejecting configurations it cannot represent anywhere.
pub fn fit_with_model(
    points: &[ControlPoint],
    model: LocalModel,
    alpha: f64,
) -> Result<Deformation, FitError> {
    if points.len() < model.min_points() {
        return Err(FitError::InsufficientData {
            model: model.name(),
            required: model.min_points(),
            available: points.len(),
        });
    }
    check_finite(points)?;
    if !(alpha.is_finite() && alpha > 0.0) {
        return Err(FitError::singular(format!("invalid stiffness {alpha}")));
    }

    let ps: Vec<Point> = points.iter().map(|c| c.local).collect();
    let qs: Vec<Point> = points.iter().map(|c| c.world).collect();

    // A uniformly weighted fit fails exactly when every local fit would.
    let uniform = vec![1.0; ps.len()];
    let global = model.fit(&ps, &qs, &uniform)?;

    Ok(match model {
        LocalModel::Translation if ps.len() == 1 => Deformation::Translation(global.translation()),
        LocalModel::Translation => Deformation::TranslationMls(Mls {
            model,
            alpha,
            ps,
            qs,
        }),
        LocalModel::Similarity => Deformation::Similarity(Mls {
            model,
            alpha,
            ps,
            qs,
        }),
        LocalModel::Affine => Deformation::AffineMls(Mls {
            model,
            alpha,
            ps,
            qs,
        }),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/transform/mls.rs"]
mod tests;
