use crate::foundation::core::{Point, Viewport};
use crate::foundation::error::WarpResult;
use crate::transform::coordinate::{Conjugated, CoordinateTransform};
use crate::transform::engine::MeshTransformEngine;
use crate::transform::mls::ControlPoint;

/// Keyboard state accompanying a pointer press.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        control: false,
    };
    pub const SHIFT: Self = Self {
        shift: true,
        control: false,
    };
    pub const SHIFT_CONTROL: Self = Self {
        shift: true,
        control: true,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressOutcome {
    /// An existing point was grabbed for dragging.
    Captured(usize),
    Added(usize),
    Removed(usize),
    Missed,
}

impl PressOutcome {
    pub fn changed_points(self) -> bool {
        matches!(self, Self::Added(_) | Self::Removed(_))
    }
}

/// Interactive editing of the control-point set.
///
/// Positions are world coordinates; the capture radius is constant on screen.
#[derive(Clone, Debug)]
pub struct ControlPointEditor {
    points: Vec<ControlPoint>,
    captured: Option<usize>,
    last: Point,
    capture_radius_px: f64,
}

impl ControlPointEditor {
    pub fn new(capture_radius_px: f64) -> Self {
        Self {
            points: Vec::new(),
            captured: None,
            last: Point::ORIGIN,
            capture_radius_px,
        }
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    pub fn captured(&self) -> Option<usize> {
        self.captured
    }

    pub fn set_points(&mut self, points: Vec<ControlPoint>) {
        self.points = points;
        self.captured = None;
    }

    /// Nearest point with squared world distance strictly below `(radius / zoom)²`.
    pub fn hit_test(&self, world: Point, zoom: f64) -> Option<usize> {
        let r = self.capture_radius_px / zoom;
        let limit = r * r;
        self.points
            .iter()
            .enumerate()
            .map(|(i, cp)| (i, (cp.world - world).hypot2()))
            .filter(|&(_, d2)| d2 < limit)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    pub fn press(
        &mut self,
        world: Point,
        viewport: &Viewport,
        modifiers: Modifiers,
        engine: &MeshTransformEngine,
    ) -> PressOutcome {
        let hit = self.hit_test(world, viewport.zoom);
        match (hit, modifiers.shift, modifiers.control) {
            (Some(i), true, true) => {
                self.remove(i);
                PressOutcome::Removed(i)
            }
            (Some(i), _, _) => {
                self.captured = Some(i);
                self.last = world;
                PressOutcome::Captured(i)
            }
            (None, true, false) => {
                let local = match self.undeformed(world, viewport, engine) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            x = world.x,
                            y = world.y,
                            "cannot map new control point through current warp, using clicked position"
                        );
                        world
                    }
                };
                self.points.push(ControlPoint::new(local, world));
                let i = self.points.len() - 1;
                self.captured = Some(i);
                self.last = world;
                PressOutcome::Added(i)
            }
            (None, _, _) => PressOutcome::Missed,
        }
    }

    /// Move the captured point by the pointer delta. Returns whether anything moved.
    pub fn drag(&mut self, world: Point) -> bool {
        let Some(i) = self.captured else {
            return false;
        };
        let delta = world - self.last;
        self.last = world;
        match self.points.get_mut(i) {
            Some(cp) if delta.hypot2() > 0.0 => {
                cp.world += delta;
                true
            }
            _ => false,
        }
    }

    /// Apply the final delta and drop the capture.
    pub fn release(&mut self, world: Point) -> bool {
        let moved = self.drag(world);
        self.captured = None;
        moved
    }

    /// Removing a point keeps the others untouched; a capture on a later point follows its index.
    fn remove(&mut self, i: usize) {
        self.points.remove(i);
        self.captured = match self.captured {
            Some(c) if c == i => None,
            Some(c) if c > i => Some(c - 1),
            other => other,
        };
    }

    /// Where `world`, as currently displayed, sits before deformation.
    fn undeformed(
        &self,
        world: Point,
        viewport: &Viewport,
        engine: &MeshTransformEngine,
    ) -> WarpResult<Point> {
        if self.points.is_empty() {
            return Ok(world);
        }
        let deformation = engine.fit(&self.points)?;
        let composite = Conjugated::new(viewport.buffer_to_world(0), deformation)?;
        let to_world = composite.frame();
        let screen = viewport.world_to_screen() * world;
        let local = match composite.apply_inverse(screen) {
            Ok(p) => p,
            Err(_) => {
                let w = (viewport.rect.width() * viewport.zoom).ceil();
                let h = (viewport.rect.height() * viewport.zoom).ceil();
                composite
                    .build_mesh(w, h, engine.opts().mesh_subdivisions)
                    .apply_inverse(screen)?
            }
        };
        Ok(to_world * local)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/editor.rs"]
mod tests;
