use crate::foundation::error::{WarpError, WarpResult};

pub use kurbo::{Affine, Point, Rect, Size, Vec2};

/// Stable identity of a tile across rebuilds.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TileId(pub u64);

/// Identity of a layer (a z-ordered stack of tiles).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct LayerId(pub u32);

/// The visible world rectangle and the zoom factor it is displayed at.
///
/// Screen space is world space translated by `-rect.origin()` and scaled by `zoom`. Range buffers
/// add a `pad` margin on every side of the screen rectangle.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub rect: Rect,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(rect: Rect, zoom: f64) -> WarpResult<Self> {
        if !(zoom.is_finite() && zoom > 0.0) {
            return Err(WarpError::validation("viewport zoom must be finite and > 0"));
        }
        if !rect.is_finite() || rect.width() < 0.0 || rect.height() < 0.0 {
            return Err(WarpError::validation(
                "viewport rect must be finite with non-negative size",
            ));
        }
        Ok(Self { rect, zoom })
    }

    /// Screen size in device pixels, rounded to nearest.
    pub fn screen_size(&self) -> (u32, u32) {
        (
            (self.rect.width() * self.zoom + 0.5) as u32,
            (self.rect.height() * self.zoom + 0.5) as u32,
        )
    }

    /// Size of a range buffer: screen size plus `pad` on every side, saturating at `u32::MAX`.
    pub fn padded_size(&self, pad: u32) -> (u32, u32) {
        let (w, h) = self.screen_size();
        let margin = pad.saturating_mul(2);
        (w.saturating_add(margin), h.saturating_add(margin))
    }

    /// World -> padded buffer space.
    pub fn world_to_buffer(&self, pad: u32) -> Affine {
        let pad = f64::from(pad);
        Affine::translate((pad, pad))
            * Affine::scale(self.zoom)
            * Affine::translate(-self.rect.origin().to_vec2())
    }

    /// Padded buffer space -> world.
    pub fn buffer_to_world(&self, pad: u32) -> Affine {
        let offset = f64::from(pad) / self.zoom;
        Affine::translate((self.rect.x0 - offset, self.rect.y0 - offset))
            * Affine::scale(1.0 / self.zoom)
    }

    /// World -> screen (unpadded) space.
    pub fn world_to_screen(&self) -> Affine {
        self.world_to_buffer(0)
    }

    /// Screen (device) coordinates -> world coordinates.
    pub fn screen_to_world(&self, device: Point) -> Point {
        Point::new(
            self.rect.x0 + device.x / self.zoom,
            self.rect.y0 + device.y / self.zoom,
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
