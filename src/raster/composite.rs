use crate::foundation::math::{add_sat_u8, mul_div255_u8, u8_to_unit, unit_to_u8, unpremultiply_rgba8};

pub type PremulRgba8 = [u8; 4];

/// How a tile or range composites onto what is below it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Subtract,
    Multiply,
    Difference,
}

impl BlendMode {
    pub fn is_normal(self) -> bool {
        matches!(self, Self::Normal)
    }
}

/// Source-over for premultiplied pixels.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = add_sat_u8(src[i], mul_div255_u8(u16::from(dst[i]), inv));
    }
    out
}

/// Composite `src` onto `dst` with the separable blend function of `mode`.
///
/// `co = cs·(1−ab) + cb·(1−as) + as·ab·B(Cb, Cs)`, alpha is plain source-over.
pub fn blend(mode: BlendMode, dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if mode.is_normal() {
        return over(dst, src);
    }
    if src[3] == 0 {
        return dst;
    }

    let sa = u8_to_unit(src[3]);
    let da = u8_to_unit(dst[3]);
    let mut out = [0u8; 4];
    for i in 0..3 {
        let sc = u8_to_unit(src[i]);
        let dc = u8_to_unit(dst[i]);
        let cs = sc / sa;
        let cb = if da > 0.0 { dc / da } else { 0.0 };
        let b = match mode {
            BlendMode::Normal => cs,
            BlendMode::Add => (cb + cs).min(1.0),
            BlendMode::Subtract => (cb - cs).max(0.0),
            BlendMode::Multiply => cb * cs,
            BlendMode::Difference => (cb - cs).abs(),
        };
        out[i] = unit_to_u8(sc * (1.0 - da) + dc * (1.0 - sa) + sa * da * b);
    }
    out[3] = unit_to_u8(sa + da - sa * da);
    out
}

/// Replace the alpha of a premultiplied pixel with `coverage`, rescaling its color.
pub fn with_coverage(px: PremulRgba8, coverage: u8) -> PremulRgba8 {
    if px[3] == coverage {
        return px;
    }
    let straight = unpremultiply_rgba8(px);
    let a = u16::from(coverage);
    [
        mul_div255_u8(u16::from(straight[0]), a),
        mul_div255_u8(u16::from(straight[1]), a),
        mul_div255_u8(u16::from(straight[2]), a),
        coverage,
    ]
}

#[cfg(test)]
#[path = "../../tests/unit/raster/composite.rs"]
mod tests;
