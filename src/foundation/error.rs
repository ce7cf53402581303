/// Convenience result type used across tilewarp.
pub type WarpResult<T> = Result<T, WarpError>;

/// Top-level error taxonomy used by pipeline APIs.
#[derive(thiserror::Error, Debug)]
pub enum WarpError {
    /// Invalid caller-provided data (options, viewport, tiles).
    #[error("validation error: {0}")]
    Validation(String),

    /// A tile or range could not be rasterized.
    #[error("render error: {0}")]
    Render(String),

    /// The control points do not define a usable deformation.
    #[error("model fit error: {0}")]
    Fit(#[from] FitError),

    /// A location could not be mapped back through a mesh.
    #[error("location ({x}, {y}) is outside the invertible mesh")]
    NonInvertible {
        /// X coordinate of the rejected location.
        x: f64,
        /// Y coordinate of the rejected location.
        y: f64,
    },

    /// Errors while folding a deformation into tiles.
    #[error("bake error: {0}")]
    Bake(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WarpError {
    /// Build a [`WarpError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`WarpError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`WarpError::Bake`] value.
    pub fn bake(msg: impl Into<String>) -> Self {
        Self::Bake(msg.into())
    }

    /// Soft failures skip the current recomputation and are retried on the next trigger.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Fit(_) | Self::NonInvertible { .. })
    }
}

/// Outcome of fitting a model to control points when no transform can be produced.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Fewer control points than the model needs.
    #[error("{model} model needs {required} control points, got {available}")]
    InsufficientData {
        /// Model name.
        model: &'static str,
        /// Minimum number of points.
        required: usize,
        /// Points supplied.
        available: usize,
    },

    /// The points are degenerate for the model (coincident, collinear, non-finite).
    #[error("singular model: {0}")]
    Singular(String),
}

impl FitError {
    pub(crate) fn singular(msg: impl Into<String>) -> Self {
        Self::Singular(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
