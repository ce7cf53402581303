pub(crate) mod range;
pub(crate) mod rasterize;
pub(crate) mod source;
