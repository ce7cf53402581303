pub(crate) mod coordinate;
pub(crate) mod engine;
pub(crate) mod mesh;
pub(crate) mod mls;
pub(crate) mod model;
