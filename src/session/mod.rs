pub(crate) mod bake;
pub(crate) mod editor;
pub(crate) mod scheduler;
pub(crate) mod warp_session;
