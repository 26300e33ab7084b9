pub mod cache;
pub mod manifold;
pub mod smoothing;
pub mod types;
