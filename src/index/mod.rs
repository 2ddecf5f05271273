//! Approximate nearest-neighbor index (C6).

pub mod hnsw;

pub use hnsw::HnswIndex;
