//! Dense vector index: brute-force nearest neighbours by squared L2
//! distance over fixed-dimension vectors.

pub mod flat;

pub use flat::{similarity, FlatIndex, Neighbor};
