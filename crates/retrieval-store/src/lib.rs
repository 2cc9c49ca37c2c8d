//! LanceDB persistence for the retrieval engine: session snapshots and a
//! content-hash keyed embedding cache.

pub mod cache;
pub mod schema;
pub mod snapshot;
pub mod table;

pub use cache::{CacheStats, CachedEmbedder};
pub use snapshot::{load_snapshot, read_snapshot_info, save_snapshot, SnapshotInfo};
