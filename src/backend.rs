//! Bundled implementations of the storage seams.

pub mod fs_blob;
pub mod memory;
pub mod moka_cache;

pub use fs_blob::LocalBlobStore;
pub use memory::MemoryStore;
pub use memory::StoreStats;
pub use moka_cache::MokaCache;
