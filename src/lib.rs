//! # shop-cache
//!
//! Read-through and write-through cache coordinator for the catalog of an online shop.
//!
//! The catalog is a durable [`Store`](traits::Store) of items and categories plus per-user favourites. Listing views
//! of it is what a shop does most, so every view is kept in a fast [`CacheBackend`](traits::CacheBackend) as a fully
//! sorted blob, one per sort order, next to a cached count of its records.
//!
//! # The Basics
//!
//! - **Reads** take the blob of the requested `(view, sort)` and slice a page out of it. On a miss the view is drained
//!   from the store, sorted, served and written back.
//! - **Writes** go to the store first. Once committed, the affected blobs are patched in place, views that can't be
//!   patched are evicted, and counts follow the blobs.
//! - **The cache is never trusted for correctness.** Each cache read is bounded by a soft deadline; a timeout, an
//!   error or an unreadable entry counts as a miss and the request is served from the store.
//! - **Requests can be cancelled** at any suspension point through their [`RequestContext`](context::RequestContext).
//!
//! ```ignore
//! let settings = CacheSettings::builder().name("catalog").build()?;
//! let store = Arc::new(MemoryStore::new());
//! let cache = Arc::new(MokaCache::new(&settings));
//! let catalog = Catalog::builder().store(store).cache(cache).settings(settings).build()?;
//!
//! let ctx = RequestContext::new();
//! catalog.create_item(&ctx, Record::item("Desk lamp", 25.0, "Lighting")).await?;
//! let page = catalog.list_items(&ctx, &ListQuery::new().sort("price", "desc")).await?;
//! ```
//!
//! # Keys
//!
//! See the [`keys`] module for the layout of cache keys. Entry lifetime is the backend's business; the bundled
//! [`MokaCache`](backend::MokaCache) expires entries after [`CacheSettings::ttl`](settings::CacheSettings).
//!
//! # Consistency
//!
//! A view is rewritten under a per-key lock, so concurrent mutations of one process don't lose each other's
//! changes. Two readers missing the same view both fill it with the same content. A reader only writes back what it
//! drained if no mutation of this process started in the meantime. Search results are cached per search generation
//! and every item mutation starts a new one.

pub mod backend;
pub(crate) mod cache;
pub mod catalog;
pub mod codec;
pub mod context;
pub mod counter;
pub mod error;
pub mod favourites;
pub mod invalidator;
pub mod keys;
pub(crate) mod locks;
pub mod page;
pub mod settings;
pub mod sort;
pub mod telemetry;
pub mod traits;
pub mod types;
pub mod view;

#[doc(inline)]
pub use catalog::Catalog;
#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use traits::CacheBackend;
#[doc(inline)]
pub use traits::Store;

pub mod prelude {
    pub use crate::backend::LocalBlobStore;
    pub use crate::backend::MemoryStore;
    pub use crate::backend::MokaCache;
    pub use crate::catalog::Catalog;
    pub use crate::codec::Codec;
    pub use crate::codec::PostcardCodec;
    pub use crate::context::RequestContext;
    pub use crate::error::CacheError;
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::error::StoreError;
    pub use crate::page::ListQuery;
    pub use crate::page::Listing;
    pub use crate::page::Page;
    pub use crate::settings::CacheSettings;
    pub use crate::sort::Sort;
    pub use crate::sort::SortOrder;
    pub use crate::sort::SortType;
    pub use crate::telemetry::Telemetry;
    pub use crate::traits::BlobStore;
    pub use crate::traits::CacheBackend;
    pub use crate::traits::RecordStream;
    pub use crate::traits::Store;
    pub use crate::types::*;
}
