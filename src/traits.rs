use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::CacheError;
use crate::error::StoreError;
use crate::keys::CacheKey;
use crate::types::FavouriteSet;
use crate::types::Record;
use crate::types::RecordId;
use crate::types::RecordKind;
use crate::types::UserId;
use crate::types::View;

/// Lazily produced records. Dropping the stream releases whatever the store holds for it.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record, StoreError>> + Send>>;

/// The durable record repository. It is the only authority; everything the cache holds can be rebuilt from it.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn create(&self, kind: RecordKind, record: Record) -> Result<RecordId, StoreError>;
    /// The id is taken from the record.
    async fn update(&self, kind: RecordKind, record: Record) -> Result<(), StoreError>;
    async fn delete(&self, kind: RecordKind, id: RecordId) -> Result<(), StoreError>;
    async fn get(&self, kind: RecordKind, id: RecordId) -> Result<Record, StoreError>;

    async fn stream_all(&self, kind: RecordKind) -> Result<RecordStream, StoreError>;
    async fn stream_by_category(&self, category: &str) -> Result<RecordStream, StoreError>;
    async fn stream_by_search(&self, term: &str) -> Result<RecordStream, StoreError>;
    async fn stream_favourites_for(&self, user: UserId) -> Result<RecordStream, StoreError>;

    async fn favourite_ids_for(&self, user: UserId) -> Result<FavouriteSet, StoreError>;
    /// Users holding the item among their favourites.
    async fn favourited_by(&self, item: RecordId) -> Result<Vec<UserId>, StoreError>;
    async fn count(&self, view: &View) -> Result<u64, StoreError>;

    async fn add_favourite(&self, user: UserId, item: RecordId) -> Result<(), StoreError>;
    async fn remove_favourite(&self, user: UserId, item: RecordId) -> Result<(), StoreError>;

    /// Open the stream backing a view.
    async fn stream_view(&self, view: &View) -> Result<RecordStream, StoreError> {
        match view {
            View::ItemsAll => self.stream_all(RecordKind::Item).await,
            View::Categories => self.stream_all(RecordKind::Category).await,
            View::ItemsByCategory(name) => self.stream_by_category(name.as_str()).await,
            View::ItemsBySearch(term) => self.stream_by_search(term.as_str()).await,
            View::Favourites(user) => self.stream_favourites_for(*user).await,
        }
    }
}

/// Fast key/value store with expiry. Entry lifetime is the backend's business.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// [`CacheError::Miss`] when there is no entry.
    async fn get_blob(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError>;
    async fn put_blob(&self, key: &CacheKey, blob: Vec<u8>) -> Result<(), CacheError>;
    async fn get_count(&self, key: &CacheKey) -> Result<u64, CacheError>;
    async fn put_count(&self, key: &CacheKey, count: u64) -> Result<(), CacheError>;
    async fn get_fav_ids(&self, key: &CacheKey) -> Result<FavouriteSet, CacheError>;
    async fn put_fav_ids(&self, key: &CacheKey, ids: &FavouriteSet) -> Result<(), CacheError>;
    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;
}

/// Storage for image attachments.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store the bytes and return the URL they are served from.
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StoreError>;
}
