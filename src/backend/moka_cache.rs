use async_trait::async_trait;
use moka::{future::Cache, policy::EvictionPolicy};

use crate::{
    error::CacheError,
    keys::CacheKey,
    settings::CacheSettings,
    traits::CacheBackend,
    types::FavouriteSet,
};

#[derive(Clone, Debug)]
enum CachedValue {
    Blob(Vec<u8>),
    Count(u64),
    FavIds(FavouriteSet),
}

impl CachedValue {
    fn type_name(&self) -> &'static str {
        match self {
            CachedValue::Blob(_) => "blob",
            CachedValue::Count(_) => "count",
            CachedValue::FavIds(_) => "favourites id-set",
        }
    }
}

/// In-process cache backend on top of [`moka`]. Entries expire `ttl` after they were written.
#[derive(Clone)]
pub struct MokaCache {
    cache: Cache<CacheKey, CachedValue>,
}

impl MokaCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(settings.max_capacity())
                .time_to_live(settings.ttl())
                .name(&settings.name())
                .eviction_policy(EvictionPolicy::tiny_lfu())
                .build(),
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Approximate; run [`sync`](Self::sync) first for an exact figure.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Let moka finish its pending housekeeping.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    async fn fetch(&self, key: &CacheKey) -> Result<CachedValue, CacheError> {
        self.cache
            .get(key)
            .await
            .ok_or_else(|| CacheError::Miss(key.to_string()))
    }

    fn wrong_type(key: &CacheKey, expected: &'static str, found: &CachedValue) -> CacheError {
        CacheError::WrongType {
            key: key.to_string(),
            expected,
            found: found.type_name(),
        }
    }
}

#[async_trait]
impl CacheBackend for MokaCache {
    async fn get_blob(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
        match self.fetch(key).await? {
            CachedValue::Blob(bytes) => Ok(bytes),
            other => Err(Self::wrong_type(key, "blob", &other)),
        }
    }

    async fn put_blob(&self, key: &CacheKey, blob: Vec<u8>) -> Result<(), CacheError> {
        self.cache.insert(key.clone(), CachedValue::Blob(blob)).await;
        Ok(())
    }

    async fn get_count(&self, key: &CacheKey) -> Result<u64, CacheError> {
        match self.fetch(key).await? {
            CachedValue::Count(count) => Ok(count),
            other => Err(Self::wrong_type(key, "count", &other)),
        }
    }

    async fn put_count(&self, key: &CacheKey, count: u64) -> Result<(), CacheError> {
        self.cache.insert(key.clone(), CachedValue::Count(count)).await;
        Ok(())
    }

    async fn get_fav_ids(&self, key: &CacheKey) -> Result<FavouriteSet, CacheError> {
        match self.fetch(key).await? {
            CachedValue::FavIds(ids) => Ok(ids),
            other => Err(Self::wrong_type(key, "favourites id-set", &other)),
        }
    }

    async fn put_fav_ids(&self, key: &CacheKey, ids: &FavouriteSet) -> Result<(), CacheError> {
        self.cache.insert(key.clone(), CachedValue::FavIds(ids.clone())).await;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
