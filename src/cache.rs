//! Guarded access to the cache backend.
//!
//! Reads are bounded by the soft deadline and never fail because of the cache: a timeout, a backend error or a
//! wrong entry type all look like a miss to the caller. Writes are best-effort. The only error that escapes is
//! request cancellation.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::codec::RecordsCodec;
use crate::context::Deadline;
use crate::context::RequestContext;
use crate::error::CacheError;
use crate::error::CodecError;
use crate::error::Result;
use crate::keys::search_generation_key;
use crate::keys::CacheKey;
use crate::keys::SearchGeneration;
use crate::telemetry::Telemetry;
use crate::traits::CacheBackend;
use crate::types::FavouriteSet;
use crate::types::Record;

/// Outcome of a guarded read.
#[derive(Debug)]
pub(crate) enum Lookup<T> {
    Found(T),
    Missing,
    /// Timed out or failed. The entry may or may not exist.
    Unknown,
}

impl<T> Lookup<T> {
    pub(crate) fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            _ => None,
        }
    }
}

/// Outcome of a blob read.
#[derive(Debug)]
pub(crate) enum BlobRead {
    Hit(Vec<Record>),
    Miss,
    /// Read failed or timed out.
    Unknown,
    /// The entry exists but doesn't decode. It has already been evicted.
    Corrupt(CodecError),
}

pub(crate) struct CacheAccess<C>
where
    C: CacheBackend,
{
    backend:       Arc<C>,
    records_codec: RecordsCodec,
    read_deadline: Duration,
    telemetry:     Telemetry,
}

impl<C> CacheAccess<C>
where
    C: CacheBackend,
{
    pub(crate) fn new(
        backend: Arc<C>,
        records_codec: RecordsCodec,
        read_deadline: Duration,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            backend,
            records_codec,
            read_deadline,
            telemetry,
        }
    }

    #[inline]
    fn name(&self) -> &str {
        self.telemetry.name()
    }

    // Common part of every read: soft deadline, miss accounting, error logging.
    async fn guarded_read<T, F>(&self, ctx: &RequestContext, key: &CacheKey, fut: F) -> Result<Lookup<T>>
    where
        F: std::future::Future<Output = std::result::Result<T, CacheError>>,
    {
        match ctx.run_within(self.read_deadline, fut).await? {
            Deadline::Done(Ok(v)) => Ok(Lookup::Found(v)),
            Deadline::Done(Err(CacheError::Miss(_))) => {
                self.telemetry.miss();
                Ok(Lookup::Missing)
            }
            Deadline::Done(Err(err)) => {
                self.telemetry.cache_error();
                warn!("[{}] cache read of '{key}' failed, treating as miss: {err}", self.name());
                Ok(Lookup::Unknown)
            }
            Deadline::Expired => {
                self.telemetry.soft_timeout();
                debug!(
                    "[{}] cache read of '{key}' exceeded {:?}, treating as miss",
                    self.name(),
                    self.read_deadline
                );
                Ok(Lookup::Unknown)
            }
        }
    }

    // Returns whether the write landed. Failures are logged and swallowed.
    async fn guarded_write<F>(&self, ctx: &RequestContext, key: &CacheKey, fut: F) -> Result<bool>
    where
        F: std::future::Future<Output = std::result::Result<(), CacheError>>,
    {
        if let Err(err) = ctx.run(fut).await? {
            self.telemetry.cache_error();
            warn!("[{}] cache write of '{key}' failed, ignoring: {err}", self.name());
            return Ok(false);
        }
        Ok(true)
    }

    pub(crate) async fn read_blob(&self, ctx: &RequestContext, key: &CacheKey) -> Result<BlobRead> {
        let bytes = match self.guarded_read(ctx, key, self.backend.get_blob(key)).await? {
            Lookup::Found(bytes) => bytes,
            Lookup::Missing => return Ok(BlobRead::Miss),
            Lookup::Unknown => return Ok(BlobRead::Unknown),
        };

        match self.records_codec.decode(&bytes) {
            Ok(records) => {
                self.telemetry.hit();
                Ok(BlobRead::Hit(records))
            }
            Err(err) => {
                error!("[{}] blob '{key}' is corrupt, evicting: {err}", self.name());
                self.evict(ctx, key).await?;
                Ok(BlobRead::Corrupt(err))
            }
        }
    }

    pub(crate) async fn write_blob(&self, ctx: &RequestContext, key: &CacheKey, records: &[Record]) -> Result<()> {
        let bytes = match self.records_codec.encode(records) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("[{}] can't encode blob '{key}', evicting instead: {err}", self.name());
                return self.evict(ctx, key).await;
            }
        };
        self.guarded_write(ctx, key, self.backend.put_blob(key, bytes)).await?;
        Ok(())
    }

    pub(crate) async fn read_count(&self, ctx: &RequestContext, key: &CacheKey) -> Result<Option<u64>> {
        let count = self.guarded_read(ctx, key, self.backend.get_count(key)).await?.found();
        if count.is_some() {
            self.telemetry.hit();
        }
        Ok(count)
    }

    pub(crate) async fn write_count(&self, ctx: &RequestContext, key: &CacheKey, count: u64) -> Result<()> {
        self.guarded_write(ctx, key, self.backend.put_count(key, count)).await?;
        Ok(())
    }

    pub(crate) async fn read_fav_ids(&self, ctx: &RequestContext, key: &CacheKey) -> Result<Lookup<FavouriteSet>> {
        let ids = self.guarded_read(ctx, key, self.backend.get_fav_ids(key)).await?;
        if matches!(ids, Lookup::Found(_)) {
            self.telemetry.hit();
        }
        Ok(ids)
    }

    pub(crate) async fn write_fav_ids(&self, ctx: &RequestContext, key: &CacheKey, ids: &FavouriteSet) -> Result<()> {
        self.guarded_write(ctx, key, self.backend.put_fav_ids(key, ids)).await?;
        Ok(())
    }

    pub(crate) async fn evict(&self, ctx: &RequestContext, key: &CacheKey) -> Result<()> {
        self.remove(ctx, key).await?;
        Ok(())
    }

    // Returns whether the entry is gone. A miss counts as gone.
    async fn remove(&self, ctx: &RequestContext, key: &CacheKey) -> Result<bool> {
        self.telemetry.eviction();
        match ctx.run(self.backend.delete(key)).await? {
            Ok(()) => Ok(true),
            Err(err) if err.is_miss() => Ok(true),
            Err(err) => {
                self.telemetry.cache_error();
                warn!("[{}] eviction of '{key}' failed: {err}", self.name());
                Ok(false)
            }
        }
    }

    /// Current search generation. An entry of the wrong type reads as [`Lookup::Unknown`].
    pub(crate) async fn read_search_generation(&self, ctx: &RequestContext) -> Result<Lookup<SearchGeneration>> {
        let key = search_generation_key();
        self.guarded_read(ctx, &key, self.backend.get_count(&key)).await
    }

    /// Returns whether the generation was stored.
    pub(crate) async fn write_search_generation(
        &self,
        ctx: &RequestContext,
        generation: SearchGeneration,
    ) -> Result<bool> {
        let key = search_generation_key();
        self.guarded_write(ctx, &key, self.backend.put_count(&key, generation)).await
    }

    /// Returns whether the generation is gone.
    pub(crate) async fn drop_search_generation(&self, ctx: &RequestContext) -> Result<bool> {
        self.remove(ctx, &search_generation_key()).await
    }
}
