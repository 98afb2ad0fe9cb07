//! Handler-facing facade.
//!
//! Reads go through the read-through components, mutations go to the store first and, once committed, through the
//! invalidator. A store failure aborts a mutation before the cache is touched.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use fieldx_plus::child_build;
use fieldx_plus::fx_plus;
use tokio_stream::StreamExt;
use tracing::debug;
use tracing::instrument;

use crate::cache::CacheAccess;
use crate::cache::Lookup;
use crate::codec::default_records_codec;
use crate::codec::RecordsCodec;
use crate::context::RequestContext;
use crate::counter::QuantityCounter;
use crate::error::Error;
use crate::error::Result;
use crate::error::StoreError;
use crate::favourites::FavouritesIndex;
use crate::invalidator::Invalidator;
use crate::keys::fresh_search_generation;
use crate::keys::search_generation_key;
use crate::keys::SearchGeneration;
use crate::keys::ViewKeys;
use crate::keys::NO_GENERATION;
use crate::locks::KeyLocks;
use crate::page::ListQuery;
use crate::page::Listing;
use crate::settings::CacheSettings;
use crate::sort::Sort;
use crate::telemetry::Telemetry;
use crate::traits::BlobStore;
use crate::traits::CacheBackend;
use crate::traits::Store;
use crate::types::Mutation;
use crate::types::Record;
use crate::types::RecordId;
use crate::types::RecordKind;
use crate::types::UserId;
use crate::types::View;
use crate::types::NO_CATEGORY;
use crate::view::CollectionView;

/// The catalog cache. Owns the store, the cache backend and everything the components built out of it share.
///
/// ```ignore
/// let catalog = Catalog::builder()
///     .store(store)
///     .cache(cache)
///     .settings(settings)
///     .build()?;
///
/// let ctx = RequestContext::new();
/// catalog.create_item(&ctx, Record::item("Desk lamp", 25.0, "Lighting")).await?;
/// ```
#[fx_plus(
    parent,
    no_new,
    default(off),
    sync,
    builder(
        doc("Builder object of [`Catalog`].", "", "See [`Catalog::builder()`] method."),
        method_doc("Implement builder pattern for [`Catalog`]."),
    )
)]
pub struct Catalog<S, C>
where
    S: Store,
    C: CacheBackend,
{
    #[fieldx(builder(required, into), get(clone))]
    store: Arc<S>,

    #[fieldx(builder(required, into), get(clone))]
    cache: Arc<C>,

    #[fieldx(get, builder(required))]
    settings: CacheSettings,

    /// Codec of view blobs.
    #[fieldx(get(off), default(default_records_codec()))]
    codec: RecordsCodec,

    #[fieldx(lazy, get(clone), builder(off))]
    telemetry: Telemetry,

    #[fieldx(vis(pub(crate)), lazy, get(clone), builder(off))]
    access: Arc<CacheAccess<C>>,

    #[fieldx(vis(pub(crate)), lazy, get(clone), builder(off))]
    locks: Arc<KeyLocks>,
}

fn component<T, E: Display>(built: std::result::Result<T, E>) -> Result<T> {
    built.map_err(|err| Error::Internal(format!("can't set up a catalog component: {err}")))
}

// Trim names and reject the ones that end up empty. Items without a category are filed under the sentinel.
fn normalise(kind: RecordKind, mut record: Record) -> Result<Record> {
    record.name = record.name.trim().to_string();
    if record.name.is_empty() {
        return Err(Error::invalid(format!("{kind} name must not be empty")));
    }
    match kind {
        RecordKind::Item => {
            let category = record.category.take().unwrap_or_else(|| NO_CATEGORY.to_string());
            let category = category.trim();
            if category.is_empty() {
                return Err(Error::invalid("category name must not be empty"));
            }
            record.category = Some(category.to_string());
            if !record.price.is_finite() || record.price < 0.0 {
                return Err(Error::invalid(format!("bad price {}", record.price)));
            }
        }
        RecordKind::Category => {
            record.category = None;
        }
    }
    Ok(record)
}

impl<S, C> Catalog<S, C>
where
    S: Store,
    C: CacheBackend,
{
    fn build_telemetry(&self) -> Telemetry {
        Telemetry::new(self.settings().name())
    }

    fn build_access(&self) -> Arc<CacheAccess<C>> {
        debug!("[{}] cache client is ready", self.name());
        Arc::new(CacheAccess::new(
            self.cache(),
            Arc::clone(&self.codec),
            self.settings().read_deadline(),
            self.telemetry(),
        ))
    }

    fn build_locks(&self) -> Arc<KeyLocks> {
        Arc::new(KeyLocks::new(self.settings().max_locks()))
    }

    #[inline]
    pub fn name(&self) -> String {
        self.settings().name()
    }

    pub fn view(&self) -> Result<CollectionView<S, C>> {
        component(child_build!(self, CollectionView<S, C>))
    }

    pub fn counter(&self) -> Result<QuantityCounter<S, C>> {
        component(child_build!(self, QuantityCounter<S, C>))
    }

    pub fn invalidator(&self) -> Result<Invalidator<S, C>> {
        component(child_build!(self, Invalidator<S, C>))
    }

    pub fn favourites(&self) -> Result<FavouritesIndex<S, C>> {
        component(child_build!(self, FavouritesIndex<S, C>))
    }

    /// Run a store call under the request's cancellation token.
    pub(crate) async fn store_call<T, F>(&self, ctx: &RequestContext, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        Ok(ctx.run(fut).await??)
    }

    /// Drain the store stream backing `view`. The stream is dropped, and so released, on any early return.
    pub(crate) async fn drain(&self, ctx: &RequestContext, view: &View) -> Result<Vec<Record>> {
        self.telemetry().store_read();
        let mut stream = self.store_call(ctx, self.store.stream_view(view)).await?;
        let mut records = Vec::new();
        while let Some(item) = ctx.run(stream.next()).await? {
            records.push(item?);
        }
        debug!("[{}] drained {} record(s) of {view} from the store", self.name(), records.len());
        Ok(records)
    }

    pub(crate) async fn drain_sorted(&self, ctx: &RequestContext, view: &View, sort: Sort) -> Result<Vec<Record>> {
        let mut records = self.drain(ctx, view).await?;
        sort.apply(&mut records);
        Ok(records)
    }

    /// Keys `view` is cached under, or `None` when it must not be cached right now. Only search views are ever
    /// refused: their keys depend on a search generation that can't always be read.
    pub(crate) async fn view_keys(&self, ctx: &RequestContext, view: &View) -> Result<Option<ViewKeys>> {
        if !matches!(view, View::ItemsBySearch(_)) {
            return Ok(Some(ViewKeys::new(view, NO_GENERATION)));
        }
        let generation = match self.access().read_search_generation(ctx).await? {
            Lookup::Found(generation) => Some(generation),
            Lookup::Missing => self.issue_search_generation(ctx).await?,
            Lookup::Unknown => None,
        };
        if generation.is_none() {
            debug!("[{}] search generation is unknown, {view} is served uncached", self.name());
        }
        Ok(generation.map(|generation| ViewKeys::new(view, generation)))
    }

    // A generation that went missing is replaced with a fresh one, never a reused one.
    async fn issue_search_generation(&self, ctx: &RequestContext) -> Result<Option<SearchGeneration>> {
        let access = self.access();
        let _guard = ctx.run(self.locks().lock(&search_generation_key())).await?;
        // Someone may have issued it while we waited for the lock.
        match access.read_search_generation(ctx).await? {
            Lookup::Found(generation) => Ok(Some(generation)),
            Lookup::Unknown => Ok(None),
            Lookup::Missing => {
                let generation = fresh_search_generation();
                debug!("[{}] issued search generation {generation:016x}", self.name());
                Ok(access
                    .write_search_generation(ctx, generation)
                    .await?
                    .then_some(generation))
            }
        }
    }

    async fn list(&self, ctx: &RequestContext, view: &View, query: &ListQuery) -> Result<Listing> {
        let sort = query.resolve_sort();
        let total = self.counter()?.count(ctx, view).await?;
        let page = query.resolve_page(total as usize)?;
        let records = self.view()?.get(ctx, view, sort, page).await?;
        Ok(Listing { records, total })
    }

    #[instrument(level = "trace", skip(self, ctx))]
    pub async fn list_items(&self, ctx: &RequestContext, query: &ListQuery) -> Result<Listing> {
        self.list(ctx, &View::ItemsAll, query).await
    }

    #[instrument(level = "trace", skip(self, ctx))]
    pub async fn list_by_category(&self, ctx: &RequestContext, category: &str, query: &ListQuery) -> Result<Listing> {
        self.list(ctx, &View::category(category)?, query).await
    }

    #[instrument(level = "trace", skip(self, ctx))]
    pub async fn search_items(&self, ctx: &RequestContext, term: &str, query: &ListQuery) -> Result<Listing> {
        self.list(ctx, &View::search(term)?, query).await
    }

    #[instrument(level = "trace", skip(self, ctx))]
    pub async fn list_favourites(&self, ctx: &RequestContext, user: UserId, query: &ListQuery) -> Result<Listing> {
        self.list(ctx, &View::Favourites(user), query).await
    }

    /// Categories by name. The sentinel category is only listed while some item is filed under it; hiding it
    /// doesn't touch what is cached.
    #[instrument(level = "trace", skip(self, ctx))]
    pub async fn list_categories(&self, ctx: &RequestContext, query: &ListQuery) -> Result<Listing> {
        let mut records = self.view()?.get_all(ctx, &View::Categories, Sort::NAME_ASC).await?;
        let sentinel_used = self.counter()?.count(ctx, &View::category(NO_CATEGORY)?).await? > 0;
        if !sentinel_used {
            records.retain(|r| r.name != NO_CATEGORY);
        }
        let page = query.resolve_page(records.len())?;
        Ok(Listing {
            total:   records.len() as u64,
            records: page.slice(&records)?,
        })
    }

    pub async fn count(&self, ctx: &RequestContext, view: &View) -> Result<u64> {
        self.counter()?.count(ctx, view).await
    }

    pub async fn get_item(&self, ctx: &RequestContext, id: RecordId) -> Result<Record> {
        self.store_call(ctx, self.store.get(RecordKind::Item, id)).await
    }

    pub async fn get_category(&self, ctx: &RequestContext, id: RecordId) -> Result<Record> {
        self.store_call(ctx, self.store.get(RecordKind::Category, id)).await
    }

    async fn create(&self, ctx: &RequestContext, kind: RecordKind, record: Record) -> Result<Record> {
        let mut record = normalise(kind, record)?;
        record.id = self.store_call(ctx, self.store.create(kind, record.clone())).await?;
        debug!("[{}] created {kind} {} '{}'", self.name(), record.id, record.name);
        self.invalidator()?
            .on_mutation(ctx, &Mutation::created(kind, record.clone()))
            .await?;
        Ok(record)
    }

    async fn update(&self, ctx: &RequestContext, kind: RecordKind, record: Record) -> Result<Record> {
        let record = normalise(kind, record)?;
        let old = self.store_call(ctx, self.store.get(kind, record.id)).await?;
        if kind == RecordKind::Category && old.name == NO_CATEGORY && record.name != NO_CATEGORY {
            return Err(Error::invalid(format!("category '{NO_CATEGORY}' can't be renamed")));
        }
        let holders = self.holders_of(ctx, kind, record.id).await?;
        self.store_call(ctx, self.store.update(kind, record.clone())).await?;
        debug!("[{}] updated {kind} {} '{}'", self.name(), record.id, record.name);
        self.invalidator()?
            .on_mutation(ctx, &Mutation::updated(kind, old, record.clone()).with_holders(holders))
            .await?;
        Ok(record)
    }

    async fn delete(&self, ctx: &RequestContext, kind: RecordKind, id: RecordId) -> Result<()> {
        let old = self.store_call(ctx, self.store.get(kind, id)).await?;
        if kind == RecordKind::Category && old.name == NO_CATEGORY {
            return Err(Error::invalid(format!("category '{NO_CATEGORY}' can't be deleted")));
        }
        let holders = self.holders_of(ctx, kind, id).await?;
        self.store_call(ctx, self.store.delete(kind, id)).await?;
        debug!("[{}] deleted {kind} {id} '{}'", self.name(), old.name);
        self.invalidator()?
            .on_mutation(ctx, &Mutation::deleted(kind, old).with_holders(holders))
            .await
    }

    // Favourites reference items only.
    async fn holders_of(&self, ctx: &RequestContext, kind: RecordKind, id: RecordId) -> Result<Vec<UserId>> {
        match kind {
            RecordKind::Item => self.store_call(ctx, self.store.favourited_by(id)).await,
            RecordKind::Category => Ok(Vec::new()),
        }
    }

    #[instrument(level = "trace", skip(self, ctx, record), fields(name = %record.name))]
    pub async fn create_item(&self, ctx: &RequestContext, record: Record) -> Result<Record> {
        self.create(ctx, RecordKind::Item, record).await
    }

    #[instrument(level = "trace", skip(self, ctx, record), fields(id = %record.id))]
    pub async fn update_item(&self, ctx: &RequestContext, record: Record) -> Result<Record> {
        self.update(ctx, RecordKind::Item, record).await
    }

    #[instrument(level = "trace", skip(self, ctx))]
    pub async fn delete_item(&self, ctx: &RequestContext, id: RecordId) -> Result<()> {
        self.delete(ctx, RecordKind::Item, id).await
    }

    #[instrument(level = "trace", skip(self, ctx, record), fields(name = %record.name))]
    pub async fn create_category(&self, ctx: &RequestContext, record: Record) -> Result<Record> {
        self.create(ctx, RecordKind::Category, record).await
    }

    #[instrument(level = "trace", skip(self, ctx, record), fields(id = %record.id))]
    pub async fn update_category(&self, ctx: &RequestContext, record: Record) -> Result<Record> {
        self.update(ctx, RecordKind::Category, record).await
    }

    #[instrument(level = "trace", skip(self, ctx))]
    pub async fn delete_category(&self, ctx: &RequestContext, id: RecordId) -> Result<()> {
        self.delete(ctx, RecordKind::Category, id).await
    }

    pub async fn add_favourite(&self, ctx: &RequestContext, user: UserId, item: RecordId) -> Result<()> {
        self.favourites()?.add(ctx, user, item).await
    }

    pub async fn remove_favourite(&self, ctx: &RequestContext, user: UserId, item: RecordId) -> Result<()> {
        self.favourites()?.remove(ctx, user, item).await
    }

    pub async fn is_favourite(&self, ctx: &RequestContext, user: UserId, item: RecordId) -> Result<bool> {
        self.favourites()?.is_favourite(ctx, user, item).await
    }

    /// Store an image for an item and append its URL to the item's image list.
    pub async fn attach_image<B>(
        &self,
        ctx: &RequestContext,
        blobs: &B,
        item: RecordId,
        name: &str,
        bytes: &[u8],
    ) -> Result<Record>
    where
        B: BlobStore + ?Sized,
    {
        let mut record = self.store_call(ctx, self.store.get(RecordKind::Item, item)).await?;
        let url = self.store_call(ctx, blobs.put(name, bytes)).await?;
        record.images.push(url);
        self.update(ctx, RecordKind::Item, record).await
    }

    /// Drop everything cached on behalf of a user. Call it when the user goes away.
    pub async fn forget_user(&self, ctx: &RequestContext, user: UserId) -> Result<()> {
        self.invalidator()?.forget_user(ctx, user).await
    }
}
