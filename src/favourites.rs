use fieldx_plus::fx_plus;
use tracing::debug;

use crate::cache::Lookup;
use crate::catalog::Catalog;
use crate::context::RequestContext;
use crate::error::Result;
use crate::keys::favourites_key;
use crate::page::Page;
use crate::sort::Sort;
use crate::traits::CacheBackend;
use crate::traits::Store;
use crate::types::Record;
use crate::types::RecordId;
use crate::types::RecordKind;
use crate::types::UserId;
use crate::types::View;

/// Per-user favourites: membership checks backed by a cached id-set, listing through the regular view machinery.
#[fx_plus(child(Catalog<S, C>, rc_strong), sync, default(off))]
pub struct FavouritesIndex<S, C>
where
    S: Store,
    C: CacheBackend,
{
}

impl<S, C> FavouritesIndex<S, C>
where
    S: Store,
    C: CacheBackend,
{
    pub async fn is_favourite(&self, ctx: &RequestContext, user: UserId, item: RecordId) -> Result<bool> {
        let catalog = self.parent();
        let access = catalog.access();
        let key = favourites_key(&user);
        if let Lookup::Found(ids) = access.read_fav_ids(ctx, &key).await? {
            return Ok(ids.contains_key(&item));
        }

        if catalog.counter()?.count(ctx, &View::Favourites(user)).await? == 0 {
            debug!("[{}] {user} has no favourites", catalog.name());
            return Ok(false);
        }

        let _guard = ctx.run(catalog.locks().lock(&key)).await?;
        // Someone may have loaded it while we waited for the lock.
        if let Lookup::Found(ids) = access.read_fav_ids(ctx, &key).await? {
            return Ok(ids.contains_key(&item));
        }
        catalog.telemetry().store_read();
        let ids = catalog
            .store_call(ctx, catalog.store().favourite_ids_for(user))
            .await?;
        access.write_fav_ids(ctx, &key, &ids).await?;
        Ok(ids.contains_key(&item))
    }

    pub async fn list(&self, ctx: &RequestContext, user: UserId, sort: Sort, page: Page) -> Result<Vec<Record>> {
        self.parent()
            .view()?
            .get(ctx, &View::Favourites(user), sort, page)
            .await
    }

    /// Add an item to the user's favourites. Fails with `NotFound` when the item doesn't exist.
    pub async fn add(&self, ctx: &RequestContext, user: UserId, item: RecordId) -> Result<()> {
        let catalog = self.parent();
        let store = catalog.store();
        let record = catalog.store_call(ctx, store.get(RecordKind::Item, item)).await?;
        catalog.store_call(ctx, store.add_favourite(user, item)).await?;
        catalog.invalidator()?.on_favourite_added(ctx, user, &record).await
    }

    pub async fn remove(&self, ctx: &RequestContext, user: UserId, item: RecordId) -> Result<()> {
        let catalog = self.parent();
        catalog
            .store_call(ctx, catalog.store().remove_favourite(user, item))
            .await?;
        catalog.invalidator()?.on_favourite_removed(ctx, user, item).await
    }
}
