//! Read-through access to sorted collections.

use fieldx_plus::fx_plus;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::cache::BlobRead;
use crate::catalog::Catalog;
use crate::context::RequestContext;
use crate::error::Error;
use crate::error::Result;
use crate::page::Page;
use crate::sort::Sort;
use crate::traits::CacheBackend;
use crate::traits::Store;
use crate::types::Record;
use crate::types::View;

/// Serves pages of a view out of its cached, fully sorted blob and fills the blob from the store on a miss.
#[fx_plus(child(Catalog<S, C>, rc_strong), sync, default(off))]
pub struct CollectionView<S, C>
where
    S: Store,
    C: CacheBackend,
{
}

/// Categories are only listed by name, ascending.
pub(crate) fn effective_sort(view: &View, sort: Sort) -> Sort {
    match view {
        View::Categories => Sort::NAME_ASC,
        _ => sort,
    }
}

impl<S, C> CollectionView<S, C>
where
    S: Store,
    C: CacheBackend,
{
    /// A page of `view` ordered by `sort`.
    pub async fn get(&self, ctx: &RequestContext, view: &View, sort: Sort, page: Page) -> Result<Vec<Record>> {
        let sequence = self.get_all(ctx, view, sort).await?;
        page.slice(&sequence)
    }

    /// The whole of `view` ordered by `sort`.
    pub async fn get_all(&self, ctx: &RequestContext, view: &View, sort: Sort) -> Result<Vec<Record>> {
        let catalog = self.parent();
        let access = catalog.access();
        let requested = sort;
        let sort = effective_sort(view, sort);
        if sort != requested {
            debug!("[{}] {view} is only kept in {sort} order, ignoring {requested}", catalog.name());
        }

        let Some(keys) = catalog.view_keys(ctx, view).await?
        else {
            return catalog.drain_sorted(ctx, view, sort).await;
        };
        let key = keys.blob(sort);
        match access.read_blob(ctx, &key).await? {
            BlobRead::Hit(mut records) => {
                if !sort.is_sorted(&records) {
                    warn!("[{}] cached '{key}' is out of order, sorting it", catalog.name());
                    sort.apply(&mut records);
                }
                return Ok(records);
            }
            BlobRead::Corrupt(err) => {
                error!("[{}] failing read of {view}: {err}", catalog.name());
                return Err(Error::Internal(format!("corrupt cache entry '{key}': {err}")));
            }
            BlobRead::Miss | BlobRead::Unknown => (),
        }

        let locks = catalog.locks();
        let epoch = locks.epoch();
        let records = catalog.drain_sorted(ctx, view, sort).await?;

        let quantity_key = keys.count();
        let _view_guard = ctx.run(locks.lock(&quantity_key)).await?;
        if locks.epoch() != epoch {
            debug!("[{}] catalog changed while {view} was read, not caching it", catalog.name());
            return Ok(records);
        }
        access.write_blob(ctx, &key, &records).await?;
        access.write_count(ctx, &quantity_key, records.len() as u64).await?;
        catalog.telemetry().fill();
        debug!("[{}] filled '{key}' with {} record(s)", catalog.name(), records.len());

        Ok(records)
    }
}
