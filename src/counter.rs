use fieldx_plus::fx_plus;
use tracing::debug;

use crate::catalog::Catalog;
use crate::context::RequestContext;
use crate::error::Result;
use crate::traits::CacheBackend;
use crate::traits::Store;
use crate::types::View;

/// Cached cardinality of views.
#[fx_plus(child(Catalog<S, C>, rc_strong), sync, default(off))]
pub struct QuantityCounter<S, C>
where
    S: Store,
    C: CacheBackend,
{
}

impl<S, C> QuantityCounter<S, C>
where
    S: Store,
    C: CacheBackend,
{
    pub async fn count(&self, ctx: &RequestContext, view: &View) -> Result<u64> {
        let catalog = self.parent();
        let access = catalog.access();
        let store = catalog.store();
        let Some(keys) = catalog.view_keys(ctx, view).await?
        else {
            catalog.telemetry().store_read();
            return catalog.store_call(ctx, store.count(view)).await;
        };

        let key = keys.count();
        if let Some(count) = access.read_count(ctx, &key).await? {
            return Ok(count);
        }

        let locks = catalog.locks();
        let epoch = locks.epoch();
        catalog.telemetry().store_read();
        let count = catalog.store_call(ctx, store.count(view)).await?;

        let _view_guard = ctx.run(locks.lock(&key)).await?;
        if locks.epoch() == epoch {
            access.write_count(ctx, &key, count).await?;
            debug!("[{}] cached count of {view}: {count}", catalog.name());
        }
        Ok(count)
    }
}
