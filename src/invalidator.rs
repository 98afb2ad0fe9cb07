//! Write-through maintenance of cached views.
//!
//! A committed mutation is turned into a [`Plan`]: patches for the views that can be updated in place and evictions
//! for those that can't. Patching rewrites every cached sort of a view under the per-key lock, so concurrent
//! rewrites of the same blob don't lose each other's changes. Views that aren't cached are left alone; their count is
//! dropped when the mutation may have changed it. Search results are never patched: an item mutation starts a new
//! search generation instead, which orphans every cached search view at once.

use fieldx_plus::fx_plus;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::cache::BlobRead;
use crate::cache::Lookup;
use crate::catalog::Catalog;
use crate::context::RequestContext;
use crate::error::Error;
use crate::error::Result;
use crate::keys::favourites_key;
use crate::keys::fresh_search_generation;
use crate::keys::search_generation_key;
use crate::keys::sorts_of;
use crate::keys::ViewKeys;
use crate::keys::NO_GENERATION;
use crate::sort::Sort;
use crate::traits::CacheBackend;
use crate::traits::Store;
use crate::types::Mutation;
use crate::types::MutationOp;
use crate::types::Record;
use crate::types::RecordId;
use crate::types::RecordKind;
use crate::types::UserId;
use crate::types::View;
use crate::types::NO_CATEGORY;

/// What a mutation does to a single view.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewOp {
    /// The record may be new to the view.
    Insert(Record),
    /// The record already belongs to the view.
    Replace(Record),
    Remove(RecordId),
}

impl ViewOp {
    /// Whether the view's cardinality may change.
    pub fn may_resize(&self) -> bool {
        !matches!(self, ViewOp::Replace(_))
    }

    /// Apply to a sequence kept ordered by `sort`. Returns `false` when there was nothing to do.
    pub fn apply(&self, records: &mut Vec<Record>, sort: Sort) -> bool {
        match self {
            ViewOp::Insert(record) | ViewOp::Replace(record) => {
                if let Some(slot) = records.iter_mut().find(|r| r.id == record.id) {
                    *slot = record.clone();
                }
                else {
                    records.push(record.clone());
                }
                sort.apply(records);
                true
            }
            ViewOp::Remove(id) => {
                let before = records.len();
                records.retain(|r| r.id != *id);
                records.len() != before
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewPatch {
    pub view: View,
    pub op:   ViewOp,
}

impl ViewPatch {
    pub fn new(view: View, op: ViewOp) -> Self {
        Self { view, op }
    }
}

/// Cache work implied by a mutation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Plan {
    pub patches:        Vec<ViewPatch>,
    /// Views dropped from the cache altogether.
    pub evictions:      Vec<View>,
    /// Views whose blobs are dropped while their count stays valid.
    pub blob_evictions: Vec<View>,
    /// `(user, item)` pairs to drop from favourites id-sets.
    pub unfavourite:    Vec<(UserId, RecordId)>,
    /// Start a new search generation.
    pub search:         bool,
}

fn category_view(name: &str) -> Option<View> {
    match View::category(name) {
        Ok(view) => Some(view),
        Err(err) => {
            warn!("skipping category view of '{name}': {err}");
            None
        }
    }
}

fn record_of<'a>(record: &'a Option<Record>, mutation: &Mutation, which: &str) -> Result<&'a Record> {
    record
        .as_ref()
        .ok_or_else(|| Error::invalid(format!("{:?} of a {} carries no {which} record", mutation.op, mutation.kind)))
}

impl Plan {
    pub fn of(mutation: &Mutation) -> Result<Self> {
        let mut plan = Plan::default();
        match mutation.kind {
            RecordKind::Item => plan.item(mutation)?,
            RecordKind::Category => plan.category(mutation)?,
        }
        Ok(plan)
    }

    fn patch(&mut self, view: Option<View>, op: ViewOp) {
        if let Some(view) = view {
            self.patches.push(ViewPatch::new(view, op));
        }
    }

    fn item(&mut self, mutation: &Mutation) -> Result<()> {
        self.search = true;
        match mutation.op {
            MutationOp::Create => {
                let new = record_of(&mutation.new, mutation, "new")?;
                self.patch(Some(View::ItemsAll), ViewOp::Insert(new.clone()));
                self.patch(category_view(new.category_name()), ViewOp::Insert(new.clone()));
            }
            MutationOp::Update => {
                let old = record_of(&mutation.old, mutation, "old")?;
                let new = record_of(&mutation.new, mutation, "new")?;
                self.patch(Some(View::ItemsAll), ViewOp::Replace(new.clone()));
                if old.category_name() == new.category_name() {
                    self.patch(category_view(new.category_name()), ViewOp::Replace(new.clone()));
                }
                else {
                    self.patch(category_view(old.category_name()), ViewOp::Remove(old.id));
                    self.patch(category_view(new.category_name()), ViewOp::Insert(new.clone()));
                }
                for user in &mutation.holders {
                    self.patch(Some(View::Favourites(*user)), ViewOp::Replace(new.clone()));
                }
            }
            MutationOp::Delete => {
                let old = record_of(&mutation.old, mutation, "old")?;
                self.patch(Some(View::ItemsAll), ViewOp::Remove(old.id));
                self.patch(category_view(old.category_name()), ViewOp::Remove(old.id));
                for user in &mutation.holders {
                    self.patch(Some(View::Favourites(*user)), ViewOp::Remove(old.id));
                    self.unfavourite.push((*user, old.id));
                }
            }
        }
        Ok(())
    }

    // Items embed their category's name, so anything that renames a category or moves items out of it makes cached
    // item views stale.
    fn category(&mut self, mutation: &Mutation) -> Result<()> {
        match mutation.op {
            MutationOp::Create => {
                let new = record_of(&mutation.new, mutation, "new")?;
                self.patch(Some(View::Categories), ViewOp::Insert(new.clone()));
            }
            MutationOp::Update => {
                let old = record_of(&mutation.old, mutation, "old")?;
                let new = record_of(&mutation.new, mutation, "new")?;
                self.patch(Some(View::Categories), ViewOp::Replace(new.clone()));
                if old.name != new.name {
                    self.blob_evictions.push(View::ItemsAll);
                    self.evictions.extend(category_view(&old.name));
                    self.evictions.extend(category_view(&new.name));
                    self.search = true;
                }
            }
            MutationOp::Delete => {
                let old = record_of(&mutation.old, mutation, "old")?;
                self.patch(Some(View::Categories), ViewOp::Remove(old.id));
                self.blob_evictions.push(View::ItemsAll);
                self.evictions.extend(category_view(&old.name));
                self.evictions.extend(category_view(NO_CATEGORY));
                self.search = true;
            }
        }
        Ok(())
    }
}

/// Keeps cached views in step with committed mutations.
#[fx_plus(child(Catalog<S, C>, rc_strong), sync, default(off))]
pub struct Invalidator<S, C>
where
    S: Store,
    C: CacheBackend,
{
}

impl<S, C> Invalidator<S, C>
where
    S: Store,
    C: CacheBackend,
{
    /// Bring the cache in line with a mutation the store has already committed. Cache trouble is logged and
    /// swallowed; only cancellation and a malformed mutation are reported.
    pub async fn on_mutation(&self, ctx: &RequestContext, mutation: &Mutation) -> Result<()> {
        let plan = Plan::of(mutation)?;
        debug!(
            "[{}] {:?} of {} {:?}: {} patch(es), {} eviction(s), search: {}",
            self.parent().name(),
            mutation.op,
            mutation.kind,
            mutation.record_id(),
            plan.patches.len(),
            plan.evictions.len() + plan.blob_evictions.len(),
            plan.search
        );
        self.execute(ctx, &plan).await
    }

    pub async fn execute(&self, ctx: &RequestContext, plan: &Plan) -> Result<()> {
        self.parent().locks().advance();
        if plan.search {
            self.start_search_generation(ctx).await?;
        }
        for patch in &plan.patches {
            self.patch_view(ctx, patch).await?;
        }
        for view in &plan.evictions {
            self.evict_view(ctx, view).await?;
        }
        for view in &plan.blob_evictions {
            self.evict_blobs(ctx, view).await?;
        }
        for (user, item) in &plan.unfavourite {
            self.drop_favourite_id(ctx, *user, *item).await?;
        }
        Ok(())
    }

    pub async fn on_favourite_added(&self, ctx: &RequestContext, user: UserId, item: &Record) -> Result<()> {
        let catalog = self.parent();
        let access = catalog.access();
        let key = favourites_key(&user);
        catalog.locks().advance();
        {
            let _guard = ctx.run(catalog.locks().lock(&key)).await?;
            match access.read_fav_ids(ctx, &key).await? {
                Lookup::Found(mut ids) => {
                    ids.insert(item.id, user);
                    access.write_fav_ids(ctx, &key, &ids).await?;
                }
                Lookup::Missing => {
                    // The store already has the new entry, so a fresh load is complete.
                    match catalog
                        .store_call(ctx, catalog.store().favourite_ids_for(user))
                        .await
                    {
                        Ok(ids) => access.write_fav_ids(ctx, &key, &ids).await?,
                        Err(Error::Cancelled) => return Err(Error::Cancelled),
                        Err(err) => warn!("[{}] can't load favourites of {user}: {err}", catalog.name()),
                    }
                }
                Lookup::Unknown => access.evict(ctx, &key).await?,
            }
        }
        self.patch_view(ctx, &ViewPatch::new(View::Favourites(user), ViewOp::Insert(item.clone())))
            .await
    }

    pub async fn on_favourite_removed(&self, ctx: &RequestContext, user: UserId, item: RecordId) -> Result<()> {
        self.parent().locks().advance();
        self.drop_favourite_id(ctx, user, item).await?;
        self.patch_view(ctx, &ViewPatch::new(View::Favourites(user), ViewOp::Remove(item)))
            .await
    }

    /// Drop everything cached for a user.
    pub async fn forget_user(&self, ctx: &RequestContext, user: UserId) -> Result<()> {
        let catalog = self.parent();
        catalog.locks().advance();
        self.evict_view(ctx, &View::Favourites(user)).await?;
        let key = favourites_key(&user);
        let _guard = ctx.run(catalog.locks().lock(&key)).await?;
        catalog.access().evict(ctx, &key).await
    }

    // Search entries of the old generation become unreachable. Should the new one fail to land, dropping the old one
    // does the same job: the next search issues a fresh generation.
    async fn start_search_generation(&self, ctx: &RequestContext) -> Result<()> {
        let catalog = self.parent();
        let access = catalog.access();
        let _guard = ctx.run(catalog.locks().lock(&search_generation_key())).await?;
        let generation = fresh_search_generation();
        if access.write_search_generation(ctx, generation).await? {
            debug!("[{}] search generation is now {generation:016x}", catalog.name());
        }
        else if !access.drop_search_generation(ctx).await? {
            error!(
                "[{}] can't replace the search generation, cached search results may be stale until they expire",
                catalog.name()
            );
        }
        Ok(())
    }

    async fn drop_favourite_id(&self, ctx: &RequestContext, user: UserId, item: RecordId) -> Result<()> {
        let catalog = self.parent();
        let access = catalog.access();
        let key = favourites_key(&user);
        let _guard = ctx.run(catalog.locks().lock(&key)).await?;
        match access.read_fav_ids(ctx, &key).await? {
            Lookup::Found(mut ids) => {
                if ids.remove(&item).is_some() {
                    access.write_fav_ids(ctx, &key, &ids).await?;
                }
            }
            Lookup::Missing => (),
            Lookup::Unknown => access.evict(ctx, &key).await?,
        }
        Ok(())
    }

    async fn patch_view(&self, ctx: &RequestContext, patch: &ViewPatch) -> Result<()> {
        let catalog = self.parent();
        let access = catalog.access();
        let locks = catalog.locks();
        let view = &patch.view;
        let keys = ViewKeys::new(view, NO_GENERATION);
        let mut seen = false;
        let mut resized = None;

        // Patches and fills of one view don't interleave.
        let quantity_key = keys.count();
        let _view_guard = ctx.run(locks.lock(&quantity_key)).await?;

        for sort in sorts_of(view) {
            let key = keys.blob(*sort);
            let _guard = ctx.run(locks.lock(&key)).await?;
            match access.read_blob(ctx, &key).await? {
                BlobRead::Hit(mut records) => {
                    seen = true;
                    let before = records.len();
                    if !patch.op.apply(&mut records, *sort) {
                        continue;
                    }
                    access.write_blob(ctx, &key, &records).await?;
                    catalog.telemetry().rewrite();
                    if records.len() != before {
                        resized = Some(records.len());
                    }
                }
                BlobRead::Miss => (),
                BlobRead::Unknown => access.evict(ctx, &key).await?,
                BlobRead::Corrupt(err) => {
                    error!("[{}] dropped corrupt '{key}' while patching {view}: {err}", catalog.name());
                }
            }
        }

        match resized {
            Some(len) => access.write_count(ctx, &quantity_key, len as u64).await,
            None if !seen && patch.op.may_resize() => access.evict(ctx, &quantity_key).await,
            None => Ok(()),
        }
    }

    async fn evict_keys(&self, ctx: &RequestContext, view: &View, with_count: bool) -> Result<()> {
        let catalog = self.parent();
        let access = catalog.access();
        let locks = catalog.locks();
        let keys = ViewKeys::new(view, NO_GENERATION);
        let quantity_key = keys.count();
        let _view_guard = ctx.run(locks.lock(&quantity_key)).await?;
        for sort in sorts_of(view) {
            let key = keys.blob(*sort);
            let _guard = ctx.run(locks.lock(&key)).await?;
            access.evict(ctx, &key).await?;
        }
        if with_count {
            access.evict(ctx, &quantity_key).await?;
        }
        Ok(())
    }

    async fn evict_blobs(&self, ctx: &RequestContext, view: &View) -> Result<()> {
        self.evict_keys(ctx, view, false).await
    }

    async fn evict_view(&self, ctx: &RequestContext, view: &View) -> Result<()> {
        self.evict_keys(ctx, view, true).await
    }
}
