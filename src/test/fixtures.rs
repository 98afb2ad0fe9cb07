use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;

use crate::backend::MemoryStore;
use crate::backend::MokaCache;
use crate::catalog::Catalog;
use crate::codec::Codec;
use crate::codec::PostcardCodec;
use crate::keys::search_generation_key;
use crate::keys::ViewKeys;
use crate::keys::NO_GENERATION;
use crate::settings::CacheSettings;
use crate::sort::Sort;
use crate::test::FaultyCache;
use crate::traits::CacheBackend;
use crate::traits::Store;
use crate::types::Record;
use crate::types::RecordKind;
use crate::types::View;

pub type TestCatalog = Catalog<MemoryStore, FaultyCache<MokaCache>>;

pub fn settings() -> CacheSettings {
    CacheSettings::builder()
        .name("test")
        .read_deadline(Duration::from_millis(50))
        .ttl(Duration::from_secs(60))
        .build()
        .expect("test settings")
}

/// A catalog over a fresh memory store and a moka cache wrapped for fault injection.
pub fn catalog() -> (Arc<TestCatalog>, Arc<MemoryStore>, Arc<FaultyCache<MokaCache>>) {
    catalog_with(settings())
}

pub fn catalog_with(settings: CacheSettings) -> (Arc<TestCatalog>, Arc<MemoryStore>, Arc<FaultyCache<MokaCache>>) {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(FaultyCache::new(Arc::new(MokaCache::new(&settings))));
    let catalog = Catalog::builder()
        .store(Arc::clone(&store))
        .cache(Arc::clone(&cache))
        .settings(settings)
        .build()
        .expect("test catalog");
    (catalog, store, cache)
}

/// Seed items and the categories they reference.
pub fn seed_items(store: &MemoryStore, items: &[(&str, f64, &str)]) -> Vec<Record> {
    let mut categories: Vec<&str> = items.iter().map(|(_, _, c)| *c).collect();
    categories.sort_unstable();
    categories.dedup();
    store.seed(RecordKind::Category, categories.into_iter().map(Record::category));

    let records: Vec<Record> = items
        .iter()
        .map(|(name, price, category)| Record::item(*name, *price, *category))
        .collect();
    store.seed(RecordKind::Item, records.clone());
    records
}

pub fn names(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.name.as_str()).collect()
}

/// Keys `view` lives under right now. `None` for a search view while there is no search generation.
pub async fn keys_of(cache: &FaultyCache<MokaCache>, view: &View) -> Option<ViewKeys> {
    let generation = match view {
        View::ItemsBySearch(_) => cache.inner().get_count(&search_generation_key()).await.ok()?,
        _ => NO_GENERATION,
    };
    Some(ViewKeys::new(view, generation))
}

/// Decoded blob of `(view, sort)` as it sits in the cache, bypassing the fault injection layer.
pub async fn cached_blob(cache: &FaultyCache<MokaCache>, view: &View, sort: Sort) -> Option<Vec<Record>> {
    let key = keys_of(cache, view).await?.blob(sort);
    let bytes = cache.inner().get_blob(&key).await.ok()?;
    PostcardCodec::<[Record]>::new().decode(&bytes).ok()
}

pub async fn cached_count(cache: &FaultyCache<MokaCache>, view: &View) -> Option<u64> {
    let key = keys_of(cache, view).await?.count();
    cache.inner().get_count(&key).await.ok()
}

/// What a fill of `(view, sort)` would produce right now.
pub async fn fresh_view(store: &MemoryStore, view: &View, sort: Sort) -> Vec<Record> {
    let mut stream = store.stream_view(view).await.expect("store stream");
    let mut records = Vec::new();
    while let Some(record) = stream.next().await {
        records.push(record.expect("streamed record"));
    }
    sort.apply(&mut records);
    records
}
