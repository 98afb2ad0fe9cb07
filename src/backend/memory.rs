//! Reference [`Store`] keeping everything in memory.
//!
//! Besides being a working store it carries a few knobs for exercising failure paths: an availability switch, a
//! per-record stream delay, mid-stream failure injection and call accounting.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::RecordStream;
use crate::traits::Store;
use crate::types::FavouriteSet;
use crate::types::Record;
use crate::types::RecordId;
use crate::types::RecordKind;
use crate::types::UserId;
use crate::types::View;
use crate::types::NO_CATEGORY;

#[derive(Debug, Default)]
struct Tables {
    items:      BTreeMap<RecordId, Record>,
    categories: BTreeMap<RecordId, Record>,
    favourites: BTreeSet<(UserId, RecordId)>,
}

impl Tables {
    fn table(&self, kind: RecordKind) -> &BTreeMap<RecordId, Record> {
        match kind {
            RecordKind::Item => &self.items,
            RecordKind::Category => &self.categories,
        }
    }

    fn table_mut(&mut self, kind: RecordKind) -> &mut BTreeMap<RecordId, Record> {
        match kind {
            RecordKind::Item => &mut self.items,
            RecordKind::Category => &mut self.categories,
        }
    }

    fn category_named(&self, name: &str) -> Option<&Record> {
        self.categories.values().find(|c| c.name == name)
    }

    fn items_of(&self, view: &View) -> Vec<Record> {
        match view {
            View::ItemsAll => self.items.values().cloned().collect(),
            View::Categories => self.categories.values().cloned().collect(),
            View::ItemsByCategory(name) => self
                .items
                .values()
                .filter(|r| r.category_name() == name.as_str())
                .cloned()
                .collect(),
            View::ItemsBySearch(term) => {
                let term = term.as_str().to_lowercase();
                self.items
                    .values()
                    .filter(|r| r.name.to_lowercase().contains(&term) || r.description.to_lowercase().contains(&term))
                    .cloned()
                    .collect()
            }
            View::Favourites(user) => self
                .favourites
                .range((*user, RecordId::nil())..=(*user, RecordId::max()))
                .filter_map(|(_, item)| self.items.get(item).cloned())
                .collect(),
        }
    }
}

/// Call accounting of a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub streams_opened: u64,
    pub counts:         u64,
    /// Streams whose producer hasn't finished or been dropped yet.
    pub streams_open:   usize,
}

// Decrements the open stream counter when the producer goes away.
struct OpenStream(Arc<AtomicUsize>);

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MemoryStore {
    tables:         RwLock<Tables>,
    available:      AtomicBool,
    stream_delay:   Mutex<Duration>,
    fail_after:     Mutex<Option<usize>>,
    streams_opened: AtomicU64,
    counts:         AtomicU64,
    streams_open:   Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store holding only the sentinel category.
    pub fn new() -> Self {
        let mut tables = Tables::default();
        let sentinel = Record::category(NO_CATEGORY);
        tables.categories.insert(sentinel.id, sentinel);
        Self {
            tables:         RwLock::new(tables),
            available:      AtomicBool::new(true),
            stream_delay:   Mutex::new(Duration::ZERO),
            fail_after:     Mutex::new(None),
            streams_opened: AtomicU64::new(0),
            counts:         AtomicU64::new(0),
            streams_open:   Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Put records straight into the store, bypassing every check.
    pub fn seed<I>(&self, kind: RecordKind, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        let mut tables = self.tables.write();
        for record in records {
            tables.table_mut(kind).insert(record.id, Self::normalised(kind, record));
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay before each streamed record.
    pub fn set_stream_delay(&self, delay: Duration) {
        *self.stream_delay.lock() = delay;
    }

    /// Make streams fail after producing `records` records.
    pub fn fail_streams_after(&self, records: Option<usize>) {
        *self.fail_after.lock() = records;
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            streams_opened: self.streams_opened.load(Ordering::SeqCst),
            counts:         self.counts.load(Ordering::SeqCst),
            streams_open:   self.streams_open.load(Ordering::SeqCst),
        }
    }

    pub fn reset_stats(&self) {
        self.streams_opened.store(0, Ordering::SeqCst);
        self.counts.store(0, Ordering::SeqCst);
    }

    pub fn sentinel(&self) -> Option<Record> {
        self.tables.read().category_named(NO_CATEGORY).cloned()
    }

    fn normalised(kind: RecordKind, mut record: Record) -> Record {
        if kind == RecordKind::Item && record.category.is_none() {
            record.category = Some(NO_CATEGORY.to_string());
        }
        record
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        }
        else {
            Err(StoreError::Unavailable("memory store is switched off".into()))
        }
    }

    fn stream_of(&self, records: Vec<Record>) -> RecordStream {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        self.streams_open.fetch_add(1, Ordering::SeqCst);
        let guard = OpenStream(Arc::clone(&self.streams_open));
        let delay = *self.stream_delay.lock();
        let fail_after = *self.fail_after.lock();

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let _guard = guard;
            for (produced, record) in records.into_iter().enumerate() {
                if fail_after.is_some_and(|limit| produced >= limit) {
                    let _ = tx
                        .send(Err(StoreError::StreamAborted(format!("aborted after {produced} record(s)"))))
                        .await;
                    return;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(record)).await.is_err() {
                    // Consumer is gone.
                    return;
                }
            }
        });
        Box::pin(ReceiverStream::new(rx))
    }

    fn stream_view_now(&self, view: &View) -> Result<RecordStream, StoreError> {
        self.ensure_available()?;
        let records = self.tables.read().items_of(view);
        Ok(self.stream_of(records))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create(&self, kind: RecordKind, record: Record) -> Result<RecordId, StoreError> {
        self.ensure_available()?;
        let record = Self::normalised(kind, record);
        let mut tables = self.tables.write();
        if kind == RecordKind::Category && tables.category_named(&record.name).is_some() {
            return Err(StoreError::Rejected(format!("category '{}' already exists", record.name)));
        }
        let id = record.id;
        tables.table_mut(kind).insert(id, record);
        Ok(id)
    }

    async fn update(&self, kind: RecordKind, record: Record) -> Result<(), StoreError> {
        self.ensure_available()?;
        let record = Self::normalised(kind, record);
        let mut tables = self.tables.write();
        let old_name = match tables.table(kind).get(&record.id) {
            Some(old) => old.name.clone(),
            None => return Err(StoreError::NotFound(format!("{kind} {}", record.id))),
        };

        if kind == RecordKind::Category && old_name != record.name {
            if tables.category_named(&record.name).is_some() {
                return Err(StoreError::Rejected(format!("category '{}' already exists", record.name)));
            }
            for item in tables.items.values_mut() {
                if item.category.as_deref() == Some(old_name.as_str()) {
                    item.category = Some(record.name.clone());
                }
            }
            debug!("renamed category '{old_name}' to '{}'", record.name);
        }

        tables.table_mut(kind).insert(record.id, record);
        Ok(())
    }

    async fn delete(&self, kind: RecordKind, id: RecordId) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        let Some(old) = tables.table_mut(kind).remove(&id)
        else {
            return Err(StoreError::NotFound(format!("{kind} {id}")));
        };

        match kind {
            RecordKind::Item => tables.favourites.retain(|(_, item)| *item != id),
            RecordKind::Category => {
                for item in tables.items.values_mut() {
                    if item.category.as_deref() == Some(old.name.as_str()) {
                        item.category = Some(NO_CATEGORY.to_string());
                    }
                }
            }
        }
        Ok(())
    }

    async fn get(&self, kind: RecordKind, id: RecordId) -> Result<Record, StoreError> {
        self.ensure_available()?;
        self.tables
            .read()
            .table(kind)
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{kind} {id}")))
    }

    async fn stream_all(&self, kind: RecordKind) -> Result<RecordStream, StoreError> {
        self.stream_view_now(match kind {
            RecordKind::Item => &View::ItemsAll,
            RecordKind::Category => &View::Categories,
        })
    }

    async fn stream_by_category(&self, category: &str) -> Result<RecordStream, StoreError> {
        let view = View::category(category).map_err(|e| StoreError::Rejected(e.to_string()))?;
        self.stream_view_now(&view)
    }

    async fn stream_by_search(&self, term: &str) -> Result<RecordStream, StoreError> {
        let view = View::search(term).map_err(|e| StoreError::Rejected(e.to_string()))?;
        self.stream_view_now(&view)
    }

    async fn stream_favourites_for(&self, user: UserId) -> Result<RecordStream, StoreError> {
        self.stream_view_now(&View::Favourites(user))
    }

    async fn favourite_ids_for(&self, user: UserId) -> Result<FavouriteSet, StoreError> {
        self.ensure_available()?;
        Ok(self
            .tables
            .read()
            .favourites
            .range((user, RecordId::nil())..=(user, RecordId::max()))
            .map(|(user, item)| (*item, *user))
            .collect())
    }

    async fn favourited_by(&self, item: RecordId) -> Result<Vec<UserId>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .tables
            .read()
            .favourites
            .iter()
            .filter(|(_, i)| *i == item)
            .map(|(user, _)| *user)
            .collect())
    }

    async fn count(&self, view: &View) -> Result<u64, StoreError> {
        self.ensure_available()?;
        self.counts.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.read().items_of(view).len() as u64)
    }

    async fn add_favourite(&self, user: UserId, item: RecordId) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        if !tables.items.contains_key(&item) {
            return Err(StoreError::NotFound(format!("item {item}")));
        }
        tables.favourites.insert((user, item));
        Ok(())
    }

    async fn remove_favourite(&self, user: UserId, item: RecordId) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.tables.write().favourites.remove(&(user, item));
        Ok(())
    }
}
