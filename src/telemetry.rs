//! Telemetry seam handed to every component: a name for log lines and a set of counters.
//!
//! Every event is recorded through [`metrics`] as `shop_cache_<event>_total`, labelled with the cache name, so
//! whatever recorder the application installs picks them up. A local copy of the counters backs
//! [`Telemetry::snapshot`].

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Once;

use metrics::describe_counter;
use metrics::Unit;

pub const HIT_TOTAL: &str = "shop_cache_hit_total";
pub const MISS_TOTAL: &str = "shop_cache_miss_total";
pub const SOFT_TIMEOUT_TOTAL: &str = "shop_cache_soft_timeout_total";
pub const ERROR_TOTAL: &str = "shop_cache_error_total";
pub const FILL_TOTAL: &str = "shop_cache_fill_total";
pub const STORE_READ_TOTAL: &str = "shop_cache_store_read_total";
pub const REWRITE_TOTAL: &str = "shop_cache_rewrite_total";
pub const EVICT_TOTAL: &str = "shop_cache_evict_total";

static METRIC_DESCRIPTIONS: Once = Once::new();

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(HIT_TOTAL, Unit::Count, "Cache reads that found a usable entry.");
        describe_counter!(MISS_TOTAL, Unit::Count, "Cache reads of absent entries.");
        describe_counter!(
            SOFT_TIMEOUT_TOTAL,
            Unit::Count,
            "Cache reads abandoned at the soft deadline."
        );
        describe_counter!(ERROR_TOTAL, Unit::Count, "Failed cache reads, writes and evictions.");
        describe_counter!(FILL_TOTAL, Unit::Count, "Views written back after a store read.");
        describe_counter!(STORE_READ_TOTAL, Unit::Count, "Views and counts read from the store.");
        describe_counter!(REWRITE_TOTAL, Unit::Count, "Cached blobs patched in place.");
        describe_counter!(EVICT_TOTAL, Unit::Count, "Cache entries dropped.");
    });
}

#[derive(Debug, Default)]
struct Counters {
    hits:          AtomicU64,
    misses:        AtomicU64,
    soft_timeouts: AtomicU64,
    cache_errors:  AtomicU64,
    fills:         AtomicU64,
    store_reads:   AtomicU64,
    rewrites:      AtomicU64,
    evictions:     AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub hits:          u64,
    pub misses:        u64,
    pub soft_timeouts: u64,
    pub cache_errors:  u64,
    pub fills:         u64,
    pub store_reads:   u64,
    pub rewrites:      u64,
    pub evictions:     u64,
}

#[derive(Debug, Clone)]
pub struct Telemetry {
    name:     Arc<str>,
    counters: Arc<Counters>,
}

impl Telemetry {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        describe_metrics();
        Self {
            name:     Arc::from(name.as_ref()),
            counters: Arc::new(Counters::default()),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn record(&self, counter: &AtomicU64, metric: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(metric, "cache" => self.name.to_string()).increment(1);
    }

    pub(crate) fn hit(&self) {
        self.record(&self.counters.hits, HIT_TOTAL);
    }

    pub(crate) fn miss(&self) {
        self.record(&self.counters.misses, MISS_TOTAL);
    }

    pub(crate) fn soft_timeout(&self) {
        self.record(&self.counters.soft_timeouts, SOFT_TIMEOUT_TOTAL);
    }

    pub(crate) fn cache_error(&self) {
        self.record(&self.counters.cache_errors, ERROR_TOTAL);
    }

    pub(crate) fn fill(&self) {
        self.record(&self.counters.fills, FILL_TOTAL);
    }

    pub(crate) fn store_read(&self) {
        self.record(&self.counters.store_reads, STORE_READ_TOTAL);
    }

    pub(crate) fn rewrite(&self) {
        self.record(&self.counters.rewrites, REWRITE_TOTAL);
    }

    pub(crate) fn eviction(&self) {
        self.record(&self.counters.evictions, EVICT_TOTAL);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let c = &self.counters;
        TelemetrySnapshot {
            hits:          c.hits.load(Ordering::Relaxed),
            misses:        c.misses.load(Ordering::Relaxed),
            soft_timeouts: c.soft_timeouts.load(Ordering::Relaxed),
            cache_errors:  c.cache_errors.load(Ordering::Relaxed),
            fills:         c.fills.load(Ordering::Relaxed),
            store_reads:   c.store_reads.load(Ordering::Relaxed),
            rewrites:      c.rewrites.load(Ordering::Relaxed),
            evictions:     c.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use metrics_util::debugging::DebugValue;
    use metrics_util::debugging::DebuggingRecorder;

    use super::*;

    #[test]
    fn events_reach_the_recorder_labelled_with_the_cache_name() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let telemetry = Telemetry::new("books");

        metrics::with_local_recorder(&recorder, || {
            telemetry.hit();
            telemetry.hit();
            telemetry.eviction();
        });

        let recorded: Vec<(String, Vec<(String, String)>, u64)> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(n) => Some((
                    key.key().name().to_string(),
                    key.key()
                        .labels()
                        .map(|l| (l.key().to_string(), l.value().to_string()))
                        .collect(),
                    n,
                )),
                _ => None,
            })
            .collect();

        let labels = vec![("cache".to_string(), "books".to_string())];
        assert!(recorded.contains(&(HIT_TOTAL.to_string(), labels.clone(), 2)));
        assert!(recorded.contains(&(EVICT_TOTAL.to_string(), labels, 1)));
        assert_eq!(telemetry.snapshot().hits, 2);
        assert_eq!(telemetry.snapshot().evictions, 1);
    }
}
