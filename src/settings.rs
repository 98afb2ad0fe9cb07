use std::time::Duration;

use fieldx::fxstruct;

/// Tunables of the catalog cache.
///
/// ```ignore
/// let settings = CacheSettings::builder()
///     .name("catalog")
///     .read_deadline(Duration::from_millis(50))
///     .build()?;
/// ```
#[derive(Clone, Debug)]
#[fxstruct(no_new, builder, get(copy))]
pub struct CacheSettings {
    /// Name used in log lines.
    #[fieldx(get(clone), builder(into), default(String::from("catalog")))]
    name: String,

    /// Soft deadline of a single cache read. Expiry counts as a miss.
    #[fieldx(default(Duration::from_millis(100)))]
    read_deadline: Duration,

    /// Entry lifetime for the bundled moka backend.
    #[fieldx(default(Duration::from_secs(300)))]
    ttl: Duration,

    /// Entry capacity for the bundled moka backend.
    #[fieldx(default(10_000))]
    max_capacity: u64,

    /// How many idle per-key rewrite locks are kept around.
    #[fieldx(default(4_096))]
    max_locks: u64,
}
