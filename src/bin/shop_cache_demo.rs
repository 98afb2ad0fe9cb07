use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use shop_cache::prelude::*;
use tracing::info;

#[derive(Debug, Clone, clap::Parser)]
#[clap(about, version, author, name = "shop-cache-demo")]
struct Cli {
    /// Name used in log lines.
    #[clap(long, env = "SHOPCACHE_NAME", default_value = "catalog")]
    name: String,

    /// Soft deadline of a cache read, milliseconds.
    #[clap(long, env = "SHOPCACHE_READ_DEADLINE_MS", default_value_t = 100)]
    read_deadline_ms: u64,

    /// Cache entry lifetime, seconds.
    #[clap(long, env = "SHOPCACHE_TTL_SECS", default_value_t = 300)]
    ttl_secs: u64,

    /// Cache capacity, entries.
    #[clap(long, env = "SHOPCACHE_MAX_CAPACITY", default_value_t = 10_000)]
    max_capacity: u64,

    /// Number of extra generated items.
    #[clap(long, env = "SHOPCACHE_ITEMS", default_value_t = 0)]
    items: usize,

    /// Print only the summary.
    #[clap(long, short, env = "SHOPCACHE_QUIET", default_value_t = false)]
    quiet: bool,
}

impl Cli {
    fn settings(&self) -> Result<CacheSettings> {
        CacheSettings::builder()
            .name(self.name.clone())
            .read_deadline(Duration::from_millis(self.read_deadline_ms))
            .ttl(Duration::from_secs(self.ttl_secs))
            .max_capacity(self.max_capacity)
            .build()
            .map_err(|e| anyhow::anyhow!("bad settings: {e}"))
    }
}

fn setup_tracing() -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("installing tracing subscriber")?;

    info!("Tracing initialized");
    Ok(())
}

type DemoCatalog = Catalog<MemoryStore, MokaCache>;

struct Demo {
    cli:     Cli,
    catalog: Arc<DemoCatalog>,
    ctx:     RequestContext,
}

impl Demo {
    fn new(cli: Cli) -> Result<Self> {
        let settings = cli.settings()?;
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MokaCache::new(&settings));
        let catalog = Catalog::builder()
            .store(store)
            .cache(cache)
            .settings(settings)
            .build()
            .map_err(|e| anyhow::anyhow!("can't build the catalog: {e}"))?;
        Ok(Self {
            catalog,
            ctx: RequestContext::new(),
            cli,
        })
    }

    fn show(&self, title: &str, listing: &Listing) {
        if self.cli.quiet {
            return;
        }
        println!("{title} ({} total)", listing.total);
        for record in &listing.records {
            println!("  {:<24} {:>10.2}  {}", record.name, record.price, record.category_name());
        }
    }

    async fn list(&self, title: &str, query: &ListQuery) -> Result<()> {
        let listing = self.catalog.list_items(&self.ctx, query).await?;
        self.show(title, &listing);
        Ok(())
    }

    async fn seed(&self) -> Result<Vec<Record>> {
        let ctx = &self.ctx;
        for name in ["Lighting", "Furniture"] {
            self.catalog.create_category(ctx, Record::category(name)).await?;
        }

        let mut created = Vec::new();
        for (name, price, category) in [
            ("Alpha", 10.0, "Lighting"),
            ("Bravo", 5.0, "Lighting"),
            ("Charlie", 7.5, "Furniture"),
        ] {
            created.push(self.catalog.create_item(ctx, Record::item(name, price, category)).await?);
        }
        for i in 0..self.cli.items {
            let category = if i % 2 == 0 { "Lighting" } else { "Furniture" };
            self.catalog
                .create_item(ctx, Record::item(format!("Item {i:04}"), (i % 97) as f64 + 0.99, category))
                .await?;
        }
        Ok(created)
    }

    async fn run(&self) -> Result<()> {
        let ctx = &self.ctx;
        let created = self.seed().await?;
        let by_price = ListQuery::new().sort("price", "asc");

        // Cold read fills the cache, the second one is served from it.
        self.list("Items by price", &by_price).await?;
        self.list("Items by price, again", &by_price).await?;

        let delta = self
            .catalog
            .create_item(ctx, Record::item("Delta", 6.0, "Furniture"))
            .await?;
        self.list("After creating Delta", &by_price).await?;

        let mut alpha = created[0].clone();
        alpha.price = 1.0;
        self.catalog.update_item(ctx, alpha).await?;
        self.list("After Alpha got cheaper", &by_price).await?;

        self.catalog.delete_item(ctx, delta.id).await?;
        self.list("After deleting Delta", &by_price).await?;

        let user = uuid::Uuid::new_v4();
        self.catalog.add_favourite(ctx, user, created[1].id).await?;
        let listing = self.catalog.list_favourites(ctx, user, &ListQuery::new()).await?;
        self.show("Favourites", &listing);
        info!(
            "Bravo is favourite: {}, Charlie is favourite: {}",
            self.catalog.is_favourite(ctx, user, created[1].id).await?,
            self.catalog.is_favourite(ctx, user, created[2].id).await?
        );

        let listing = self.catalog.list_categories(ctx, &ListQuery::new()).await?;
        self.show("Categories", &listing);

        let stats = self.catalog.telemetry().snapshot();
        println!(
            "hits: {}, misses: {}, fills: {}, store reads: {}, rewrites: {}, evictions: {}",
            stats.hits, stats.misses, stats.fills, stats.store_reads, stats.rewrites, stats.evictions
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing()?;
    Demo::new(cli)?.run().await
}
