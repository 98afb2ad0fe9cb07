use std::error::Error as StdError;
use std::time::Duration;
use std::time::Instant;

use shop_cache::keys::blob_key;
use shop_cache::prelude::*;
use shop_cache::test::*;

type TestResult = Result<(), Box<dyn StdError>>;

const TRIO: [(&str, f64, &str); 3] = [("Alpha", 10.0, "X"), ("Bravo", 5.0, "X"), ("Charlie", 7.5, "X")];

#[tokio::test]
async fn cache_outage_falls_back_to_the_store() -> TestResult {
    let (catalog, store, cache) = catalog();
    seed_items(&store, &TRIO);
    let ctx = RequestContext::new();
    cache.go_down(true);

    for _ in 0..3 {
        let listing = catalog.list_items(&ctx, &ListQuery::new().sort("price", "asc")).await?;
        assert_eq!(names(&listing.records), ["Bravo", "Charlie", "Alpha"]);
        assert_eq!(listing.total, 3);
    }
    assert_eq!(store.stats().streams_opened, 3, "every read went to the store");
    assert!(catalog.telemetry().snapshot().cache_errors > 0);

    // Writes keep working too; the cache is simply not maintained.
    catalog.create_item(&ctx, Record::item("Delta", 6.0, "X")).await?;

    cache.go_down(false);
    let listing = catalog.list_items(&ctx, &ListQuery::new().sort("price", "asc")).await?;
    assert_eq!(names(&listing.records), ["Bravo", "Delta", "Charlie", "Alpha"]);
    Ok(())
}

#[tokio::test]
async fn slow_cache_reads_are_abandoned() -> TestResult {
    let (catalog, store, cache) = catalog();
    seed_items(&store, &TRIO);
    let ctx = RequestContext::new();
    catalog.list_items(&ctx, &ListQuery::new()).await?;

    cache.set_read_delay(Duration::from_secs(2));
    let started = Instant::now();
    let listing = catalog.list_items(&ctx, &ListQuery::new()).await?;
    assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    assert_eq!(names(&listing.records), ["Alpha", "Bravo", "Charlie"]);
    assert!(catalog.telemetry().snapshot().soft_timeouts >= 2);
    assert_eq!(store.stats().streams_opened, 2, "timed out read counts as a miss");
    Ok(())
}

#[tokio::test]
async fn corrupt_blob_fails_the_read_and_is_dropped() -> TestResult {
    let (catalog, store, cache) = catalog();
    seed_items(&store, &TRIO);
    let ctx = RequestContext::new();
    let view = View::ItemsAll;
    catalog.view()?.get_all(&ctx, &view, Sort::NAME_ASC).await?;

    let key = blob_key(&view, Sort::NAME_ASC);
    cache.corrupt(&key).await;

    let err = catalog.view()?.get_all(&ctx, &view, Sort::NAME_ASC).await.unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
    assert_eq!(err.http_status(), 500);
    assert!(cache.inner().get_blob(&key).await.unwrap_err().is_miss());

    let again = catalog.view()?.get_all(&ctx, &view, Sort::NAME_ASC).await?;
    assert_eq!(names(&again), ["Alpha", "Bravo", "Charlie"]);
    Ok(())
}

#[tokio::test]
async fn corrupt_blob_does_not_stop_invalidation() -> TestResult {
    let (catalog, store, cache) = catalog();
    seed_items(&store, &TRIO);
    let ctx = RequestContext::new();
    for sort in Sort::ALL {
        catalog.view()?.get_all(&ctx, &View::ItemsAll, sort).await?;
    }
    let broken = blob_key(&View::ItemsAll, Sort::PRICE_ASC);
    cache.corrupt(&broken).await;

    catalog.create_item(&ctx, Record::item("Delta", 6.0, "X")).await?;

    assert!(cache.inner().get_blob(&broken).await.unwrap_err().is_miss());
    let patched = cached_blob(&cache, &View::ItemsAll, Sort::NAME_ASC).await.expect("patched");
    assert_eq!(names(&patched), ["Alpha", "Bravo", "Charlie", "Delta"]);
    assert_eq!(cached_count(&cache, &View::ItemsAll).await, Some(4));
    Ok(())
}

#[tokio::test]
async fn store_outage_fails_cold_reads_but_not_warm_ones() -> TestResult {
    let (catalog, store, _cache) = catalog();
    seed_items(&store, &TRIO);
    let ctx = RequestContext::new();
    catalog.list_items(&ctx, &ListQuery::new()).await?;

    store.set_available(false);
    let warm = catalog.list_items(&ctx, &ListQuery::new()).await?;
    assert_eq!(warm.records.len(), 3);

    let err = catalog
        .list_items(&ctx, &ListQuery::new().sort("price", "desc"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));
    assert_eq!(err.http_status(), 500);
    Ok(())
}

#[tokio::test]
async fn broken_stream_caches_nothing() -> TestResult {
    let (catalog, store, cache) = catalog();
    seed_items(&store, &TRIO);
    store.fail_streams_after(Some(2));
    let ctx = RequestContext::new();

    let err = catalog
        .view()?
        .get_all(&ctx, &View::ItemsAll, Sort::NAME_ASC)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));
    assert!(cached_blob(&cache, &View::ItemsAll, Sort::NAME_ASC).await.is_none());

    store.fail_streams_after(None);
    let all = catalog.view()?.get_all(&ctx, &View::ItemsAll, Sort::NAME_ASC).await?;
    assert_eq!(all.len(), 3);
    Ok(())
}

#[tokio::test]
async fn cancelled_fill_releases_the_stream() -> TestResult {
    let (catalog, store, cache) = catalog();
    let items: Vec<String> = (0..50).map(|i| format!("item {i:02}")).collect();
    let items: Vec<(&str, f64, &str)> = items.iter().map(|n| (n.as_str(), 1.0, "X")).collect();
    seed_items(&store, &items);
    store.set_stream_delay(Duration::from_millis(20));

    let ctx = RequestContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = catalog
        .view()?
        .get_all(&ctx, &View::ItemsAll, Sort::NAME_ASC)
        .await
        .unwrap_err();
    assert_eq!(err, Error::Cancelled);
    assert_eq!(err.http_status(), 499);
    assert!(cached_blob(&cache, &View::ItemsAll, Sort::NAME_ASC).await.is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.stats().streams_open, 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_request_does_nothing() {
    let (catalog, store, _cache) = catalog();
    seed_items(&store, &TRIO);
    let ctx = RequestContext::new();
    ctx.cancel();

    let err = catalog.list_items(&ctx, &ListQuery::new()).await.unwrap_err();
    assert_eq!(err, Error::Cancelled);
    assert_eq!(store.stats().streams_opened, 0);
    assert_eq!(store.stats().counts, 0);
}
