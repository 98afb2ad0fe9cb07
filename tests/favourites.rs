use std::error::Error as StdError;

use shop_cache::keys::favourites_key;
use shop_cache::prelude::*;
use shop_cache::test::*;
use uuid::Uuid;

type TestResult = Result<(), Box<dyn StdError>>;

#[tokio::test]
async fn add_check_list_remove() -> TestResult {
    let (catalog, store, cache) = catalog();
    let records = seed_items(&store, &[("Alpha", 10.0, "X"), ("Bravo", 5.0, "X")]);
    let (a, b) = (records[0].id, records[1].id);
    let user = Uuid::new_v4();
    let ctx = RequestContext::new();

    catalog.add_favourite(&ctx, user, a).await?;
    assert!(catalog.is_favourite(&ctx, user, a).await?);
    assert!(!catalog.is_favourite(&ctx, user, b).await?);

    let ids = cache.inner().get_fav_ids(&favourites_key(&user)).await?;
    assert_eq!(ids.get(&a), Some(&user));

    let listing = catalog.list_favourites(&ctx, user, &ListQuery::new()).await?;
    assert_eq!(names(&listing.records), ["Alpha"]);
    assert_eq!(listing.total, 1);

    catalog.remove_favourite(&ctx, user, a).await?;
    assert!(!catalog.is_favourite(&ctx, user, a).await?);
    assert_eq!(catalog.count(&ctx, &View::Favourites(user)).await?, 0);
    let blob = cached_blob(&cache, &View::Favourites(user), Sort::NAME_ASC).await.expect("patched");
    assert!(blob.is_empty());
    Ok(())
}

#[tokio::test]
async fn membership_agrees_with_the_list() -> TestResult {
    let (catalog, store, _cache) = catalog();
    let records = seed_items(
        &store,
        &[("Alpha", 10.0, "X"), ("Bravo", 5.0, "X"), ("Charlie", 7.5, "Y"), ("Delta", 1.0, "Y")],
    );
    let user = Uuid::new_v4();
    let ctx = RequestContext::new();

    for record in [&records[0], &records[2], &records[3]] {
        catalog.add_favourite(&ctx, user, record.id).await?;
    }
    catalog.remove_favourite(&ctx, user, records[3].id).await?;

    let listed = catalog
        .favourites()?
        .list(&ctx, user, Sort::PRICE_DESC, Page::new(0, 10)?)
        .await?;
    assert_eq!(names(&listed), ["Alpha", "Charlie"]);
    for record in &records {
        let listed_here = listed.iter().any(|r| r.id == record.id);
        assert_eq!(catalog.is_favourite(&ctx, user, record.id).await?, listed_here, "{}", record.name);
    }
    Ok(())
}

#[tokio::test]
async fn membership_survives_a_cold_cache() -> TestResult {
    let (catalog, store, cache) = catalog();
    let records = seed_items(&store, &[("Alpha", 10.0, "X"), ("Bravo", 5.0, "X")]);
    let user = Uuid::new_v4();
    let ctx = RequestContext::new();

    store.add_favourite(user, records[1].id).await?;
    assert!(catalog.is_favourite(&ctx, user, records[1].id).await?);
    assert!(!catalog.is_favourite(&ctx, user, records[0].id).await?);
    assert!(cache.inner().get_fav_ids(&favourites_key(&user)).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn user_without_favourites_is_answered_from_the_count() -> TestResult {
    let (catalog, store, cache) = catalog();
    let records = seed_items(&store, &[("Alpha", 10.0, "X")]);
    let user = Uuid::new_v4();
    let ctx = RequestContext::new();

    assert!(!catalog.is_favourite(&ctx, user, records[0].id).await?);
    assert!(cache.inner().get_fav_ids(&favourites_key(&user)).await.unwrap_err().is_miss());
    assert_eq!(cached_count(&cache, &View::Favourites(user)).await, Some(0));
    Ok(())
}

#[tokio::test]
async fn unknown_item_can_not_be_favourited() {
    let (catalog, _store, _cache) = catalog();
    let err = catalog
        .add_favourite(&RequestContext::new(), Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn item_changes_reach_favourites_views() -> TestResult {
    let (catalog, store, cache) = catalog();
    let records = seed_items(&store, &[("Alpha", 10.0, "X"), ("Bravo", 5.0, "X")]);
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let ctx = RequestContext::new();

    for user in [alice, bob] {
        catalog.add_favourite(&ctx, user, records[0].id).await?;
        catalog.add_favourite(&ctx, user, records[1].id).await?;
        catalog.list_favourites(&ctx, user, &ListQuery::new().sort("price", "asc")).await?;
    }

    let mut alpha = records[0].clone();
    alpha.price = 1.0;
    catalog.update_item(&ctx, alpha).await?;
    for user in [alice, bob] {
        let blob = cached_blob(&cache, &View::Favourites(user), Sort::PRICE_ASC).await.expect("patched");
        assert_eq!(names(&blob), ["Alpha", "Bravo"]);
        assert_eq!(blob[0].price, 1.0);
    }

    catalog.delete_item(&ctx, records[1].id).await?;
    for user in [alice, bob] {
        let blob = cached_blob(&cache, &View::Favourites(user), Sort::PRICE_ASC).await.expect("patched");
        assert_eq!(names(&blob), ["Alpha"]);
        assert_eq!(cached_count(&cache, &View::Favourites(user)).await, Some(1));
        assert!(!catalog.is_favourite(&ctx, user, records[1].id).await?);
        let ids = cache.inner().get_fav_ids(&favourites_key(&user)).await?;
        assert!(!ids.contains_key(&records[1].id));
    }
    Ok(())
}

#[tokio::test]
async fn forgotten_user_leaves_nothing_behind() -> TestResult {
    let (catalog, store, cache) = catalog();
    let records = seed_items(&store, &[("Alpha", 10.0, "X")]);
    let user = Uuid::new_v4();
    let ctx = RequestContext::new();

    catalog.add_favourite(&ctx, user, records[0].id).await?;
    for sort in ["asc", "desc"] {
        catalog
            .list_favourites(&ctx, user, &ListQuery::new().sort("name", sort))
            .await?;
    }

    catalog.forget_user(&ctx, user).await?;
    let view = View::Favourites(user);
    for sort in Sort::ALL {
        assert!(cached_blob(&cache, &view, sort).await.is_none());
    }
    assert_eq!(cached_count(&cache, &view).await, None);
    assert!(cache.inner().get_fav_ids(&favourites_key(&user)).await.is_err());
    Ok(())
}
