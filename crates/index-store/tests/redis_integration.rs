//! Redis integration tests
//!
//! These tests use a shared Redis container and flush it before each test,
//! so they run serially. Run with:
//!
//! ```bash
//! cargo test -p index-store --test redis_integration
//! ```

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use index_store::{FieldUpdates, IndexStore, IndexedItem, ItemId, RedisIndexStore};
use redis::aio::ConnectionManager;
use serial_test::serial;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Redis>,
    url: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Redis::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(6379).await.unwrap();

            Arc::new(ContainerInfo {
                container,
                url: format!("redis://{host}:{port}"),
            })
        })
        .await
        .clone()
}

/// Get a store over a flushed database
async fn get_test_store() -> RedisIndexStore {
    let info = get_container_info().await;

    let client = redis::Client::open(info.url.as_str()).unwrap();
    let mut conn = ConnectionManager::new(client).await.unwrap();
    let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await.unwrap();

    RedisIndexStore::new(conn)
}

fn id(raw: &str) -> ItemId {
    ItemId::new(raw)
}

#[tokio::test]
#[serial]
async fn connect_and_ping() {
    let info = get_container_info().await;
    let store = RedisIndexStore::connect(&info.url).await.unwrap();
    store.ping().await.unwrap();
}

#[tokio::test]
#[serial]
async fn connect_to_bad_url_is_unavailable() {
    let result = RedisIndexStore::connect("not-a-url").await;
    assert!(matches!(
        result,
        Err(index_store::IndexStoreError::Unavailable(_))
    ));
}

#[tokio::test]
#[serial]
async fn upsert_creates_record_with_defaults() {
    let store = get_test_store().await;

    let outcome = store
        .upsert_fields(&id("ISBN-1"), FieldUpdates::new().stock_count(5))
        .await
        .unwrap();
    assert!(outcome.created);

    let item = store.get(&id("ISBN-1")).await.unwrap().unwrap();
    assert_eq!(item.title, "");
    assert_eq!(item.stock_count, 5);
    assert_eq!(item.condition, None);
}

#[tokio::test]
#[serial]
async fn upsert_merges_fields() {
    let store = get_test_store().await;

    store
        .upsert_fields(
            &id("ISBN-1"),
            FieldUpdates::new()
                .title("Design Patterns")
                .condition(Some("used".into()))
                .stock_count(3),
        )
        .await
        .unwrap();
    let outcome = store
        .upsert_fields(&id("ISBN-1"), FieldUpdates::new().stock_count(20))
        .await
        .unwrap();
    assert!(!outcome.created);

    let item = store.get(&id("ISBN-1")).await.unwrap().unwrap();
    assert_eq!(item.title, "Design Patterns");
    assert_eq!(item.condition.as_deref(), Some("used"));
    assert_eq!(item.stock_count, 20);
}

#[tokio::test]
#[serial]
async fn stale_guarded_stock_is_skipped() {
    let store = get_test_store().await;
    let newer = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let older = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();

    store
        .upsert_fields(
            &id("ISBN-1"),
            FieldUpdates::new().stock_count(9).stock_as_of(newer),
        )
        .await
        .unwrap();
    let outcome = store
        .upsert_fields(
            &id("ISBN-1"),
            FieldUpdates::new()
                .title("Clean Code")
                .stock_count(1)
                .stock_as_of(older),
        )
        .await
        .unwrap();

    assert!(outcome.stock_skipped);
    let item = store.get(&id("ISBN-1")).await.unwrap().unwrap();
    assert_eq!(item.stock_count, 9);
    assert_eq!(item.title, "Clean Code");
    assert_eq!(item.stock_as_of, Some(newer));
}

#[tokio::test]
#[serial]
async fn insert_if_absent_respects_existing_record() {
    let store = get_test_store().await;

    assert!(
        store
            .insert_if_absent(IndexedItem::new("ISBN-1").with_title("Seed").with_stock(1))
            .await
            .unwrap()
    );
    assert!(
        !store
            .insert_if_absent(IndexedItem::new("ISBN-1").with_title("Other").with_stock(7))
            .await
            .unwrap()
    );

    let item = store.get(&id("ISBN-1")).await.unwrap().unwrap();
    assert_eq!(item.title, "Seed");
    assert_eq!(item.stock_count, 1);
}

#[tokio::test]
#[serial]
async fn list_all_and_count_only_see_prefixed_keys() {
    let store = get_test_store().await;
    let info = get_container_info().await;

    for n in 1..=3 {
        store
            .upsert_fields(
                &id(&format!("ISBN-{n}")),
                FieldUpdates::new().title(format!("Book {n}")),
            )
            .await
            .unwrap();
    }

    // Unrelated key in the same database.
    let client = redis::Client::open(info.url.as_str()).unwrap();
    let mut conn = ConnectionManager::new(client).await.unwrap();
    let _: () = redis::cmd("SET")
        .arg("session:abc")
        .arg("x")
        .query_async(&mut conn)
        .await
        .unwrap();

    assert_eq!(store.count().await.unwrap(), 3);
    let mut titles: Vec<_> = store
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Book 1", "Book 2", "Book 3"]);
}

#[tokio::test]
#[serial]
async fn list_all_skips_prefixed_key_of_wrong_type() {
    let store = get_test_store().await;
    let info = get_container_info().await;

    store
        .upsert_fields(&id("ISBN-1"), FieldUpdates::new().title("Real Book"))
        .await
        .unwrap();

    let client = redis::Client::open(info.url.as_str()).unwrap();
    let mut conn = ConnectionManager::new(client).await.unwrap();
    let _: () = redis::cmd("SET")
        .arg("book:junk")
        .arg("not a hash")
        .query_async(&mut conn)
        .await
        .unwrap();

    let items = store.list_all().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Real Book");
}

#[tokio::test]
#[serial]
async fn key_prefix_isolates_stores() {
    let store = get_test_store().await;
    let other = store.clone().with_key_prefix("test-book:");

    other
        .upsert_fields(&id("ISBN-1"), FieldUpdates::new().title("Elsewhere"))
        .await
        .unwrap();

    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(other.count().await.unwrap(), 1);
}
