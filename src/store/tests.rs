use super::*;
use crate::kv::Reading;
use std::sync::atomic::{AtomicI64, Ordering};

const JAN_15_2024: i64 = 1_705_320_000_000; // 2024-01-15T12:00:00Z
const JAN_1_2024: i64 = 1_704_067_200_000;
const FEB_1_2024: i64 = 1_706_745_600_000;

fn clock_at(now: Arc<AtomicI64>) -> Clock {
    Arc::new(move || now.load(Ordering::SeqCst))
}

async fn write_all(store: &InMemoryStore, entity: &EntityId, reading: &Reading, ttl: Ttl) {
    store.write_history(entity, reading.ts, &reading.key, ttl).await.unwrap();
    store.write_latest(entity, reading).await.unwrap();
    store.write_raw(entity, reading, ttl).await.unwrap();
}

#[test]
fn test_fixed_width_partitions() {
    let ts = JAN_15_2024 + 61_234;
    assert_eq!(Partitioning::Minutes.partition_ts(ts), JAN_15_2024 + 60_000);
    assert_eq!(Partitioning::Hours.partition_ts(ts), JAN_15_2024);
    assert_eq!(Partitioning::Days.partition_ts(ts), JAN_15_2024 - 12 * 3_600_000);
    assert_eq!(Partitioning::Indefinite.partition_ts(ts), 0);
}

#[test]
fn test_calendar_partitions() {
    assert_eq!(Partitioning::Months.partition_ts(JAN_15_2024), JAN_1_2024);
    assert_eq!(Partitioning::Months.partition_ts(FEB_1_2024), FEB_1_2024);
    assert_eq!(Partitioning::Months.partition_ts(FEB_1_2024 - 1), JAN_1_2024);
    assert_eq!(Partitioning::Years.partition_ts(FEB_1_2024), JAN_1_2024);
}

#[test]
fn test_negative_timestamps_truncate_downwards() {
    assert_eq!(Partitioning::Minutes.partition_ts(-1), -60_000);
}

#[test]
fn test_extend_expiry() {
    assert_eq!(extend_expiry(Some(5), Some(9)), Some(9));
    assert_eq!(extend_expiry(Some(9), Some(5)), Some(9));
    assert_eq!(extend_expiry(None, Some(5)), None);
    assert_eq!(extend_expiry(Some(5), None), None);
}

#[tokio::test]
async fn test_history_records_one_partition_per_period() {
    let store = InMemoryStore::new(Partitioning::Months);
    let entity = EntityId::new_device();

    store.write_history(&entity, JAN_15_2024, "temp", Ttl::NONE).await.unwrap();
    store.write_history(&entity, JAN_15_2024 + 1, "temp", Ttl::NONE).await.unwrap();
    store.write_history(&entity, FEB_1_2024, "temp", Ttl::NONE).await.unwrap();

    assert_eq!(store.partitions(&entity, "temp"), vec![JAN_1_2024, FEB_1_2024]);
}

#[tokio::test]
async fn test_query_range_inclusive_and_ordered() {
    let store = InMemoryStore::new(Partitioning::Days);
    let entity = EntityId::new_device();

    for ts in [300, 100, 200, 400] {
        write_all(&store, &entity, &Reading::long(ts, "count", ts), Ttl::NONE).await;
    }

    let found = store
        .query_range(&entity, &TsQuery::raw("count", 100, 300))
        .await
        .unwrap();
    let ts: Vec<i64> = found.iter().map(|r| r.ts).collect();
    assert_eq!(ts, vec![100, 200, 300]);

    let limited = store
        .query_range(&entity, &TsQuery::raw("count", 0, 1_000).with_limit(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].ts, 100);
}

#[tokio::test]
async fn test_reversed_range_is_empty() {
    let store = InMemoryStore::default();
    let entity = EntityId::new_device();
    write_all(&store, &entity, &Reading::long(100, "count", 1), Ttl::NONE).await;

    let found = store
        .query_range(&entity, &TsQuery::raw("count", 200, 0))
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_raw_row_unreachable_without_history() {
    let store = InMemoryStore::new(Partitioning::Days);
    let entity = EntityId::new_device();
    let reading = Reading::long(100, "count", 1);

    store.write_raw(&entity, &reading, Ttl::NONE).await.unwrap();
    assert_eq!(store.raw_len(&entity, "count"), 1);

    let found = store
        .query_range(&entity, &TsQuery::raw("count", 0, 1_000))
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_aggregated_query_unsupported() {
    let store = InMemoryStore::default();
    let entity = EntityId::new_device();

    let query = TsQuery::raw("temp", 0, 10).with_aggregation(Aggregation::Avg, 5);
    let err = store.query_range(&entity, &query).await.unwrap_err();
    assert!(matches!(err, StoreError::Unsupported { op: StoreOp::QueryRange, .. }));
}

#[tokio::test]
async fn test_ttl_expiry_hides_rows() {
    let now = Arc::new(AtomicI64::new(1_000_000));
    let store = InMemoryStore::with_clock(Partitioning::Days, clock_at(now.clone()));
    let entity = EntityId::new_device();

    write_all(&store, &entity, &Reading::long(100, "temp", 1), Ttl::from_secs(5)).await;
    write_all(&store, &entity, &Reading::long(200, "temp", 2), Ttl::NONE).await;

    let before = store
        .query_range(&entity, &TsQuery::raw("temp", 0, 1_000))
        .await
        .unwrap();
    assert_eq!(before.len(), 2);

    now.store(1_000_000 + 5_000, Ordering::SeqCst);

    let after = store
        .query_range(&entity, &TsQuery::raw("temp", 0, 1_000))
        .await
        .unwrap();
    assert_eq!(after, vec![Reading::long(200, "temp", 2)]);

    // latest values never expire
    assert_eq!(
        store.read_latest(&entity, "temp").await.unwrap(),
        Some(Reading::long(200, "temp", 2))
    );
}

#[tokio::test]
async fn test_partition_with_expiry_extended_by_permanent_write() {
    let now = Arc::new(AtomicI64::new(0));
    let store = InMemoryStore::with_clock(Partitioning::Days, clock_at(now.clone()));
    let entity = EntityId::new_device();

    write_all(&store, &entity, &Reading::long(100, "temp", 1), Ttl::from_secs(1)).await;
    write_all(&store, &entity, &Reading::long(200, "temp", 2), Ttl::NONE).await;

    now.store(10_000, Ordering::SeqCst);

    let found = store
        .query_range(&entity, &TsQuery::raw("temp", 0, 1_000))
        .await
        .unwrap();
    assert_eq!(found, vec![Reading::long(200, "temp", 2)]);
}

#[tokio::test]
async fn test_latest_last_write_wins_and_sorted() {
    let store = InMemoryStore::default();
    let entity = EntityId::new_device();

    store.write_latest(&entity, &Reading::long(9, "temp", 9)).await.unwrap();
    store.write_latest(&entity, &Reading::long(1, "temp", 1)).await.unwrap();
    store.write_latest(&entity, &Reading::boolean(1, "door", false)).await.unwrap();

    let all = store.read_all_latest(&entity).await.unwrap();
    assert_eq!(
        all,
        vec![Reading::boolean(1, "door", false), Reading::long(1, "temp", 1)]
    );
    assert_eq!(store.read_latest(&entity, "nope").await.unwrap(), None);
    assert!(store.read_all_latest(&EntityId::new_device()).await.unwrap().is_empty());
}

#[test]
fn test_open_memory_store_from_config() {
    let config = StoreConfig {
        backend: StoreBackend::Memory,
        ..Default::default()
    };
    let store = open_store(&config).unwrap();
    assert_eq!(store.backend_type(), "memory");
}
