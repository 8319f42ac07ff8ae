//! DB-backed tests. Run with `cargo test -p kitchen-pg -- --ignored`
//! against a scratch database named by DATABASE_URL.

use chrono::Utc;
use kitchen_core::domain::{OrderStatus, OrderType, Worker, WorkerStatus};
use kitchen_core::ports::{OrderStatusReader, OrderStatusWriter, StatusUpdate, WorkerRegistry};
use kitchen_pg::{PgOrderStore, PgWorkerRegistry};
use sqlx::PgPool;

async fn pool_or_skip() -> Option<PgPool> {
    let Ok(url) = std::env::var(kitchen_pg::ENV_DB_URL) else {
        eprintln!("SKIP: DATABASE_URL not set");
        return None;
    };
    let pool = kitchen_pg::connect(&url, 4).await.expect("connect");
    kitchen_pg::migrate(&pool).await.expect("migrate");
    Some(pool)
}

fn unique(prefix: &str) -> String {
    format!(
        "{prefix}_{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

async fn seed_order(pool: &PgPool, number: &str) {
    sqlx::query(
        "insert into orders (number, customer_name, type, total_amount, priority, status) \
         values ($1, 'Ada', 'takeout', 12.50, 1, 'received')",
    )
    .bind(number)
    .execute(pool)
    .await
    .expect("seed order");
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn migrate_twice_is_idempotent() {
    let Some(pool) = pool_or_skip().await else { return };
    kitchen_pg::migrate(&pool).await.expect("second migrate");
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn repeated_update_writes_one_log_entry() {
    let Some(pool) = pool_or_skip().await else { return };
    let store = PgOrderStore::new(pool.clone());
    let number = unique("ORD");
    seed_order(&pool, &number).await;

    let first = store
        .update_order_status(&number, OrderStatus::Cooking, "w1")
        .await
        .unwrap();
    assert_eq!(first, StatusUpdate::Applied { previous: OrderStatus::Received });
    let second = store
        .update_order_status(&number, OrderStatus::Cooking, "w1")
        .await
        .unwrap();
    assert_eq!(second, StatusUpdate::Unchanged);

    let history = store.status_history(&number).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, OrderStatus::Cooking);
    assert_eq!(history[0].changed_by, "w1");

    let order = store.get_order(&number).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cooking);
    assert_eq!(order.processed_by.as_deref(), Some("w1"));
    assert!(order.completed_at.is_none());
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn concurrent_writers_apply_once() {
    let Some(pool) = pool_or_skip().await else { return };
    let store = PgOrderStore::new(pool.clone());
    let number = unique("ORD");
    seed_order(&pool, &number).await;

    let writers = (0..8).map(|i| {
        let store = store.clone();
        let number = number.clone();
        tokio::spawn(async move {
            store
                .update_order_status(&number, OrderStatus::Cooking, &format!("w{i}"))
                .await
        })
    });
    let mut applied = 0;
    for writer in writers.collect::<Vec<_>>() {
        if writer.await.unwrap().unwrap().was_applied() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(store.status_history(&number).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn completed_stamps_completion_time() {
    let Some(pool) = pool_or_skip().await else { return };
    let store = PgOrderStore::new(pool.clone());
    let number = unique("ORD");
    seed_order(&pool, &number).await;

    store
        .update_order_status(&number, OrderStatus::Completed, "counter")
        .await
        .unwrap();
    let order = store.get_order(&number).await.unwrap().unwrap();
    assert!(order.completed_at.is_some());
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn unknown_order_is_not_found() {
    let Some(pool) = pool_or_skip().await else { return };
    let store = PgOrderStore::new(pool);
    let err = store
        .update_order_status(&unique("MISSING"), OrderStatus::Cooking, "w1")
        .await
        .unwrap_err();
    assert!(matches!(err, kitchen_core::domain::KitchenError::OrderNotFound(_)));
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn processed_counter_survives_stale_updates() {
    let Some(pool) = pool_or_skip().await else { return };
    let registry = PgWorkerRegistry::new(pool);
    let name = unique("worker");
    let now = Utc::now();

    let mut row = registry
        .register(&Worker::new(&name, OrderType::Takeout, now))
        .await
        .unwrap();
    assert!(row.id > 0);

    let bumps = (0..10).map(|_| {
        let registry = registry.clone();
        let name = name.clone();
        tokio::spawn(async move { registry.record_processed_order(&name, Utc::now()).await })
    });
    for bump in bumps.collect::<Vec<_>>() {
        bump.await.unwrap().unwrap();
    }

    // Stale copy still has 0 processed.
    row.go_online(Utc::now()).unwrap();
    registry.update(&row).await.unwrap();

    let stored = registry.get_by_name(&name).await.unwrap().unwrap();
    assert_eq!(stored.orders_processed, 10);
    assert_eq!(stored.status, WorkerStatus::Online);
    assert!(registry.list().await.unwrap().iter().any(|w| w.name == name));

    let err = registry.touch(&unique("ghost"), Utc::now()).await.unwrap_err();
    assert!(matches!(err, kitchen_core::domain::KitchenError::WorkerNotFound(_)));
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn duplicate_registration_is_a_conflict() {
    let Some(pool) = pool_or_skip().await else { return };
    let registry = PgWorkerRegistry::new(pool);
    let name = unique("worker");
    let now = Utc::now();

    registry
        .register(&Worker::new(&name, OrderType::Takeout, now))
        .await
        .unwrap();
    let err = registry
        .register(&Worker::new(&name, OrderType::Takeout, now))
        .await
        .unwrap_err();
    assert!(matches!(err, kitchen_core::domain::KitchenError::WorkerConflict(n) if n == name));
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn current_status_reads_without_writing() {
    let Some(pool) = pool_or_skip().await else { return };
    let store = PgOrderStore::new(pool.clone());
    let number = unique("ORD");
    seed_order(&pool, &number).await;

    assert_eq!(
        store.current_status(&number).await.unwrap(),
        Some(OrderStatus::Received)
    );
    assert_eq!(store.current_status(&unique("missing")).await.unwrap(), None);
    assert!(store.status_history(&number).await.unwrap().is_empty());
}
