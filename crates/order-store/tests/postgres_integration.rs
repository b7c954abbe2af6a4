//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use order_store::{
    DepartmentId, OrderId, OrderQuery, OrderRecord, OrderStore, OrderStoreExt,
    PostgresOrderStore, ReceiptRecord, StoreError, SubjectId, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresOrderStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE receipts, fulfillment_orders")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn create_record(order_id: OrderId, version: Version, status: &str) -> OrderRecord {
    let now = Utc::now();
    OrderRecord {
        order_id,
        version,
        status: status.to_string(),
        subject_id: SubjectId::new(),
        origin_department_id: DepartmentId::new("cardiology"),
        fulfilling_department_id: DepartmentId::new("pharmacy"),
        created_at: now,
        updated_at: now,
        document: serde_json::json!({"status": status}),
    }
}

fn create_receipt(order_id: OrderId, number: &str) -> ReceiptRecord {
    ReceiptRecord {
        receipt_number: number.to_string(),
        order_id,
        issued_at: Utc::now(),
        document: serde_json::json!({"receipt_number": number}),
    }
}

#[tokio::test]
#[serial]
async fn insert_and_get_order() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    store
        .insert(create_record(order_id, Version::initial(), "created"))
        .await
        .unwrap();

    let stored = store.require(order_id).await.unwrap();
    assert_eq!(stored.status, "created");
    assert_eq!(stored.version, Version::initial());
    assert_eq!(stored.document["status"], "created");
}

#[tokio::test]
#[serial]
async fn duplicate_insert_is_rejected() {
    let store = get_test_store().await;
    let record = create_record(OrderId::new(), Version::initial(), "created");

    store.insert(record.clone()).await.unwrap();
    let result = store.insert(record).await;
    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
}

#[tokio::test]
#[serial]
async fn compare_and_swap_detects_stale_writer() {
    let store = get_test_store().await;
    let order_id = OrderId::new();
    store
        .insert(create_record(order_id, Version::initial(), "created"))
        .await
        .unwrap();

    let first = store
        .compare_and_swap(
            Version::initial(),
            create_record(order_id, Version::new(1), "sent_to_fulfiller"),
        )
        .await
        .unwrap();
    let second = store
        .compare_and_swap(
            Version::initial(),
            create_record(order_id, Version::new(1), "cancelled"),
        )
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
    let stored = store.require(order_id).await.unwrap();
    assert_eq!(stored.status, "sent_to_fulfiller");
    assert_eq!(stored.version, Version::new(1));
}

#[tokio::test]
#[serial]
async fn compare_and_swap_missing_order() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    let result = store
        .compare_and_swap(
            Version::initial(),
            create_record(order_id, Version::new(1), "received"),
        )
        .await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
#[serial]
async fn settlement_commits_order_and_receipt_together() {
    let store = get_test_store().await;
    let order_id = OrderId::new();
    store
        .insert(create_record(order_id, Version::initial(), "ready_for_pickup"))
        .await
        .unwrap();

    let committed = store
        .commit_settlement(
            Version::initial(),
            create_record(order_id, Version::new(1), "settled"),
            create_receipt(order_id, "RCPT-20250101-000001"),
        )
        .await
        .unwrap();

    assert!(committed);
    assert_eq!(store.require(order_id).await.unwrap().status, "settled");
    let receipt = store.get_receipt(order_id).await.unwrap().unwrap();
    assert_eq!(receipt.receipt_number, "RCPT-20250101-000001");
    assert!(
        store
            .get_receipt_by_number("RCPT-20250101-000001")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
#[serial]
async fn duplicate_receipt_rolls_back_order_update() {
    let store = get_test_store().await;
    let first = OrderId::new();
    let second = OrderId::new();
    for id in [first, second] {
        store
            .insert(create_record(id, Version::initial(), "ready_for_pickup"))
            .await
            .unwrap();
    }
    store
        .commit_settlement(
            Version::initial(),
            create_record(first, Version::new(1), "settled"),
            create_receipt(first, "RCPT-DUP"),
        )
        .await
        .unwrap();

    let result = store
        .commit_settlement(
            Version::initial(),
            create_record(second, Version::new(1), "settled"),
            create_receipt(second, "RCPT-DUP"),
        )
        .await;

    assert!(matches!(result, Err(StoreError::DuplicateReceipt { .. })));
    let untouched = store.require(second).await.unwrap();
    assert_eq!(untouched.status, "ready_for_pickup");
    assert_eq!(untouched.version, Version::initial());
    assert!(store.get_receipt(second).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn stale_settlement_writes_nothing() {
    let store = get_test_store().await;
    let order_id = OrderId::new();
    store
        .insert(create_record(order_id, Version::initial(), "ready_for_pickup"))
        .await
        .unwrap();

    let committed = store
        .commit_settlement(
            Version::new(7),
            create_record(order_id, Version::new(8), "settled"),
            create_receipt(order_id, "RCPT-STALE"),
        )
        .await
        .unwrap();

    assert!(!committed);
    assert!(store.get_receipt(order_id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn worklist_query_filters_by_department_and_status() {
    let store = get_test_store().await;
    for status in ["created", "received", "received"] {
        store
            .insert(create_record(OrderId::new(), Version::initial(), status))
            .await
            .unwrap();
    }

    let received = store
        .query(OrderQuery::for_fulfiller("pharmacy").status("received"))
        .await
        .unwrap();
    assert_eq!(received.len(), 2);

    let limited = store.query(OrderQuery::new().limit(1)).await.unwrap();
    assert_eq!(limited.len(), 1);

    let other_department = store
        .query(OrderQuery::for_fulfiller("lab"))
        .await
        .unwrap();
    assert!(other_department.is_empty());
}

#[tokio::test]
#[serial]
async fn receipt_sequence_increases() {
    let store = get_test_store().await;
    let a = store.next_receipt_sequence().await.unwrap();
    let b = store.next_receipt_sequence().await.unwrap();
    assert!(b > a);
}
