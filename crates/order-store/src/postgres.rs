use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    DepartmentId, OrderId, OrderQuery, OrderRecord, ReceiptRecord, Result, StoreError, SubjectId,
    Version,
    store::{OrderStore, validate_insert, validate_settlement, validate_swap},
};

const ORDER_COLUMNS: &str = "id, version, status, subject_id, origin_department_id, \
     fulfilling_department_id, created_at, updated_at, document";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<OrderRecord> {
        Ok(OrderRecord {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            version: Version::new(row.try_get("version")?),
            status: row.try_get("status")?,
            subject_id: SubjectId::from_uuid(row.try_get::<Uuid, _>("subject_id")?),
            origin_department_id: DepartmentId::new(
                row.try_get::<String, _>("origin_department_id")?,
            ),
            fulfilling_department_id: DepartmentId::new(
                row.try_get::<String, _>("fulfilling_department_id")?,
            ),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            document: row.try_get("document")?,
        })
    }

    fn row_to_receipt(row: PgRow) -> Result<ReceiptRecord> {
        Ok(ReceiptRecord {
            receipt_number: row.try_get("receipt_number")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            issued_at: row.try_get("issued_at")?,
            document: row.try_get("document")?,
        })
    }

    /// Runs the versioned UPDATE inside an open transaction.
    ///
    /// Returns false if no row matched the expected version.
    async fn update_versioned(
        tx: &mut Transaction<'_, Postgres>,
        expected: Version,
        record: &OrderRecord,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE fulfillment_orders
            SET version = $3, status = $4, subject_id = $5, origin_department_id = $6,
                fulfilling_department_id = $7, updated_at = $8, document = $9
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(record.order_id.as_uuid())
        .bind(expected.as_i64())
        .bind(record.version.as_i64())
        .bind(&record.status)
        .bind(record.subject_id.as_uuid())
        .bind(record.origin_department_id.as_str())
        .bind(record.fulfilling_department_id.as_str())
        .bind(record.updated_at)
        .bind(&record.document)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT version FROM fulfillment_orders WHERE id = $1")
                .bind(record.order_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;
        match exists {
            Some(actual) => {
                metrics::counter!("order_store_conflicts_total").increment(1);
                tracing::debug!(
                    order_id = %record.order_id,
                    %expected,
                    actual,
                    "compare-and-swap lost"
                );
                Ok(false)
            }
            None => Err(StoreError::NotFound(record.order_id)),
        }
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, record: OrderRecord) -> Result<()> {
        validate_insert(&record)?;

        sqlx::query(
            r#"
            INSERT INTO fulfillment_orders
                (id, version, status, subject_id, origin_department_id,
                 fulfilling_department_id, created_at, updated_at, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.order_id.as_uuid())
        .bind(record.version.as_i64())
        .bind(&record.status)
        .bind(record.subject_id.as_uuid())
        .bind(record.origin_department_id.as_str())
        .bind(record.fulfilling_department_id.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(&record.document)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("fulfillment_orders_pkey")
            {
                return StoreError::AlreadyExists(record.order_id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM fulfillment_orders WHERE id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn compare_and_swap(&self, expected: Version, record: OrderRecord) -> Result<bool> {
        validate_swap(expected, &record)?;

        let mut tx = self.pool.begin().await?;
        let swapped = Self::update_versioned(&mut tx, expected, &record).await?;
        if swapped {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(swapped)
    }

    #[tracing::instrument(skip(self, record, receipt), fields(order_id = %record.order_id))]
    async fn commit_settlement(
        &self,
        expected: Version,
        record: OrderRecord,
        receipt: ReceiptRecord,
    ) -> Result<bool> {
        validate_settlement(expected, &record, &receipt)?;

        let mut tx = self.pool.begin().await?;

        if !Self::update_versioned(&mut tx, expected, &record).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO receipts (receipt_number, order_id, issued_at, document)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&receipt.receipt_number)
        .bind(receipt.order_id.as_uuid())
        .bind(receipt.issued_at)
        .bind(&receipt.document)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            // Dropping the transaction rolls back the order update as well
            if let sqlx::Error::Database(ref db_err) = e
                && matches!(
                    db_err.constraint(),
                    Some("receipts_pkey") | Some("receipts_order_id_key")
                )
            {
                return Err(StoreError::DuplicateReceipt {
                    order_id: record.order_id,
                    receipt_number: receipt.receipt_number,
                });
            }
            return Err(StoreError::Database(e));
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn get_receipt(&self, order_id: OrderId) -> Result<Option<ReceiptRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT receipt_number, order_id, issued_at, document
            FROM receipts
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_receipt).transpose()
    }

    async fn get_receipt_by_number(&self, receipt_number: &str) -> Result<Option<ReceiptRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT receipt_number, order_id, issued_at, document
            FROM receipts
            WHERE receipt_number = $1
            "#,
        )
        .bind(receipt_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_receipt).transpose()
    }

    async fn query(&self, query: OrderQuery) -> Result<Vec<OrderRecord>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM fulfillment_orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.statuses.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ANY(${param_count})"));
        }
        if query.fulfilling_department_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND fulfilling_department_id = ${param_count}"));
        }
        if query.origin_department_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND origin_department_id = ${param_count}"));
        }
        if query.subject_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND subject_id = ${param_count}"));
        }
        if query.updated_from.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND updated_at >= ${param_count}"));
        }
        if query.updated_to.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND updated_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY updated_at ASC, id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(statuses) = query.statuses {
            sqlx_query = sqlx_query.bind(statuses);
        }
        if let Some(department) = query.fulfilling_department_id {
            sqlx_query = sqlx_query.bind(department.as_str().to_string());
        }
        if let Some(department) = query.origin_department_id {
            sqlx_query = sqlx_query.bind(department.as_str().to_string());
        }
        if let Some(subject_id) = query.subject_id {
            sqlx_query = sqlx_query.bind(subject_id.as_uuid());
        }
        if let Some(from) = query.updated_from {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(to) = query.updated_to {
            sqlx_query = sqlx_query.bind(to);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn next_receipt_sequence(&self) -> Result<i64> {
        let value: i64 = sqlx::query_scalar("SELECT nextval('receipt_number_seq')")
            .fetch_one(&self.pool)
            .await?;
        Ok(value)
    }
}
