use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kitchen_core::domain::{
    KitchenError, OrderRecord, OrderStatus, OrderType, StatusChangeLogEntry,
};
use kitchen_core::ports::{OrderStatusReader, OrderStatusWriter, StatusUpdate};
use sqlx::PgPool;
use tracing::{debug, info};

/// Orders table plus its status log.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type OrderRow = (
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

fn order_from_row(row: OrderRow) -> Result<OrderRecord, KitchenError> {
    let (order_number, order_type, status, processed_by, created_at, updated_at, completed_at) = row;
    Ok(OrderRecord {
        order_number,
        // Intake may know types this worker build does not.
        order_type: order_type.parse().unwrap_or(OrderType::Unknown),
        status: status.parse()?,
        processed_by,
        created_at,
        updated_at,
        completed_at,
    })
}

#[async_trait]
impl OrderStatusWriter for PgOrderStore {
    async fn update_order_status(
        &self,
        order_number: &str,
        status: OrderStatus,
        actor: &str,
    ) -> Result<StatusUpdate, KitchenError> {
        let op = "update_order_status";
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| KitchenError::storage(op, err))?;

        // Row lock held until commit; concurrent writers for this order queue here.
        let current: Option<(i64, String)> =
            sqlx::query_as("select id, status from orders where number = $1 for update")
                .bind(order_number)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|err| KitchenError::storage(op, err))?;
        let Some((order_id, current)) = current else {
            return Err(KitchenError::OrderNotFound(order_number.to_string()));
        };
        let previous: OrderStatus = current.parse()?;

        if previous == status {
            tx.commit().await.map_err(|err| KitchenError::storage(op, err))?;
            debug!(order_number, %status, "order already in status, nothing written");
            return Ok(StatusUpdate::Unchanged);
        }

        sqlx::query(
            r#"
            update orders
            set status = $1,
                processed_by = $2,
                updated_at = now(),
                completed_at = case when $3 then now() else completed_at end
            where id = $4
            "#,
        )
        .bind(status.as_str())
        .bind(actor)
        .bind(status.stamps_completion())
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| KitchenError::storage(op, err))?;

        sqlx::query(
            r#"
            insert into order_status_log (order_id, status, changed_by, changed_at, notes)
            values ($1, $2, $3, now(), $4)
            "#,
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(actor)
        .bind(StatusChangeLogEntry::default_note(status, actor))
        .execute(&mut *tx)
        .await
        .map_err(|err| KitchenError::storage(op, err))?;

        tx.commit().await.map_err(|err| KitchenError::storage(op, err))?;
        info!(order_number, %previous, %status, actor, "order status updated");
        Ok(StatusUpdate::Applied { previous })
    }

    async fn current_status(&self, order_number: &str) -> Result<Option<OrderStatus>, KitchenError> {
        let row: Option<(String,)> = sqlx::query_as("select status from orders where number = $1")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| KitchenError::storage("current_status", err))?;
        row.map(|(status,)| status.parse()).transpose()
    }
}

#[async_trait]
impl OrderStatusReader for PgOrderStore {
    async fn get_order(&self, order_number: &str) -> Result<Option<OrderRecord>, KitchenError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            select number, type, status, processed_by, created_at, updated_at, completed_at
            from orders
            where number = $1
            "#,
        )
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| KitchenError::storage("get_order", err))?;
        row.map(order_from_row).transpose()
    }

    async fn status_history(
        &self,
        order_number: &str,
    ) -> Result<Vec<StatusChangeLogEntry>, KitchenError> {
        let rows: Vec<(String, String, DateTime<Utc>, Option<String>)> = sqlx::query_as(
            r#"
            select l.status, l.changed_by, l.changed_at, l.notes
            from order_status_log l
            join orders o on o.id = l.order_id
            where o.number = $1
            order by l.changed_at asc, l.id asc
            "#,
        )
        .bind(order_number)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| KitchenError::storage("status_history", err))?;

        rows.into_iter()
            .map(|(status, changed_by, changed_at, notes)| {
                Ok(StatusChangeLogEntry {
                    order_number: order_number.to_string(),
                    status: status.parse()?,
                    changed_by,
                    changed_at,
                    notes,
                })
            })
            .collect()
    }
}
