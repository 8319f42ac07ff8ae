use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kitchen_core::domain::{KitchenError, OrderType, Worker};
use kitchen_core::ports::WorkerRegistry;
use sqlx::PgPool;
use sqlx::postgres::PgQueryResult;

#[derive(Clone)]
pub struct PgWorkerRegistry {
    pool: PgPool,
}

impl PgWorkerRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type WorkerRow = (i64, String, String, String, i64, DateTime<Utc>, DateTime<Utc>);

const SELECT_WORKER: &str =
    "select id, name, type, status, orders_processed, last_seen, created_at from workers";

fn worker_from_row(row: WorkerRow) -> Result<Worker, KitchenError> {
    let (id, name, order_type, status, orders_processed, last_seen, created_at) = row;
    Ok(Worker {
        id,
        name,
        order_type: order_type.parse().unwrap_or(OrderType::Unknown),
        status: status.parse()?,
        orders_processed,
        last_seen,
        created_at,
    })
}

fn require_row(result: PgQueryResult, name: &str) -> Result<(), KitchenError> {
    if result.rows_affected() == 0 {
        return Err(KitchenError::WorkerNotFound(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl WorkerRegistry for PgWorkerRegistry {
    async fn get_by_name(&self, name: &str) -> Result<Option<Worker>, KitchenError> {
        let row: Option<WorkerRow> = sqlx::query_as(&format!("{SELECT_WORKER} where name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| KitchenError::storage("get_worker", err))?;
        row.map(worker_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Worker>, KitchenError> {
        let rows: Vec<WorkerRow> =
            sqlx::query_as(&format!("{SELECT_WORKER} order by created_at asc, id asc"))
                .fetch_all(&self.pool)
                .await
                .map_err(|err| KitchenError::storage("list_workers", err))?;
        rows.into_iter().map(worker_from_row).collect()
    }

    async fn register(&self, worker: &Worker) -> Result<Worker, KitchenError> {
        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            insert into workers (name, type, status, orders_processed, last_seen, created_at)
            values ($1, $2, $3, $4, $5, now())
            returning id, created_at
            "#,
        )
        .bind(&worker.name)
        .bind(worker.order_type.as_str())
        .bind(worker.status.as_str())
        .bind(worker.orders_processed)
        .bind(worker.last_seen)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if err.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                KitchenError::WorkerConflict(worker.name.clone())
            } else {
                KitchenError::storage("register_worker", err)
            }
        })?;

        Ok(Worker {
            id,
            created_at,
            ..worker.clone()
        })
    }

    async fn update(&self, worker: &Worker) -> Result<(), KitchenError> {
        // orders_processed is only ever changed by record_processed_order.
        let result = sqlx::query(
            "update workers set type = $1, status = $2, last_seen = $3 where name = $4",
        )
        .bind(worker.order_type.as_str())
        .bind(worker.status.as_str())
        .bind(worker.last_seen)
        .bind(&worker.name)
        .execute(&self.pool)
        .await
        .map_err(|err| KitchenError::storage("update_worker", err))?;
        require_row(result, &worker.name)
    }

    async fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<(), KitchenError> {
        let result = sqlx::query("update workers set last_seen = $1 where name = $2")
            .bind(at)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|err| KitchenError::storage("touch_worker", err))?;
        require_row(result, name)
    }

    async fn record_processed_order(
        &self,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), KitchenError> {
        let result = sqlx::query(
            "update workers set orders_processed = orders_processed + 1, last_seen = $1 where name = $2",
        )
        .bind(at)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|err| KitchenError::storage("record_processed_order", err))?;
        require_row(result, name)
    }
}
