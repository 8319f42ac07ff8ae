//! Postgres adapters for the kitchen ports.
//!
//! `orders` and `order_status_log` back the status writer and the tracking
//! reader; `workers` backs the registry. Schema lives in `./migrations`.

use std::time::Duration;

use kitchen_core::domain::KitchenError;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

mod orders;
mod workers;

pub use self::orders::PgOrderStore;
pub use self::workers::PgWorkerRegistry;

pub use sqlx::PgPool;

pub const ENV_DB_URL: &str = "DATABASE_URL";

/// Open a pool against `url`.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, KitchenError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(url)
        .await
        .map_err(|err| KitchenError::storage("connect", err))?;
    info!(max_connections, "connected to postgres");
    Ok(pool)
}

/// Run embedded migrations. Safe to call repeatedly.
pub async fn migrate(pool: &PgPool) -> Result<(), KitchenError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|err| KitchenError::storage("migrate", err))?;
    Ok(())
}
