//! WorkerRegistry port - worker identity, availability and counters

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{KitchenError, Worker};

/// WorkerRegistry persists `Worker` rows.
///
/// `update` writes status, order type and last_seen only. The processed
/// counter is changed exclusively through `record_processed_order`, which
/// must increment in storage (`orders_processed = orders_processed + 1`)
/// so concurrent completions never lose a count.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<Worker>, KitchenError>;

    async fn list(&self) -> Result<Vec<Worker>, KitchenError>;

    /// Insert a new row and return it with its assigned id.
    ///
    /// `WorkerConflict` if the name is already taken.
    async fn register(&self, worker: &Worker) -> Result<Worker, KitchenError>;

    async fn update(&self, worker: &Worker) -> Result<(), KitchenError>;

    /// Refresh last_seen. `WorkerNotFound` if the row is gone.
    async fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<(), KitchenError>;

    async fn record_processed_order(
        &self,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), KitchenError>;
}
