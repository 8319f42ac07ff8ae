//! Order store ports - transactional status writes and the tracking read contract

use async_trait::async_trait;

use crate::domain::{KitchenError, OrderRecord, OrderStatus, StatusChangeLogEntry};

/// Result of a status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The row moved from `previous` and one log entry was appended.
    Applied { previous: OrderStatus },
    /// The order already had the requested status; nothing was written.
    Unchanged,
}

impl StatusUpdate {
    pub fn was_applied(self) -> bool {
        matches!(self, StatusUpdate::Applied { .. })
    }
}

/// OrderStatusWriter applies one status transition atomically.
///
/// # Contract
/// - Reads the current status under a row lock
/// - Equal to `status` already: commit without writes, return `Unchanged`
/// - Otherwise update status / processed_by / updated_at (and completed_at
///   for completion), append one log entry, commit
/// - Any failure rolls back; the status is then unchanged
///
/// The guard is "already equals target", not "matches an expected prior
/// state": a write for `ready` is applied even if the order is `received`.
#[async_trait]
pub trait OrderStatusWriter: Send + Sync {
    async fn update_order_status(
        &self,
        order_number: &str,
        status: OrderStatus,
        actor: &str,
    ) -> Result<StatusUpdate, KitchenError>;

    /// Current status without taking the row lock. `None` if the order is unknown.
    async fn current_status(&self, order_number: &str) -> Result<Option<OrderStatus>, KitchenError>;
}

/// Read side consumed by tracking.
#[async_trait]
pub trait OrderStatusReader: Send + Sync {
    async fn get_order(&self, order_number: &str) -> Result<Option<OrderRecord>, KitchenError>;

    /// Applied transitions for an order, oldest first.
    async fn status_history(
        &self,
        order_number: &str,
    ) -> Result<Vec<StatusChangeLogEntry>, KitchenError>;
}
