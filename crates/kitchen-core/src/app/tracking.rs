//! TrackingService - read-only projections over orders and workers

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    DEFAULT_STALE_AFTER, KitchenError, OrderRecord, OrderStatus, StatusChangeLogEntry,
    WorkerPresence,
};
use crate::ports::{Clock, OrderStatusReader, WorkerRegistry};

/// Current state of one order as shown to customers and staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusView {
    pub order_number: String,
    pub current_status: OrderStatus,
    pub updated_at: DateTime<Utc>,
    /// Completion time once completed; the cooking estimate while cooking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,
}

impl From<&OrderRecord> for OrderStatusView {
    fn from(order: &OrderRecord) -> Self {
        let estimated_completion = match (order.completed_at, order.status) {
            (Some(done), _) => Some(done),
            (None, OrderStatus::Cooking) => chrono::Duration::from_std(order.order_type.cooking_time())
                .ok()
                .map(|cook| order.updated_at + cook),
            _ => None,
        };
        Self {
            order_number: order.order_number.clone(),
            current_status: order.status,
            updated_at: order.updated_at,
            estimated_completion,
            processed_by: order.processed_by.clone(),
        }
    }
}

pub struct TrackingService {
    orders: Arc<dyn OrderStatusReader>,
    workers: Arc<dyn WorkerRegistry>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl TrackingService {
    pub fn new(
        orders: Arc<dyn OrderStatusReader>,
        workers: Arc<dyn WorkerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            workers,
            clock,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub async fn order_status(&self, order_number: &str) -> Result<OrderStatusView, KitchenError> {
        debug!(order_number, "looking up order status");
        self.orders
            .get_order(order_number)
            .await?
            .as_ref()
            .map(OrderStatusView::from)
            .ok_or_else(|| KitchenError::OrderNotFound(order_number.to_string()))
    }

    /// Applied transitions, oldest first.
    pub async fn order_history(
        &self,
        order_number: &str,
    ) -> Result<Vec<StatusChangeLogEntry>, KitchenError> {
        if self.orders.get_order(order_number).await?.is_none() {
            return Err(KitchenError::OrderNotFound(order_number.to_string()));
        }
        let mut history = self.orders.status_history(order_number).await?;
        history.sort_by_key(|entry| entry.changed_at);
        Ok(history)
    }

    /// Every worker with presence inferred from `last_seen`, not the stored status.
    pub async fn workers_status(&self) -> Result<Vec<WorkerPresence>, KitchenError> {
        let now = self.clock.now();
        Ok(self
            .workers
            .list()
            .await?
            .into_iter()
            .map(|worker| WorkerPresence {
                status: worker.presence(now, self.stale_after),
                worker_name: worker.name,
                orders_processed: worker.orders_processed,
                last_seen: worker.last_seen,
            })
            .collect())
    }
}
