//! InMemoryOrderStore - orders and the append-only status log
//!
//! The whole store sits behind one async mutex. Holding it across the
//! read-compare-write stands in for the row lock a relational store takes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{KitchenError, OrderRecord, OrderStatus, StatusChangeLogEntry};
use crate::ports::{Clock, OrderStatusReader, OrderStatusWriter, StatusUpdate};

#[derive(Default)]
struct StoreState {
    orders: HashMap<String, OrderRecord>,
    log: Vec<StatusChangeLogEntry>,
    /// Injected failures: the next N writes fail before touching state.
    failing_writes: u32,
}

pub struct InMemoryOrderStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryOrderStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            clock,
        }
    }

    /// Seed an order the way intake would.
    pub async fn insert_order(&self, order: OrderRecord) {
        let mut state = self.state.lock().await;
        state.orders.insert(order.order_number.clone(), order);
    }

    /// Make the next `n` status writes fail with a storage error.
    pub async fn fail_next_writes(&self, n: u32) {
        self.state.lock().await.failing_writes = n;
    }

    /// Every log entry, in append order.
    pub async fn log_entries(&self) -> Vec<StatusChangeLogEntry> {
        self.state.lock().await.log.clone()
    }
}

#[async_trait]
impl OrderStatusWriter for InMemoryOrderStore {
    async fn update_order_status(
        &self,
        order_number: &str,
        status: OrderStatus,
        actor: &str,
    ) -> Result<StatusUpdate, KitchenError> {
        let mut state = self.state.lock().await;

        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(KitchenError::storage(
                "update_order_status",
                "injected failure",
            ));
        }

        let now = self.clock.now();
        let Some(order) = state.orders.get_mut(order_number) else {
            return Err(KitchenError::OrderNotFound(order_number.to_string()));
        };

        if order.status == status {
            debug!(order_number, %status, "order already in status, nothing written");
            return Ok(StatusUpdate::Unchanged);
        }

        let previous = order.status;
        order.status = status;
        order.processed_by = Some(actor.to_string());
        order.updated_at = now;
        if status.stamps_completion() {
            order.completed_at = Some(now);
        }

        state.log.push(StatusChangeLogEntry {
            order_number: order_number.to_string(),
            status,
            changed_by: actor.to_string(),
            changed_at: now,
            notes: Some(StatusChangeLogEntry::default_note(status, actor)),
        });

        info!(order_number, %previous, %status, actor, "order status updated");
        Ok(StatusUpdate::Applied { previous })
    }

    async fn current_status(&self, order_number: &str) -> Result<Option<OrderStatus>, KitchenError> {
        let state = self.state.lock().await;
        Ok(state.orders.get(order_number).map(|order| order.status))
    }
}

#[async_trait]
impl OrderStatusReader for InMemoryOrderStore {
    async fn get_order(&self, order_number: &str) -> Result<Option<OrderRecord>, KitchenError> {
        Ok(self.state.lock().await.orders.get(order_number).cloned())
    }

    async fn status_history(
        &self,
        order_number: &str,
    ) -> Result<Vec<StatusChangeLogEntry>, KitchenError> {
        let state = self.state.lock().await;
        Ok(state
            .log
            .iter()
            .filter(|entry| entry.order_number == order_number)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderType;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    async fn store_with_order() -> (Arc<FixedClock>, InMemoryOrderStore) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        ));
        let store = InMemoryOrderStore::new(clock.clone());
        store
            .insert_order(OrderRecord::received("A1", OrderType::Takeout, clock.now()))
            .await;
        (clock, store)
    }

    #[tokio::test]
    async fn repeated_write_is_idempotent() {
        let (clock, store) = store_with_order().await;
        let first_at = clock.now();

        let first = store
            .update_order_status("A1", OrderStatus::Cooking, "w1")
            .await
            .unwrap();
        assert_eq!(
            first,
            StatusUpdate::Applied {
                previous: OrderStatus::Received
            }
        );

        clock.advance(chrono::Duration::seconds(5));
        let second = store
            .update_order_status("A1", OrderStatus::Cooking, "w2")
            .await
            .unwrap();
        assert_eq!(second, StatusUpdate::Unchanged);

        let history = store.status_history("A1").await.unwrap();
        assert_eq!(history.len(), 1);
        let order = store.get_order("A1").await.unwrap().unwrap();
        assert_eq!(order.updated_at, first_at);
        assert_eq!(order.processed_by.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn skipping_a_state_is_permitted() {
        let (_clock, store) = store_with_order().await;
        let update = store
            .update_order_status("A1", OrderStatus::Ready, "w1")
            .await
            .unwrap();
        assert_eq!(
            update,
            StatusUpdate::Applied {
                previous: OrderStatus::Received
            }
        );
    }

    #[tokio::test]
    async fn completion_stamps_completed_at() {
        let (_clock, store) = store_with_order().await;
        store
            .update_order_status("A1", OrderStatus::Ready, "w1")
            .await
            .unwrap();
        assert!(store.get_order("A1").await.unwrap().unwrap().completed_at.is_none());

        store
            .update_order_status("A1", OrderStatus::Completed, "front-desk")
            .await
            .unwrap();
        assert!(store.get_order("A1").await.unwrap().unwrap().completed_at.is_some());
    }

    #[tokio::test]
    async fn failed_write_leaves_status_unchanged() {
        let (_clock, store) = store_with_order().await;
        store.fail_next_writes(1).await;

        let err = store
            .update_order_status("A1", OrderStatus::Cooking, "w1")
            .await
            .unwrap_err();
        assert!(matches!(err, KitchenError::Storage { .. }));

        let order = store.get_order("A1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Received);
        assert!(store.log_entries().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_order_is_reported() {
        let (_clock, store) = store_with_order().await;
        let err = store
            .update_order_status("missing", OrderStatus::Cooking, "w1")
            .await
            .unwrap_err();
        assert!(matches!(err, KitchenError::OrderNotFound(n) if n == "missing"));
    }
}
