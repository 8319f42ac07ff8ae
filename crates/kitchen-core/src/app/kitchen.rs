//! KitchenService - consumes work items and drives each order to `ready`
//!
//! # Per item
//! 1. decode the delivery (undecodable: reject without requeue)
//!    and ack straight away if the order is already `ready` or later
//! 2. `cooking`, transactional and idempotent, then broadcast
//! 3. wait the cooking time for the order type (shutdown abandons the item)
//! 4. `ready`, broadcast, count the order for this worker, ack
//!
//! Any error in 2-4 nacks with requeue. Each item runs in its own task and a
//! panic inside it is turned into the same nack.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::lifecycle::WorkerLifecycle;
use super::shutdown_requested;
use crate::domain::{KitchenError, OrderStatus, OrderWorkItem, StatusChangedEvent};
use crate::ports::{Clock, Delivery, DeliverySource, OrderStatusWriter, StatusBroadcaster, StatusUpdate};

/// How one work item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Order reached `ready`; the delivery is acked.
    Ready,
    /// Shutdown arrived while cooking; the delivery is requeued.
    Abandoned,
    /// The order was already `ready` or later; nothing written, the delivery is acked.
    AlreadyDone,
}

pub struct KitchenService {
    worker_name: String,
    orders: Arc<dyn OrderStatusWriter>,
    broadcaster: Arc<dyn StatusBroadcaster>,
    lifecycle: Arc<WorkerLifecycle>,
    clock: Arc<dyn Clock>,
    shutdown_grace: Duration,
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl KitchenService {
    pub fn new(
        worker_name: impl Into<String>,
        orders: Arc<dyn OrderStatusWriter>,
        broadcaster: Arc<dyn StatusBroadcaster>,
        lifecycle: Arc<WorkerLifecycle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            worker_name: worker_name.into(),
            orders,
            broadcaster,
            lifecycle,
            clock,
            shutdown_grace: Duration::from_secs(30),
        }
    }

    /// How long `run` waits for in-flight items after shutdown before aborting them.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// Consume `source` until shutdown, spawning one task per delivery.
    ///
    /// Returns `Ok` on shutdown and an error if the source fails or closes
    /// underneath us.
    pub async fn run(
        self: Arc<Self>,
        source: Arc<dyn DeliverySource>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), KitchenError> {
        let mut in_flight: JoinSet<()> = JoinSet::new();
        info!(worker = %self.worker_name, "kitchen service started");

        let result = loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!(worker = %self.worker_name, "kitchen service stopping");
                    break Ok(());
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(err) = joined {
                        error!(worker = %self.worker_name, error = %err, "order task ended abnormally");
                    }
                }
                next = source.next_delivery() => match next {
                    Ok(Some(delivery)) => {
                        in_flight.spawn(Arc::clone(&self).handle_delivery(delivery, shutdown.clone()));
                    }
                    Ok(None) => break Err(KitchenError::broker("consume_orders", "order queue closed")),
                    Err(err) => break Err(err),
                },
            }
        };

        self.drain(in_flight).await;
        result
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }
        info!(
            worker = %self.worker_name,
            in_flight = in_flight.len(),
            grace = ?self.shutdown_grace,
            "waiting for in-flight orders"
        );
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                worker = %self.worker_name,
                remaining = in_flight.len(),
                "grace period elapsed, aborting in-flight orders"
            );
            in_flight.shutdown().await;
        }
    }

    /// Decode, process and settle one delivery. Never panics outward.
    pub async fn handle_delivery(
        self: Arc<Self>,
        delivery: Box<dyn Delivery>,
        shutdown: watch::Receiver<bool>,
    ) {
        let delivery_id = delivery.id();
        let item = match OrderWorkItem::decode(delivery.payload()) {
            Ok(item) => item,
            Err(err) => {
                warn!(worker = %self.worker_name, %delivery_id, error = %err, "rejecting undecodable work item");
                if let Err(err) = delivery.nack(false).await {
                    error!(worker = %self.worker_name, error = %err, "failed to reject work item");
                }
                return;
            }
        };

        let request_id = item.request_id();
        info!(
            worker = %self.worker_name,
            order_number = %item.order_number,
            request_id = %request_id,
            %delivery_id,
            redelivered = delivery.redelivered(),
            "processing order"
        );

        let service = Arc::clone(&self);
        let task = tokio::spawn(async move { service.process(&item, shutdown).await });
        let _abort = AbortOnDrop(task.abort_handle());

        let settled = match task.await {
            Ok(Ok(ItemOutcome::Ready | ItemOutcome::AlreadyDone)) => delivery.ack().await,
            Ok(Ok(ItemOutcome::Abandoned)) => {
                info!(request_id = %request_id, %delivery_id, "cooking interrupted by shutdown, requeueing");
                delivery.nack(true).await
            }
            Ok(Err(err)) => {
                error!(
                    request_id = %request_id,
                    %delivery_id,
                    error = %err,
                    kind = ?err.kind(),
                    "order processing failed, requeueing"
                );
                delivery.nack(true).await
            }
            Err(join_err) => {
                error!(
                    request_id = %request_id,
                    %delivery_id,
                    panicked = join_err.is_panic(),
                    error = %join_err,
                    "order task died, requeueing"
                );
                delivery.nack(true).await
            }
        };

        if let Err(err) = settled {
            error!(request_id = %request_id, %delivery_id, error = %err, "failed to settle delivery");
        }
    }

    /// Run the state machine for one item.
    pub async fn process(
        &self,
        item: &OrderWorkItem,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ItemOutcome, KitchenError> {
        let cooking_time = item.cooking_time();

        // A redelivery after `ready` committed must not rewind the order.
        if self.already_done(item).await? {
            return Ok(ItemOutcome::AlreadyDone);
        }

        let (_, started) = self
            .advance(item, OrderStatus::Received, OrderStatus::Cooking)
            .await?;
        let eta = started.timestamp
            + chrono::Duration::from_std(cooking_time).unwrap_or_else(|_| chrono::Duration::zero());
        self.announce(&started.with_estimated_completion(eta)).await;

        tokio::select! {
            _ = tokio::time::sleep(cooking_time) => {}
            _ = shutdown_requested(&mut shutdown) => return Ok(ItemOutcome::Abandoned),
        }

        if self.already_done(item).await? {
            return Ok(ItemOutcome::AlreadyDone);
        }

        let (update, ready) = self
            .advance(item, OrderStatus::Cooking, OrderStatus::Ready)
            .await?;
        self.announce(&ready).await;

        if update.was_applied() {
            if let Err(err) = self.lifecycle.record_processed_order(&self.worker_name).await {
                error!(
                    worker = %self.worker_name,
                    order_number = %item.order_number,
                    error = %err,
                    "failed to count processed order"
                );
            }
        } else {
            debug!(order_number = %item.order_number, "order was already ready, not counted again");
        }

        info!(worker = %self.worker_name, order_number = %item.order_number, "order ready");
        Ok(ItemOutcome::Ready)
    }

    /// Is the order already `ready` or later? Unknown orders are left to the write.
    async fn already_done(&self, item: &OrderWorkItem) -> Result<bool, KitchenError> {
        match self.orders.current_status(&item.order_number).await? {
            Some(current) if current.is_past_kitchen() => {
                info!(
                    worker = %self.worker_name,
                    order_number = %item.order_number,
                    %current,
                    "order already past the kitchen, skipping"
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Write `status` and build the event describing the change.
    ///
    /// `expected_previous` names the old status when the write was a no-op.
    async fn advance(
        &self,
        item: &OrderWorkItem,
        expected_previous: OrderStatus,
        status: OrderStatus,
    ) -> Result<(StatusUpdate, StatusChangedEvent), KitchenError> {
        let update = self
            .orders
            .update_order_status(&item.order_number, status, &self.worker_name)
            .await?;

        let old_status = match update {
            StatusUpdate::Applied { previous } => {
                if !previous.can_advance_to(status) {
                    warn!(
                        order_number = %item.order_number,
                        %previous,
                        %status,
                        "status moved outside the forward graph"
                    );
                }
                previous
            }
            StatusUpdate::Unchanged => {
                debug!(order_number = %item.order_number, %status, "status already applied");
                expected_previous
            }
        };

        let event = StatusChangedEvent::new(
            item.order_number.clone(),
            old_status,
            status,
            self.worker_name.clone(),
            self.clock.now(),
        );
        Ok((update, event))
    }

    /// Best-effort broadcast: failures are logged, never retried.
    async fn announce(&self, event: &StatusChangedEvent) {
        if let Err(err) = self.broadcaster.publish(event).await {
            warn!(
                order_number = %event.order_number,
                new_status = %event.new_status,
                error = %err,
                "failed to broadcast status change"
            );
        }
    }
}
