//! Broker ports - work item deliveries and the status broadcast

use async_trait::async_trait;

use crate::domain::{DeliveryId, KitchenError, StatusChangedEvent};

/// A message handed out by the broker. The holder must settle it exactly
/// once with `ack` or `nack`.
///
/// Dropping a delivery without settling leaves it to the broker (it is
/// redelivered when the channel closes).
#[async_trait]
pub trait Delivery: Send {
    /// Correlates log lines about this delivery; stable across in-memory requeues.
    fn id(&self) -> DeliveryId;

    fn payload(&self) -> &[u8];

    /// Set when the broker has handed this message out before.
    fn redelivered(&self) -> bool;

    async fn ack(self: Box<Self>) -> Result<(), KitchenError>;

    /// `requeue = false` drops the message (poison policy).
    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), KitchenError>;
}

/// A stream of deliveries: the kitchen's order queue binding, or one
/// subscriber's queue on the status broadcast.
#[async_trait]
pub trait DeliverySource: Send + Sync {
    /// Wait for the next delivery. `Ok(None)` once the source is closed.
    ///
    /// How many deliveries may be outstanding at once is the source's
    /// prefetch limit.
    async fn next_delivery(&self) -> Result<Option<Box<dyn Delivery>>, KitchenError>;
}

/// StatusBroadcaster publishes to every bound subscriber.
///
/// Publishing is at-most-once from the caller's side: no retry here.
#[async_trait]
pub trait StatusBroadcaster: Send + Sync {
    async fn publish(&self, event: &StatusChangedEvent) -> Result<(), KitchenError>;
}
