//! Notification subscriber - consumes the status fan-out and hands each
//! event to a handler.
//!
//! Delivery is at-least-once, so handlers must tolerate duplicates.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::shutdown_requested;
use crate::domain::{KitchenError, Notification, StatusChangedEvent};
use crate::ports::{Delivery, DeliverySource};

/// Reacts to one status change.
#[async_trait]
pub trait StatusEventHandler: Send + Sync {
    async fn handle(&self, event: &StatusChangedEvent) -> Result<(), KitchenError>;
}

/// Prints the human-readable notification and logs the structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl StatusEventHandler for LoggingNotifier {
    async fn handle(&self, event: &StatusChangedEvent) -> Result<(), KitchenError> {
        let notification = Notification::from(event);
        info!(
            order_number = %notification.order_number,
            old_status = %notification.old_status,
            new_status = %notification.new_status,
            changed_by = %notification.changed_by,
            estimated_completion = ?event.estimated_completion,
            "{}",
            notification.message
        );
        Ok(())
    }
}

pub struct NotificationSubscriber {
    handler: Arc<dyn StatusEventHandler>,
}

impl NotificationSubscriber {
    pub fn new(handler: Arc<dyn StatusEventHandler>) -> Self {
        Self { handler }
    }

    /// Consume until shutdown. Deliveries are handled one at a time.
    pub async fn run(
        &self,
        source: Arc<dyn DeliverySource>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), KitchenError> {
        info!("notification subscriber started");
        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!("notification subscriber stopping");
                    return Ok(());
                }
                next = source.next_delivery() => match next? {
                    Some(delivery) => self.handle_delivery(delivery).await,
                    None => return Err(KitchenError::broker("consume_notifications", "subscription closed")),
                },
            }
        }
    }

    async fn handle_delivery(&self, delivery: Box<dyn Delivery>) {
        let delivery_id = delivery.id();
        let event = match StatusChangedEvent::decode(delivery.payload()) {
            Ok(event) => event,
            Err(err) => {
                warn!(%delivery_id, error = %err, "dropping undecodable status event");
                if let Err(err) = delivery.nack(false).await {
                    error!(error = %err, "failed to reject status event");
                }
                return;
            }
        };

        let settled = match self.handler.handle(&event).await {
            Ok(()) => delivery.ack().await,
            Err(err) => {
                warn!(order_number = %event.order_number, %delivery_id, error = %err, "handler failed, requeueing");
                delivery.nack(true).await
            }
        };
        if let Err(err) = settled {
            error!(order_number = %event.order_number, %delivery_id, error = %err, "failed to settle status event");
        }
    }
}
