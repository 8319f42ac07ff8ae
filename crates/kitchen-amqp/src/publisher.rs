use async_trait::async_trait;
use kitchen_core::domain::{KitchenError, NOTIFICATIONS_EXCHANGE, StatusChangedEvent};
use kitchen_core::ports::StatusBroadcaster;
use lapin::Channel;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use tracing::debug;

use crate::{AmqpClient, broker_error, json_properties};

/// Publishes status events to the fan-out with publisher confirms.
pub struct AmqpStatusBroadcaster {
    channel: Channel,
}

impl AmqpStatusBroadcaster {
    pub async fn new(client: &AmqpClient) -> Result<Self, KitchenError> {
        let channel = client.channel().await?;
        AmqpClient::declare_exchanges(&channel).await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(broker_error("confirm_select"))?;
        Ok(Self { channel })
    }
}

#[async_trait]
impl StatusBroadcaster for AmqpStatusBroadcaster {
    async fn publish(&self, event: &StatusChangedEvent) -> Result<(), KitchenError> {
        let payload = event.encode()?;
        let confirmation = self
            .channel
            .basic_publish(
                NOTIFICATIONS_EXCHANGE,
                "",
                BasicPublishOptions::default(),
                &payload,
                json_properties(),
            )
            .await
            .map_err(broker_error("publish_status"))?
            .await
            .map_err(broker_error("publish_status_confirm"))?;
        if confirmation.is_nack() {
            return Err(KitchenError::broker(
                "publish_status",
                "broker refused the message",
            ));
        }
        debug!(
            order_number = %event.order_number,
            new_status = %event.new_status,
            "status change broadcast"
        );
        Ok(())
    }
}
