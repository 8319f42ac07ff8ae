use async_trait::async_trait;
use futures_util::StreamExt;
use kitchen_core::domain::{
    DeliveryId, KITCHEN_QUEUE, KitchenError, NOTIFICATIONS_EXCHANGE, ORDERS_EXCHANGE, OrderType, binding_key,
};
use kitchen_core::ports::{Delivery, DeliverySource};
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Consumer};
use tokio::sync::Mutex;
use tracing::info;

use crate::{AmqpClient, broker_error};

/// A broker message awaiting settlement.
pub struct AmqpDelivery {
    id: DeliveryId,
    payload: Vec<u8>,
    redelivered: bool,
    acker: Acker,
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn id(&self) -> DeliveryId {
        self.id
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn ack(self: Box<Self>) -> Result<(), KitchenError> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(broker_error("ack"))
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), KitchenError> {
        self.acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map_err(broker_error("nack"))
    }
}

/// Consumer on one queue. Prefetch bounds the unsettled deliveries.
pub struct AmqpConsumer {
    // Keeps the channel open for as long as the consumer lives.
    _channel: Channel,
    queue: String,
    consumer: Mutex<Consumer>,
}

impl AmqpConsumer {
    /// Consume `kitchen_orders`, bound to exactly one order type.
    pub async fn order_queue(
        client: &AmqpClient,
        order_type: OrderType,
        prefetch: u16,
        consumer_tag: &str,
    ) -> Result<Self, KitchenError> {
        let channel = client.channel().await?;
        AmqpClient::declare_exchanges(&channel).await?;
        channel
            .queue_declare(
                KITCHEN_QUEUE,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(broker_error("declare_kitchen_queue"))?;

        let key = binding_key(order_type);
        channel
            .queue_bind(
                KITCHEN_QUEUE,
                ORDERS_EXCHANGE,
                &key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(broker_error("bind_kitchen_queue"))?;
        info!(queue = KITCHEN_QUEUE, binding = %key, prefetch, "order queue bound");

        Self::consume(channel, KITCHEN_QUEUE.to_string(), prefetch, consumer_tag).await
    }

    /// Private server-named queue on the status fan-out, removed on disconnect.
    pub async fn notification_subscription(
        client: &AmqpClient,
        prefetch: u16,
        consumer_tag: &str,
    ) -> Result<Self, KitchenError> {
        let channel = client.channel().await?;
        AmqpClient::declare_exchanges(&channel).await?;
        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(broker_error("declare_subscriber_queue"))?;
        let name = queue.name().as_str().to_string();
        channel
            .queue_bind(
                &name,
                NOTIFICATIONS_EXCHANGE,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(broker_error("bind_subscriber_queue"))?;
        info!(queue = %name, "subscribed to status broadcast");

        Self::consume(channel, name, prefetch, consumer_tag).await
    }

    async fn consume(
        channel: Channel,
        queue: String,
        prefetch: u16,
        consumer_tag: &str,
    ) -> Result<Self, KitchenError> {
        channel
            .basic_qos(prefetch.max(1), BasicQosOptions::default())
            .await
            .map_err(broker_error("basic_qos"))?;
        let consumer = channel
            .basic_consume(
                &queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(broker_error("basic_consume"))?;
        Ok(Self {
            _channel: channel,
            queue,
            consumer: Mutex::new(consumer),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl DeliverySource for AmqpConsumer {
    async fn next_delivery(&self) -> Result<Option<Box<dyn Delivery>>, KitchenError> {
        let mut consumer = self.consumer.lock().await;
        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(Box::new(AmqpDelivery {
                id: DeliveryId::now(),
                payload: delivery.data,
                redelivered: delivery.redelivered,
                acker: delivery.acker,
            }))),
            Some(Err(err)) => Err(KitchenError::broker("consume", err)),
            None => Ok(None),
        }
    }
}
