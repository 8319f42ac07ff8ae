use kitchen_core::domain::{KitchenError, NOTIFICATIONS_EXCHANGE, ORDERS_EXCHANGE};
use lapin::options::ExchangeDeclareOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::info;

use crate::broker_error;

/// One connection per process. Each consumer or publisher opens its own channel.
pub struct AmqpClient {
    connection: Connection,
}

impl AmqpClient {
    pub async fn connect(url: &str) -> Result<Self, KitchenError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(broker_error("connect"))?;
        info!("connected to rabbitmq");
        Ok(Self { connection })
    }

    pub async fn channel(&self) -> Result<Channel, KitchenError> {
        self.connection
            .create_channel()
            .await
            .map_err(broker_error("create_channel"))
    }

    /// Declare both exchanges. Idempotent.
    pub async fn declare_exchanges(channel: &Channel) -> Result<(), KitchenError> {
        let durable = ExchangeDeclareOptions {
            durable: true,
            ..ExchangeDeclareOptions::default()
        };
        channel
            .exchange_declare(ORDERS_EXCHANGE, ExchangeKind::Topic, durable, FieldTable::default())
            .await
            .map_err(broker_error("declare_orders_exchange"))?;
        channel
            .exchange_declare(
                NOTIFICATIONS_EXCHANGE,
                ExchangeKind::Fanout,
                durable,
                FieldTable::default(),
            )
            .await
            .map_err(broker_error("declare_notifications_exchange"))?;
        Ok(())
    }

    pub async fn close(&self) -> Result<(), KitchenError> {
        self.connection
            .close(200, "shutdown")
            .await
            .map_err(broker_error("close"))
    }
}
