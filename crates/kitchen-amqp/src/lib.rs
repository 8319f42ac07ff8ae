//! RabbitMQ adapters for the kitchen ports.
//!
//! # Topology
//! - `orders_topic` (topic): work items keyed `kitchen.<type>.<priority>`,
//!   consumed from the durable `kitchen_orders` queue
//! - `notifications_fanout` (fanout): status events, one server-named
//!   exclusive queue per subscriber process

mod client;
mod consumer;
mod publisher;

pub use self::client::AmqpClient;
pub use self::consumer::{AmqpConsumer, AmqpDelivery};
pub use self::publisher::AmqpStatusBroadcaster;

use kitchen_core::domain::KitchenError;
use lapin::BasicProperties;

pub const ENV_AMQP_URL: &str = "RABBITMQ_URL";

pub(crate) fn broker_error(op: &'static str) -> impl Fn(lapin::Error) -> KitchenError {
    move |err| KitchenError::broker(op, err)
}

/// JSON body, persistent delivery.
pub(crate) fn json_properties() -> BasicProperties {
    BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(2)
}
