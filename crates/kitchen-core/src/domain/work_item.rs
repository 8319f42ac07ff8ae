//! OrderWorkItem - the unit of kitchen work carried by the order queue

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::KitchenError;
use super::order::OrderType;

/// Topic exchange that intake publishes new orders to.
pub const ORDERS_EXCHANGE: &str = "orders_topic";

/// Durable queue shared by kitchen workers.
pub const KITCHEN_QUEUE: &str = "kitchen_orders";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

/// OrderWorkItem is the message handed to a kitchen worker.
///
/// `table_number` is set for dine-in orders and `delivery_address` for
/// delivery orders; intake guarantees they are never both present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWorkItem {
    pub order_number: String,
    pub customer_name: String,
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    #[serde(default)]
    pub priority: u8,
}

impl OrderWorkItem {
    pub fn decode(payload: &[u8]) -> Result<Self, KitchenError> {
        serde_json::from_slice(payload).map_err(|source| KitchenError::Decode {
            what: "order work item",
            source,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// `kitchen.<order_type>.<priority>`
    pub fn routing_key(&self) -> String {
        format!("kitchen.{}.{}", self.order_type, self.priority)
    }

    pub fn cooking_time(&self) -> Duration {
        self.order_type.cooking_time()
    }

    /// Correlation id used in every log line about this order.
    pub fn request_id(&self) -> String {
        format!("order_{}", self.order_number)
    }
}

/// Binding pattern for a worker serving exactly one order type.
pub fn binding_key(order_type: OrderType) -> String {
    format!("kitchen.{order_type}.*")
}

/// AMQP topic matching: words split on `.`, `*` matches one word, `#` zero or more.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    fn go(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => go(&pattern[1..], key) || (!key.is_empty() && go(pattern, &key[1..])),
            (Some(&"*"), Some(_)) => go(&pattern[1..], &key[1..]),
            (Some(p), Some(k)) if p == k => go(&pattern[1..], &key[1..]),
            _ => false,
        }
    }
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    go(&pattern, &key)
}
