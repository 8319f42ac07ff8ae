//! Order - persisted order state and its status graph

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::KitchenError;

/// OrderStatus is the lifecycle state of an order.
///
/// Forward graph:
/// - Received -> Cooking -> Ready -> Completed
/// - any non-terminal state -> Cancelled
///
/// `Ready -> Completed` belongs to the confirmation step, not to the kitchen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Received,
    Cooking,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Received => "received",
            OrderStatus::Cooking => "cooking",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Does `next` follow `self` on the forward graph?
    ///
    /// Stores do not enforce this; it is used to flag out-of-order writes.
    pub fn can_advance_to(self, next: OrderStatus) -> bool {
        match (self, next) {
            (OrderStatus::Received, OrderStatus::Cooking)
            | (OrderStatus::Cooking, OrderStatus::Ready)
            | (OrderStatus::Ready, OrderStatus::Completed) => true,
            (current, OrderStatus::Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }

    /// The kitchen has nothing left to do for an order in this status.
    pub fn is_past_kitchen(self) -> bool {
        matches!(self, OrderStatus::Ready) || self.is_terminal()
    }

    /// Transitions into this status stamp `completed_at`.
    pub fn stamps_completion(self) -> bool {
        self == OrderStatus::Completed
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = KitchenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(OrderStatus::Received),
            "cooking" => Ok(OrderStatus::Cooking),
            "ready" => Ok(OrderStatus::Ready),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(KitchenError::UnknownStatus(other.to_string())),
        }
    }
}

/// OrderType is the order category; it selects the queue binding and the
/// cooking time. Anything the kitchen does not recognise decodes as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    DineIn,
    Takeout,
    Delivery,
    #[serde(other)]
    Unknown,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::DineIn => "dine_in",
            OrderType::Takeout => "takeout",
            OrderType::Delivery => "delivery",
            OrderType::Unknown => "unknown",
        }
    }

    pub fn cooking_time(self) -> Duration {
        match self {
            OrderType::DineIn => Duration::from_secs(8),
            OrderType::Takeout => Duration::from_secs(10),
            OrderType::Delivery => Duration::from_secs(12),
            OrderType::Unknown => Duration::from_secs(10),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = KitchenError;

    /// Strict parse used for configuration, where `Unknown` is never valid.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dine_in" => Ok(OrderType::DineIn),
            "takeout" => Ok(OrderType::Takeout),
            "delivery" => Ok(OrderType::Delivery),
            other => Err(KitchenError::Config(format!(
                "order type must be one of dine_in, takeout, delivery (got {other:?})"
            ))),
        }
    }
}

/// OrderRecord is the stored order row as seen by the kitchen and tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_number: String,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub processed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OrderRecord {
    /// A freshly accepted order, as intake leaves it.
    pub fn received(
        order_number: impl Into<String>,
        order_type: OrderType,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_number: order_number.into(),
            order_type,
            status: OrderStatus::Received,
            processed_by: None,
            created_at: at,
            updated_at: at,
            completed_at: None,
        }
    }
}

/// One applied transition. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeLogEntry {
    pub order_number: String,
    pub status: OrderStatus,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl StatusChangeLogEntry {
    pub fn default_note(status: OrderStatus, actor: &str) -> String {
        format!("status changed to {status} by {actor}")
    }
}
