//! Events - status change broadcast payload and its rendered notification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::KitchenError;
use super::order::OrderStatus;

/// Fan-out exchange mirroring every status change.
pub const NOTIFICATIONS_EXCHANGE: &str = "notifications_fanout";

/// StatusChangedEvent is broadcast after a status write commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub order_number: String,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub changed_by: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl StatusChangedEvent {
    pub fn new(
        order_number: impl Into<String>,
        old_status: OrderStatus,
        new_status: OrderStatus,
        changed_by: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            order_number: order_number.into(),
            old_status,
            new_status,
            changed_by: changed_by.into(),
            timestamp,
            estimated_completion: None,
        }
    }

    pub fn with_estimated_completion(mut self, at: DateTime<Utc>) -> Self {
        self.estimated_completion = Some(at);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, KitchenError> {
        serde_json::to_vec(self).map_err(KitchenError::Encode)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, KitchenError> {
        serde_json::from_slice(payload).map_err(|source| KitchenError::Decode {
            what: "status changed event",
            source,
        })
    }
}

/// Notification is what a subscriber shows for one status change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub order_number: String,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub changed_by: String,
    pub message: String,
}

impl From<&StatusChangedEvent> for Notification {
    fn from(event: &StatusChangedEvent) -> Self {
        let mut message = format!(
            "Notification for order {}: Status changed from '{}' to '{}' by {}",
            event.order_number, event.old_status, event.new_status, event.changed_by
        );
        if let Some(eta) = event.estimated_completion {
            message.push_str(&format!(". Estimated ready: {}", eta.to_rfc3339()));
        }
        Self {
            order_number: event.order_number.clone(),
            old_status: event.old_status,
            new_status: event.new_status,
            changed_by: event.changed_by.clone(),
            message,
        }
    }
}
