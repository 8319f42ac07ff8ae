//! Identifiers - ULID based delivery ids, carried on every log line about a delivery

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// DeliveryId identifies one broker delivery (not the order it carries).
///
/// Sortable by creation time, so in-memory queues can log deliveries in order.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryId(Ulid);

impl DeliveryId {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let timestamp_ms = now.timestamp_millis().max(0) as u64;
        Self(Ulid::from_parts(timestamp_ms, rand::random()))
    }

    /// Id for a delivery received now, for adapters without a domain clock.
    pub fn now() -> Self {
        Self::generate(Utc::now())
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delivery-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ids_sort_by_generation_time() {
        let earlier = DeliveryId::generate(Utc.timestamp_millis_opt(1_000).unwrap());
        let later = DeliveryId::generate(Utc.timestamp_millis_opt(2_000).unwrap());
        assert!(earlier < later);
        assert!(earlier.to_string().starts_with("delivery-"));
    }

    #[test]
    fn ids_are_unique_within_one_millisecond() {
        let at = Utc.timestamp_millis_opt(5_000).unwrap();
        assert_ne!(DeliveryId::generate(at), DeliveryId::generate(at));
    }
}
