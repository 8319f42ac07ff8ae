//! Worker - kitchen worker identity, availability and load counter

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::KitchenError;
use super::order::OrderType;

/// Default staleness threshold for inferring presence from `last_seen`.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Online,
    Offline,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Online => "online",
            WorkerStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = KitchenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(WorkerStatus::Online),
            "offline" => Ok(WorkerStatus::Offline),
            other => Err(KitchenError::UnknownStatus(other.to_string())),
        }
    }
}

/// Worker row in the registry. Rows are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Registry-assigned id; 0 until the row has been inserted.
    pub id: i64,
    pub name: String,
    pub order_type: OrderType,
    pub status: WorkerStatus,
    pub orders_processed: i64,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Worker {
    /// A worker about to be inserted. New rows start offline.
    pub fn new(name: impl Into<String>, order_type: OrderType, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            order_type,
            status: WorkerStatus::Offline,
            orders_processed: 0,
            last_seen: now,
            created_at: now,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == WorkerStatus::Online
    }

    pub fn go_online(&mut self, now: DateTime<Utc>) -> Result<(), KitchenError> {
        if self.status == WorkerStatus::Online {
            return Err(KitchenError::AlreadyOnline);
        }
        self.status = WorkerStatus::Online;
        self.last_seen = now;
        Ok(())
    }

    pub fn go_offline(&mut self, now: DateTime<Utc>) -> Result<(), KitchenError> {
        if self.status == WorkerStatus::Offline {
            return Err(KitchenError::AlreadyOffline);
        }
        self.status = WorkerStatus::Offline;
        self.last_seen = now;
        Ok(())
    }

    /// Presence as displayed by tracking: a worker that has not been seen
    /// within `stale_after` is offline whatever its stored status says.
    pub fn presence(&self, now: DateTime<Utc>, stale_after: Duration) -> WorkerStatus {
        let age = now.signed_duration_since(self.last_seen);
        match age.to_std() {
            Ok(age) if age > stale_after => WorkerStatus::Offline,
            _ => WorkerStatus::Online,
        }
    }
}

/// Tracking projection of a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPresence {
    pub worker_name: String,
    pub status: WorkerStatus,
    pub orders_processed: i64,
    pub last_seen: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_735_689_600 + secs, 0).unwrap()
    }

    #[test]
    fn new_worker_starts_offline() {
        let worker = Worker::new("w1", OrderType::Takeout, at(0));
        assert_eq!(worker.status, WorkerStatus::Offline);
        assert_eq!(worker.orders_processed, 0);
    }

    #[test]
    fn strict_online_offline_transitions() {
        let mut worker = Worker::new("w1", OrderType::Takeout, at(0));
        worker.go_online(at(5)).unwrap();
        assert_eq!(worker.last_seen, at(5));
        assert!(matches!(worker.go_online(at(6)), Err(KitchenError::AlreadyOnline)));

        worker.go_offline(at(7)).unwrap();
        assert!(matches!(worker.go_offline(at(8)), Err(KitchenError::AlreadyOffline)));
        assert_eq!(worker.last_seen, at(7));
    }

    #[test]
    fn presence_is_inferred_from_last_seen() {
        let mut worker = Worker::new("w1", OrderType::Delivery, at(0));
        worker.status = WorkerStatus::Online;

        assert_eq!(worker.presence(at(120), DEFAULT_STALE_AFTER), WorkerStatus::Online);
        assert_eq!(worker.presence(at(121), DEFAULT_STALE_AFTER), WorkerStatus::Offline);

        // Stored offline but recently seen still displays online.
        worker.status = WorkerStatus::Offline;
        assert_eq!(worker.presence(at(10), DEFAULT_STALE_AFTER), WorkerStatus::Online);
    }
}
