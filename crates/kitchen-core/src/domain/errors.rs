//! Errors - error type and operational classification

use thiserror::Error;

/// ErrorKind classifies a failure for the pipeline's requeue decision.
///
/// - Transient: retrying later can succeed (lost connection, lock timeout)
/// - Permanent: retrying is pointless (malformed payload)
/// - Infrastructure: a backing system failed (DB / broker)
/// - Conflict: a domain rule rejected the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
    Conflict,
}

#[derive(Debug, Error)]
pub enum KitchenError {
    /// Another live process already holds this worker identity.
    #[error("worker {0} is already online in another process")]
    WorkerConflict(String),

    #[error("worker already online")]
    AlreadyOnline,

    #[error("worker already offline")]
    AlreadyOffline,

    #[error("worker not found: {0}")]
    WorkerNotFound(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("unknown order status: {0}")]
    UnknownStatus(String),

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode status event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("storage error during {op}: {message}")]
    Storage { op: &'static str, message: String },

    #[error("broker error during {op}: {message}")]
    Broker { op: &'static str, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl KitchenError {
    pub fn storage(op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            op,
            message: err.to_string(),
        }
    }

    pub fn broker(op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Broker {
            op,
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            KitchenError::WorkerConflict(_)
            | KitchenError::AlreadyOnline
            | KitchenError::AlreadyOffline => ErrorKind::Conflict,
            KitchenError::Decode { .. }
            | KitchenError::Encode(_)
            | KitchenError::UnknownStatus(_)
            | KitchenError::Config(_) => ErrorKind::Permanent,
            KitchenError::Storage { .. } | KitchenError::Broker { .. } => {
                ErrorKind::Infrastructure
            }
            KitchenError::WorkerNotFound(_) | KitchenError::OrderNotFound(_) => {
                ErrorKind::Transient
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_conflicts_are_classified_as_conflict() {
        assert_eq!(KitchenError::AlreadyOffline.kind(), ErrorKind::Conflict);
        assert_eq!(
            KitchenError::WorkerConflict("w1".into()).kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn storage_error_keeps_operation_in_message() {
        let err = KitchenError::storage("update_order_status", "connection reset");
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(err.to_string().contains("update_order_status"));
        assert!(err.to_string().contains("connection reset"));
    }
}
