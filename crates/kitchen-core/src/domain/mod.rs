//! Domain model (orders, work items, workers, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod order;
pub mod work_item;
pub mod worker;

pub use self::errors::{ErrorKind, KitchenError};
pub use self::events::{NOTIFICATIONS_EXCHANGE, Notification, StatusChangedEvent};
pub use self::ids::DeliveryId;
pub use self::order::{OrderRecord, OrderStatus, OrderType, StatusChangeLogEntry};
pub use self::work_item::{
    KITCHEN_QUEUE, ORDERS_EXCHANGE, OrderItem, OrderWorkItem, binding_key, topic_matches,
};
pub use self::worker::{DEFAULT_STALE_AFTER, Worker, WorkerPresence, WorkerStatus};
