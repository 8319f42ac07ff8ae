//! Ports - capability interfaces
//!
//! The kitchen pipeline only talks to these traits. PostgreSQL and RabbitMQ
//! implementations live in `kitchen-pg` and `kitchen-amqp`; `impls` has the
//! in-memory versions used in development and tests.
//!
//! # Design
//! - The relational store is the source of truth for order and worker state
//! - The broker only carries work items and status events
//! - Every port is `Send + Sync` and shared as `Arc<dyn _>` between per-item tasks

pub mod broker;
pub mod clock;
pub mod order_store;
pub mod worker_registry;

pub use self::broker::{Delivery, DeliverySource, StatusBroadcaster};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::order_store::{OrderStatusReader, OrderStatusWriter, StatusUpdate};
pub use self::worker_registry::WorkerRegistry;
