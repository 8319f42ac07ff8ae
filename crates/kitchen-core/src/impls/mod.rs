//! Impls - in-memory port implementations (development and tests)
//!
//! # Included
//! - **InMemoryOrderStore**: orders + status log, `OrderStatusWriter` / `OrderStatusReader`
//! - **InMemoryWorkerRegistry**: `WorkerRegistry`
//! - **InMemoryBroker**: topic-routed order queues, fan-out status broadcast
//!
//! Production implementations live in their own crates:
//! - `kitchen-pg`: PostgreSQL store and registry
//! - `kitchen-amqp`: RabbitMQ consumer, broadcaster and subscription

pub mod inmem_broker;
pub mod inmem_store;
pub mod inmem_workers;

pub use self::inmem_broker::{InMemoryBroker, InMemoryQueue};
pub use self::inmem_store::InMemoryOrderStore;
pub use self::inmem_workers::InMemoryWorkerRegistry;
