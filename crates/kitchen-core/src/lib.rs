//! kitchen-core
//!
//! Order fulfillment pipeline for the restaurant back office.
//!
//! # Modules
//! - **domain**: order state machine, work items, workers, status events, errors
//! - **ports**: storage and broker seams (OrderStatusWriter, WorkerRegistry, DeliverySource, ...)
//! - **app**: services (KitchenService, WorkerLifecycle, NotificationSubscriber, TrackingService)
//! - **impls**: in-memory adapters for development and tests
//!
//! Postgres and RabbitMQ adapters live in `kitchen-pg` and `kitchen-amqp`.

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
