//! App - application services built on the ports
//!
//! # Components
//! - **WorkerLifecycle**: registration, heartbeat, offline marking, load counter
//! - **KitchenService**: order queue consumption and the per-order state machine
//! - **NotificationSubscriber**: consumer side of the status broadcast
//! - **TrackingService**: read-only projections for order and worker status
//!
//! Every long-running loop observes one `watch::Receiver<bool>` shutdown
//! signal; `true` (or a dropped sender) means stop.

pub mod kitchen;
pub mod lifecycle;
pub mod notifier;
pub mod tracking;

pub use self::kitchen::{ItemOutcome, KitchenService};
pub use self::lifecycle::WorkerLifecycle;
pub use self::notifier::{LoggingNotifier, NotificationSubscriber, StatusEventHandler};
pub use self::tracking::{OrderStatusView, TrackingService};

use tokio::sync::watch;

/// Resolves once shutdown has been requested or the signal's owner is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
