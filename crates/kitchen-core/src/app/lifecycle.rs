//! WorkerLifecycle - registration, heartbeat and availability of one worker identity

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::shutdown_requested;
use crate::domain::{KitchenError, OrderType, Worker};
use crate::ports::{Clock, WorkerRegistry};

pub struct WorkerLifecycle {
    registry: Arc<dyn WorkerRegistry>,
    clock: Arc<dyn Clock>,
}

impl WorkerLifecycle {
    pub fn new(registry: Arc<dyn WorkerRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// Bring `name` online for this process.
    ///
    /// - absent: insert offline, then flip online
    /// - present and offline: take over the row (type, last_seen, online)
    /// - present and online: `WorkerConflict`, another process holds the identity
    pub async fn ensure_registered(
        &self,
        name: &str,
        order_type: OrderType,
    ) -> Result<Worker, KitchenError> {
        let now = self.clock.now();
        let mut worker = match self.registry.get_by_name(name).await? {
            Some(existing) if existing.is_online() => {
                warn!(worker = name, "worker identity already online");
                return Err(KitchenError::WorkerConflict(name.to_string()));
            }
            Some(mut existing) => {
                existing.order_type = order_type;
                existing
            }
            None => {
                // A concurrent start can win the insert after our lookup.
                let row = self
                    .registry
                    .register(&Worker::new(name, order_type, now))
                    .await
                    .inspect_err(|err| {
                        if matches!(err, KitchenError::WorkerConflict(_)) {
                            warn!(worker = name, "worker identity registered concurrently");
                        }
                    })?;
                info!(worker = name, id = row.id, %order_type, "worker registered");
                row
            }
        };

        worker.go_online(now)?;
        self.registry.update(&worker).await?;
        info!(worker = name, %order_type, "worker online");
        Ok(worker)
    }

    /// One heartbeat: refresh last_seen.
    pub async fn heartbeat(&self, name: &str) -> Result<(), KitchenError> {
        self.registry.touch(name, self.clock.now()).await
    }

    /// Refresh last_seen every `interval` until shutdown.
    ///
    /// A failed heartbeat ends the loop with that error; the caller is
    /// expected to shut the process down.
    pub async fn run_heartbeat(
        &self,
        name: &str,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), KitchenError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; registration just set last_seen.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    debug!(worker = name, "heartbeat stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.heartbeat(name).await {
                        error!(worker = name, error = %err, "heartbeat failed");
                        return Err(err);
                    }
                    debug!(worker = name, "heartbeat");
                }
            }
        }
    }

    /// Mark `name` offline. Already offline counts as success.
    pub async fn set_offline(&self, name: &str) -> Result<(), KitchenError> {
        let mut worker = self
            .registry
            .get_by_name(name)
            .await?
            .ok_or_else(|| KitchenError::WorkerNotFound(name.to_string()))?;

        match worker.go_offline(self.clock.now()) {
            Ok(()) => {
                self.registry.update(&worker).await?;
                info!(worker = name, "worker offline");
                Ok(())
            }
            Err(KitchenError::AlreadyOffline) => {
                debug!(worker = name, "worker already offline");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Mark every online worker offline. Returns how many rows changed.
    pub async fn set_all_offline(&self) -> Result<usize, KitchenError> {
        let now = self.clock.now();
        let mut changed = 0;
        for mut worker in self.registry.list().await? {
            if worker.go_offline(now).is_ok() {
                self.registry.update(&worker).await?;
                changed += 1;
            }
        }
        info!(changed, "all workers marked offline");
        Ok(changed)
    }

    /// Count one finished order and refresh last_seen, atomically in storage.
    pub async fn record_processed_order(&self, name: &str) -> Result<(), KitchenError> {
        self.registry
            .record_processed_order(name, self.clock.now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkerStatus;
    use crate::impls::InMemoryWorkerRegistry;
    use crate::ports::FixedClock;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    fn setup() -> (Arc<FixedClock>, Arc<InMemoryWorkerRegistry>, WorkerLifecycle) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
        ));
        let registry = Arc::new(InMemoryWorkerRegistry::new());
        let lifecycle = WorkerLifecycle::new(registry.clone(), clock.clone());
        (clock, registry, lifecycle)
    }

    #[tokio::test]
    async fn registration_survives_restart() {
        let (_clock, registry, lifecycle) = setup();

        let first = lifecycle
            .ensure_registered("w1", OrderType::Takeout)
            .await
            .unwrap();
        assert_eq!(first.status, WorkerStatus::Online);

        // Process exits cleanly, then starts again under the same name.
        lifecycle.set_offline("w1").await.unwrap();
        lifecycle
            .ensure_registered("w1", OrderType::Takeout)
            .await
            .unwrap();

        let rows = registry.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "w1");
        assert_eq!(rows[0].status, WorkerStatus::Online);
    }

    #[tokio::test]
    async fn second_live_process_is_rejected() {
        let (_clock, _registry, lifecycle) = setup();
        lifecycle
            .ensure_registered("w1", OrderType::Takeout)
            .await
            .unwrap();

        let err = lifecycle
            .ensure_registered("w1", OrderType::Takeout)
            .await
            .unwrap_err();
        assert!(matches!(err, KitchenError::WorkerConflict(name) if name == "w1"));
    }

    /// Lookup always misses, as if another process inserted right after it.
    struct LateLookup(Arc<InMemoryWorkerRegistry>);

    #[async_trait]
    impl WorkerRegistry for LateLookup {
        async fn get_by_name(&self, _name: &str) -> Result<Option<Worker>, KitchenError> {
            Ok(None)
        }

        async fn list(&self) -> Result<Vec<Worker>, KitchenError> {
            self.0.list().await
        }

        async fn register(&self, worker: &Worker) -> Result<Worker, KitchenError> {
            self.0.register(worker).await
        }

        async fn update(&self, worker: &Worker) -> Result<(), KitchenError> {
            self.0.update(worker).await
        }

        async fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<(), KitchenError> {
            self.0.touch(name, at).await
        }

        async fn record_processed_order(
            &self,
            name: &str,
            at: DateTime<Utc>,
        ) -> Result<(), KitchenError> {
            self.0.record_processed_order(name, at).await
        }
    }

    #[tokio::test]
    async fn losing_a_registration_race_is_a_conflict() {
        let (clock, registry, lifecycle) = setup();
        lifecycle
            .ensure_registered("w1", OrderType::Takeout)
            .await
            .unwrap();

        let racer = WorkerLifecycle::new(Arc::new(LateLookup(registry.clone())), clock);
        let err = racer
            .ensure_registered("w1", OrderType::Takeout)
            .await
            .unwrap_err();
        assert!(matches!(err, KitchenError::WorkerConflict(name) if name == "w1"));
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn takeover_updates_order_type() {
        let (_clock, registry, lifecycle) = setup();
        lifecycle
            .ensure_registered("w1", OrderType::Takeout)
            .await
            .unwrap();
        lifecycle.set_offline("w1").await.unwrap();
        lifecycle
            .ensure_registered("w1", OrderType::Delivery)
            .await
            .unwrap();

        let row = registry.get_by_name("w1").await.unwrap().unwrap();
        assert_eq!(row.order_type, OrderType::Delivery);
    }

    #[tokio::test]
    async fn set_offline_is_idempotent() {
        let (_clock, registry, lifecycle) = setup();
        lifecycle
            .ensure_registered("w1", OrderType::DineIn)
            .await
            .unwrap();

        lifecycle.set_offline("w1").await.unwrap();
        lifecycle.set_offline("w1").await.unwrap();

        let row = registry.get_by_name("w1").await.unwrap().unwrap();
        assert_eq!(row.status, WorkerStatus::Offline);
    }

    #[tokio::test]
    async fn set_offline_for_unknown_worker_fails() {
        let (_clock, _registry, lifecycle) = setup();
        let err = lifecycle.set_offline("ghost").await.unwrap_err();
        assert!(matches!(err, KitchenError::WorkerNotFound(_)));
    }

    #[tokio::test]
    async fn set_all_offline_only_counts_online_workers() {
        let (_clock, _registry, lifecycle) = setup();
        lifecycle.ensure_registered("w1", OrderType::DineIn).await.unwrap();
        lifecycle.ensure_registered("w2", OrderType::Takeout).await.unwrap();
        lifecycle.set_offline("w2").await.unwrap();

        assert_eq!(lifecycle.set_all_offline().await.unwrap(), 1);
        assert_eq!(lifecycle.set_all_offline().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_refreshes_last_seen_until_shutdown() {
        let (clock, registry, lifecycle) = setup();
        let lifecycle = Arc::new(lifecycle);
        lifecycle
            .ensure_registered("w1", OrderType::Takeout)
            .await
            .unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let beat = tokio::spawn({
            let lifecycle = Arc::clone(&lifecycle);
            async move {
                lifecycle
                    .run_heartbeat("w1", Duration::from_secs(30), stop_rx)
                    .await
            }
        });

        clock.advance(chrono::Duration::seconds(31));
        tokio::time::sleep(Duration::from_secs(31)).await;
        let row = registry.get_by_name("w1").await.unwrap().unwrap();
        assert_eq!(row.last_seen, clock.now());

        stop_tx.send(true).unwrap();
        beat.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_failure_ends_the_loop() {
        let (_clock, registry, lifecycle) = setup();
        lifecycle
            .ensure_registered("w1", OrderType::Takeout)
            .await
            .unwrap();
        registry.fail_next_writes(1).await;

        let (_stop_tx, stop_rx) = watch::channel(false);
        let err = lifecycle
            .run_heartbeat("w1", Duration::from_secs(30), stop_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, KitchenError::Storage { .. }));
    }

    #[tokio::test]
    async fn processed_counter_increments() {
        let (_clock, registry, lifecycle) = setup();
        lifecycle.ensure_registered("w1", OrderType::Takeout).await.unwrap();
        lifecycle.record_processed_order("w1").await.unwrap();
        lifecycle.record_processed_order("w1").await.unwrap();

        let row = registry.get_by_name("w1").await.unwrap().unwrap();
        assert_eq!(row.orders_processed, 2);
    }
}
