//! InMemoryWorkerRegistry - worker rows keyed by name

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{KitchenError, Worker};
use crate::ports::WorkerRegistry;

#[derive(Default)]
struct RegistryState {
    workers: BTreeMap<String, Worker>,
    next_id: i64,
    failing_writes: u32,
}

impl RegistryState {
    fn take_failure(&mut self, op: &'static str) -> Result<(), KitchenError> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(KitchenError::storage(op, "injected failure"));
        }
        Ok(())
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Worker, KitchenError> {
        self.workers
            .get_mut(name)
            .ok_or_else(|| KitchenError::WorkerNotFound(name.to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryWorkerRegistry {
    state: Mutex<RegistryState>,
}

impl InMemoryWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes (update / touch / counter) fail.
    pub async fn fail_next_writes(&self, n: u32) {
        self.state.lock().await.failing_writes = n;
    }
}

#[async_trait]
impl WorkerRegistry for InMemoryWorkerRegistry {
    async fn get_by_name(&self, name: &str) -> Result<Option<Worker>, KitchenError> {
        Ok(self.state.lock().await.workers.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<Worker>, KitchenError> {
        let state = self.state.lock().await;
        let mut workers: Vec<Worker> = state.workers.values().cloned().collect();
        workers.sort_by_key(|w| (w.created_at, w.id));
        Ok(workers)
    }

    async fn register(&self, worker: &Worker) -> Result<Worker, KitchenError> {
        let mut state = self.state.lock().await;
        if state.workers.contains_key(&worker.name) {
            return Err(KitchenError::WorkerConflict(worker.name.clone()));
        }
        state.next_id += 1;
        let mut row = worker.clone();
        row.id = state.next_id;
        state.workers.insert(row.name.clone(), row.clone());
        Ok(row)
    }

    async fn update(&self, worker: &Worker) -> Result<(), KitchenError> {
        let mut state = self.state.lock().await;
        state.take_failure("update_worker")?;
        let row = state.get_mut(&worker.name)?;
        row.order_type = worker.order_type;
        row.status = worker.status;
        row.last_seen = worker.last_seen;
        Ok(())
    }

    async fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<(), KitchenError> {
        let mut state = self.state.lock().await;
        state.take_failure("touch_worker")?;
        state.get_mut(name)?.last_seen = at;
        Ok(())
    }

    async fn record_processed_order(
        &self,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), KitchenError> {
        let mut state = self.state.lock().await;
        state.take_failure("record_processed_order")?;
        let row = state.get_mut(name)?;
        row.orders_processed += 1;
        row.last_seen = at;
        Ok(())
    }
}
