//! InMemoryBroker - topic-routed order queues and a fan-out status broadcast
//!
//! # Model
//! - `bind_order_queue` creates a queue bound to the order exchange with a topic pattern
//! - `subscribe` creates a queue bound to the status fan-out
//! - Each queue hands out at most `prefetch` unsettled deliveries
//! - `nack(requeue = true)` puts the message back at the head, flagged redelivered
//! - A delivery dropped without being settled is requeued, like a closed channel

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::domain::{DeliveryId, KitchenError, OrderWorkItem, StatusChangedEvent, topic_matches};
use crate::ports::{Clock, Delivery, DeliverySource, StatusBroadcaster};

/// Settlement counters for one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub ready: usize,
    pub unacked: usize,
    pub acked: usize,
    pub requeued: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone)]
struct Message {
    id: DeliveryId,
    payload: Vec<u8>,
    redelivered: bool,
}

struct QueueInner {
    messages: Mutex<VecDeque<Message>>,
    notify: Notify,
    credits: Arc<Semaphore>,
    closed: AtomicBool,
    unacked: AtomicUsize,
    acked: AtomicUsize,
    requeued: AtomicUsize,
    dropped: Mutex<Vec<Vec<u8>>>,
}

impl QueueInner {
    fn new(prefetch: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            credits: Arc::new(Semaphore::new(prefetch.max(1))),
            closed: AtomicBool::new(false),
            unacked: AtomicUsize::new(0),
            acked: AtomicUsize::new(0),
            requeued: AtomicUsize::new(0),
            dropped: Mutex::new(Vec::new()),
        }
    }

    fn push_back(&self, message: Message) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(message);
        self.notify.notify_one();
    }

    fn requeue(&self, mut message: Message) {
        message.redelivered = true;
        self.requeued.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_front(message);
        self.notify.notify_one();
    }

    fn pop_front(&self) -> Option<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.credits.close();
        self.notify.notify_waiters();
    }
}

/// One queue: a `DeliverySource`.
#[derive(Clone)]
pub struct InMemoryQueue {
    inner: Arc<QueueInner>,
}

impl InMemoryQueue {
    pub fn counts(&self) -> QueueCounts {
        QueueCounts {
            ready: self
                .inner
                .messages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            unacked: self.inner.unacked.load(Ordering::SeqCst),
            acked: self.inner.acked.load(Ordering::SeqCst),
            requeued: self.inner.requeued.load(Ordering::SeqCst),
            dropped: self
                .inner
                .dropped
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    /// Payloads that were nacked without requeue.
    pub fn dropped_payloads(&self) -> Vec<Vec<u8>> {
        self.inner
            .dropped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

#[async_trait]
impl DeliverySource for InMemoryQueue {
    async fn next_delivery(&self) -> Result<Option<Box<dyn Delivery>>, KitchenError> {
        let Ok(permit) = Arc::clone(&self.inner.credits).acquire_owned().await else {
            return Ok(None);
        };

        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.inner.pop_front() {
                self.inner.unacked.fetch_add(1, Ordering::SeqCst);
                debug!(delivery = %message.id, redelivered = message.redelivered, "delivering");
                return Ok(Some(Box::new(InMemoryDelivery {
                    id: message.id,
                    message: Some(message),
                    queue: Arc::clone(&self.inner),
                    _permit: permit,
                })));
            }
            if self.inner.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }

            notified.await;
        }
    }
}

struct InMemoryDelivery {
    id: DeliveryId,
    message: Option<Message>,
    queue: Arc<QueueInner>,
    _permit: OwnedSemaphorePermit,
}

impl InMemoryDelivery {
    fn settle(&mut self) -> Option<Message> {
        let message = self.message.take();
        if message.is_some() {
            self.queue.unacked.fetch_sub(1, Ordering::SeqCst);
        }
        message
    }
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn id(&self) -> DeliveryId {
        self.id
    }

    fn payload(&self) -> &[u8] {
        self.message.as_ref().map(|m| m.payload.as_slice()).unwrap_or_default()
    }

    fn redelivered(&self) -> bool {
        self.message.as_ref().is_some_and(|m| m.redelivered)
    }

    async fn ack(mut self: Box<Self>) -> Result<(), KitchenError> {
        if self.settle().is_some() {
            self.queue.acked.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn nack(mut self: Box<Self>, requeue: bool) -> Result<(), KitchenError> {
        if let Some(message) = self.settle() {
            if requeue {
                self.queue.requeue(message);
            } else {
                self.queue
                    .dropped
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(message.payload);
            }
        }
        Ok(())
    }
}

impl Drop for InMemoryDelivery {
    fn drop(&mut self) {
        if let Some(message) = self.settle() {
            self.queue.requeue(message);
        }
    }
}

#[derive(Default)]
struct BrokerState {
    bindings: Vec<(String, Arc<QueueInner>)>,
    subscribers: Vec<Arc<QueueInner>>,
    published: Vec<StatusChangedEvent>,
    failing_publishes: u32,
}

/// InMemoryBroker owns every queue it creates.
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBroker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            clock,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn message(&self, payload: Vec<u8>) -> Message {
        Message {
            id: DeliveryId::generate(self.clock.now()),
            payload,
            redelivered: false,
        }
    }

    /// Bind a new queue to the order exchange.
    pub fn bind_order_queue(&self, pattern: impl Into<String>, prefetch: usize) -> InMemoryQueue {
        let inner = Arc::new(QueueInner::new(prefetch));
        self.state().bindings.push((pattern.into(), Arc::clone(&inner)));
        InMemoryQueue { inner }
    }

    /// Bind a new subscriber queue to the status fan-out.
    pub fn subscribe(&self, prefetch: usize) -> InMemoryQueue {
        let inner = Arc::new(QueueInner::new(prefetch));
        self.state().subscribers.push(Arc::clone(&inner));
        InMemoryQueue { inner }
    }

    /// Publish raw bytes to the order exchange. Returns how many queues matched.
    pub fn publish_order_raw(&self, routing_key: &str, payload: &[u8]) -> usize {
        let targets: Vec<Arc<QueueInner>> = self
            .state()
            .bindings
            .iter()
            .filter(|(pattern, _)| topic_matches(pattern, routing_key))
            .map(|(_, queue)| Arc::clone(queue))
            .collect();
        for queue in &targets {
            queue.push_back(self.message(payload.to_vec()));
        }
        targets.len()
    }

    /// Publish a work item with its `kitchen.<type>.<priority>` key.
    pub fn publish_order(&self, item: &OrderWorkItem) -> usize {
        self.publish_order_raw(&item.routing_key(), &item.encode())
    }

    /// Publish raw bytes on the status fan-out.
    pub fn broadcast_raw(&self, payload: &[u8]) {
        let subscribers = self.state().subscribers.clone();
        for queue in subscribers {
            queue.push_back(self.message(payload.to_vec()));
        }
    }

    /// Status events accepted by `publish`, in order.
    pub fn published_events(&self) -> Vec<StatusChangedEvent> {
        self.state().published.clone()
    }

    pub fn fail_next_publishes(&self, n: u32) {
        self.state().failing_publishes = n;
    }

    /// Close every queue; pending `next_delivery` calls return `None`.
    pub fn close(&self) {
        let state = self.state();
        for (_, queue) in &state.bindings {
            queue.close();
        }
        for queue in &state.subscribers {
            queue.close();
        }
    }
}

#[async_trait]
impl StatusBroadcaster for InMemoryBroker {
    async fn publish(&self, event: &StatusChangedEvent) -> Result<(), KitchenError> {
        let payload = event.encode()?;
        {
            let mut state = self.state();
            if state.failing_publishes > 0 {
                state.failing_publishes -= 1;
                return Err(KitchenError::broker("publish_status", "injected failure"));
            }
            state.published.push(event.clone());
        }
        self.broadcast_raw(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderStatus, OrderType, binding_key};
    use crate::ports::SystemClock;
    use std::time::Duration;

    fn broker() -> InMemoryBroker {
        InMemoryBroker::new(Arc::new(SystemClock))
    }

    fn item(order_type: OrderType) -> OrderWorkItem {
        OrderWorkItem {
            order_number: "A1".into(),
            customer_name: "Ada".into(),
            order_type,
            table_number: None,
            delivery_address: None,
            items: vec![],
            total_amount: 10.0,
            priority: 1,
        }
    }

    #[tokio::test]
    async fn orders_are_routed_by_type() {
        let broker = broker();
        let takeout = broker.bind_order_queue(binding_key(OrderType::Takeout), 1);
        let delivery = broker.bind_order_queue(binding_key(OrderType::Delivery), 1);

        assert_eq!(broker.publish_order(&item(OrderType::Takeout)), 1);
        assert_eq!(takeout.counts().ready, 1);
        assert_eq!(delivery.counts().ready, 0);
    }

    #[tokio::test]
    async fn prefetch_caps_unsettled_deliveries() {
        let broker = broker();
        let queue = broker.bind_order_queue("kitchen.#", 1);
        broker.publish_order(&item(OrderType::Takeout));
        broker.publish_order(&item(OrderType::Takeout));

        let first = queue.next_delivery().await.unwrap().unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.next_delivery()).await;
        assert!(blocked.is_err(), "second delivery must wait for a credit");

        first.ack().await.unwrap();
        let second = queue.next_delivery().await.unwrap().unwrap();
        second.ack().await.unwrap();
        assert_eq!(queue.counts().acked, 2);
    }

    #[tokio::test]
    async fn requeued_message_comes_back_flagged() {
        let broker = broker();
        let queue = broker.bind_order_queue("kitchen.#", 1);
        broker.publish_order(&item(OrderType::DineIn));

        let delivery = queue.next_delivery().await.unwrap().unwrap();
        assert!(!delivery.redelivered());
        let first_id = delivery.id();
        delivery.nack(true).await.unwrap();

        let again = queue.next_delivery().await.unwrap().unwrap();
        assert!(again.redelivered());
        assert_eq!(again.id(), first_id);
        again.nack(false).await.unwrap();

        let counts = queue.counts();
        assert_eq!(counts.requeued, 1);
        assert_eq!(counts.dropped, 1);
        assert_eq!(counts.ready, 0);
    }

    #[tokio::test]
    async fn unsettled_delivery_is_requeued_on_drop() {
        let broker = broker();
        let queue = broker.bind_order_queue("kitchen.#", 1);
        broker.publish_order(&item(OrderType::DineIn));

        drop(queue.next_delivery().await.unwrap().unwrap());
        assert_eq!(queue.counts().ready, 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let broker = broker();
        let a = broker.subscribe(10);
        let b = broker.subscribe(10);
        let event = StatusChangedEvent::new(
            "A1",
            OrderStatus::Received,
            OrderStatus::Cooking,
            "w1",
            chrono::Utc::now(),
        );
        broker.publish(&event).await.unwrap();

        for queue in [a, b] {
            let delivery = queue.next_delivery().await.unwrap().unwrap();
            assert_eq!(StatusChangedEvent::decode(delivery.payload()).unwrap(), event);
            delivery.ack().await.unwrap();
        }
    }

    #[tokio::test]
    async fn close_wakes_waiting_consumer() {
        let broker = Arc::new(broker());
        let queue = broker.bind_order_queue("kitchen.#", 1);
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.next_delivery().await.map(|d| d.is_none()) }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.close();
        assert!(waiter.await.unwrap().unwrap());
    }
}
