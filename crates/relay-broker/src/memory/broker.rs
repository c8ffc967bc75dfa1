//! In-process broker state and the broker port implementation.

use super::topic_matches;
use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use parking_lot::Mutex;
use relay_core::{BrokerChannel, BrokerError, BrokerResult, Consumer, ConsumerTag, Delivery};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};

/// Queue name prefix the broker reserves for itself
const RESERVED_PREFIX: &str = "amq.";

/// Broker operations, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerOp {
    DeclareExchange,
    DeclareQueue,
    BindQueue,
    Consume,
    Publish,
    Ack,
    Cancel,
}

/// A message accepted by an exchange, as recorded in the journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct QueueState {
    /// Messages waiting for a consumer
    pending: VecDeque<Delivery>,
    consumers: Vec<ConsumerTag>,
    next_consumer: usize,
    /// Auto-delete only applies once a queue had a consumer
    had_consumer: bool,
}

struct ConsumerEntry {
    queue: String,
    sender: UnboundedSender<BrokerResult<Delivery>>,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashSet<String>,
    /// Exchange name to (queue, binding pattern) pairs
    bindings: HashMap<String, HashSet<(String, String)>>,
    queues: HashMap<String, QueueState>,
    consumers: HashMap<ConsumerTag, ConsumerEntry>,
    unacked: HashSet<u64>,
    failing: HashSet<BrokerOp>,
    /// Set once a channel exception closed the channel
    lost: Option<String>,

    // Journal
    published: Vec<PublishedMessage>,
    acked: Vec<u64>,
    cancelled: Vec<ConsumerTag>,
}

impl BrokerState {
    fn check(&self, op: BrokerOp) -> BrokerResult<()> {
        if self.lost.is_some() {
            return Err(BrokerError::Closed);
        }
        if self.failing.contains(&op) {
            return Err(BrokerError::Channel(format!("injected failure: {op:?}")));
        }
        Ok(())
    }

    /// Hand a delivery to the next live consumer of a queue, or park it
    fn enqueue(&mut self, queue: &str, delivery: Delivery) {
        let Some(state) = self.queues.get_mut(queue) else {
            return;
        };

        while !state.consumers.is_empty() {
            let index = state.next_consumer % state.consumers.len();
            state.next_consumer = state.next_consumer.wrapping_add(1);

            let sent = self
                .consumers
                .get(&state.consumers[index])
                .is_some_and(|entry| entry.sender.unbounded_send(Ok(delivery.clone())).is_ok());

            if sent {
                self.unacked.insert(delivery.delivery_tag);
                return;
            }

            // Receiver dropped without a cancel
            let tag = state.consumers.remove(index);
            self.consumers.remove(&tag);
        }

        state.pending.push_back(delivery);
    }

    fn remove_if_unused(&mut self, queue: &str) {
        let unused = self
            .queues
            .get(queue)
            .is_some_and(|state| state.had_consumer && state.consumers.is_empty());

        if unused {
            self.queues.remove(queue);
            for bindings in self.bindings.values_mut() {
                bindings.retain(|(bound, _)| bound != queue);
            }
            tracing::debug!(queue = %queue, "Auto-delete queue removed");
        }
    }
}

/// Topic broker living inside the process
///
/// Behaves like a single AMQP channel: exchanges are topic exchanges, queues
/// are auto-delete, deliveries stay unacknowledged until [`BrokerChannel::ack`].
/// Referencing a missing exchange or queue, declaring a reserved queue name or
/// acking an unknown tag closes the channel, after which every call fails.
/// Every publish, ack and cancel is journaled for inspection.
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    next_delivery_tag: AtomicU64,
    next_consumer_id: AtomicU64,
    consume_gate: Mutex<Option<Arc<Notify>>>,
    lost: watch::Sender<Option<String>>,
}

impl MemoryBroker {
    /// Create an empty broker
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            next_delivery_tag: AtomicU64::new(0),
            next_consumer_id: AtomicU64::new(0),
            consume_gate: Mutex::new(None),
            lost: watch::channel(None).0,
        }
    }

    /// Create an empty broker wrapped in Arc
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every subsequent call of `op` fail
    pub fn fail_on(&self, op: BrokerOp) {
        self.state.lock().failing.insert(op);
    }

    /// Stop failing `op`
    pub fn recover(&self, op: BrokerOp) {
        self.state.lock().failing.remove(&op);
    }

    /// Hold every subsequent consume call until a permit is released on the returned handle
    ///
    /// Each `notify_one` lets exactly one pending or future consume call proceed.
    pub fn gate_consume(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.consume_gate.lock() = Some(gate.clone());
        gate
    }

    /// Close the channel as the broker would after a channel exception
    pub fn close_channel(&self, reason: &str) {
        let mut state = self.state.lock();
        self.lose_channel(&mut state, reason.to_string());
    }

    /// Check if the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().lost.is_some()
    }

    /// All messages accepted by an exchange, in publish order
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().published.clone()
    }

    /// Acknowledged delivery tags, in ack order
    pub fn acked(&self) -> Vec<u64> {
        self.state.lock().acked.clone()
    }

    /// Every cancel request received, including repeated or unknown tags
    pub fn cancelled(&self) -> Vec<ConsumerTag> {
        self.state.lock().cancelled.clone()
    }

    /// Check if an exchange has been declared
    pub fn has_exchange(&self, exchange: &str) -> bool {
        self.state.lock().exchanges.contains(exchange)
    }

    /// Check if a queue currently exists
    pub fn has_queue(&self, queue: &str) -> bool {
        self.state.lock().queues.contains_key(queue)
    }

    /// Bindings of an exchange as sorted (queue, pattern) pairs
    pub fn bindings(&self, exchange: &str) -> Vec<(String, String)> {
        let mut bindings: Vec<(String, String)> = self
            .state
            .lock()
            .bindings
            .get(exchange)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();
        bindings.sort();
        bindings
    }

    /// Number of active consumers on a queue
    pub fn consumer_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.consumers.len())
    }

    /// Number of active consumers across all queues
    pub fn total_consumers(&self) -> usize {
        self.state.lock().consumers.len()
    }

    /// Number of messages parked on a queue without a consumer
    pub fn pending_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.pending.len())
    }

    /// Number of deliveries handed out but not yet acknowledged
    pub fn unacked_count(&self) -> usize {
        self.state.lock().unacked.len()
    }

    fn next_delivery_tag(&self) -> u64 {
        self.next_delivery_tag.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Raise a channel exception: the call fails and the channel is gone
    fn channel_exception(&self, state: &mut BrokerState, err: BrokerError) -> BrokerError {
        self.lose_channel(state, err.to_string());
        err
    }

    fn lose_channel(&self, state: &mut BrokerState, reason: String) {
        if state.lost.is_some() {
            return;
        }
        tracing::warn!(reason = %reason, "Channel closed by broker");

        // Consumers go with the channel, so their auto-delete queues do too
        for (_, entry) in state.consumers.drain() {
            let _ = entry.sender.unbounded_send(Err(BrokerError::Closed));
        }
        let queues: Vec<String> = state.queues.keys().cloned().collect();
        for queue in &queues {
            if let Some(queue_state) = state.queues.get_mut(queue) {
                queue_state.consumers.clear();
            }
            state.remove_if_unused(queue);
        }

        state.lost = Some(reason.clone());
        self.lost.send_replace(Some(reason));
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryBroker")
            .field("exchanges", &state.exchanges.len())
            .field("queues", &state.queues.len())
            .field("consumers", &state.consumers.len())
            .field("unacked", &state.unacked.len())
            .finish()
    }
}

#[async_trait]
impl BrokerChannel for MemoryBroker {
    async fn declare_exchange(&self, exchange: &str) -> BrokerResult<()> {
        let mut state = self.state.lock();
        state.check(BrokerOp::DeclareExchange)?;
        state.exchanges.insert(exchange.to_string());
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> BrokerResult<()> {
        let mut state = self.state.lock();
        state.check(BrokerOp::DeclareQueue)?;

        if queue.starts_with(RESERVED_PREFIX) {
            let err = BrokerError::Channel(format!(
                "ACCESS_REFUSED - queue name '{queue}' contains reserved prefix"
            ));
            return Err(self.channel_exception(&mut state, err));
        }

        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> BrokerResult<()> {
        let mut state = self.state.lock();
        state.check(BrokerOp::BindQueue)?;

        if !state.exchanges.contains(exchange) {
            let err = BrokerError::ExchangeNotFound(exchange.to_string());
            return Err(self.channel_exception(&mut state, err));
        }
        if !state.queues.contains_key(queue) {
            let err = BrokerError::QueueNotFound(queue.to_string());
            return Err(self.channel_exception(&mut state, err));
        }

        state
            .bindings
            .entry(exchange.to_string())
            .or_default()
            .insert((queue.to_string(), routing_key.to_string()));

        Ok(())
    }

    async fn consume(&self, queue: &str) -> BrokerResult<Consumer> {
        let gate = self.consume_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock();
        state.check(BrokerOp::Consume)?;

        if !state.queues.contains_key(queue) {
            let err = BrokerError::QueueNotFound(queue.to_string());
            return Err(self.channel_exception(&mut state, err));
        }

        let id = self.next_consumer_id.fetch_add(1, Ordering::SeqCst) + 1;
        let tag = ConsumerTag::new(format!("mem-{queue}-{id}"));
        let (sender, receiver) = mpsc::unbounded();

        let Some(queue_state) = state.queues.get_mut(queue) else {
            return Err(BrokerError::QueueNotFound(queue.to_string()));
        };

        queue_state.consumers.push(tag.clone());
        queue_state.had_consumer = true;

        let parked: Vec<Delivery> = queue_state.pending.drain(..).collect();
        state.consumers.insert(
            tag.clone(),
            ConsumerEntry {
                queue: queue.to_string(),
                sender,
            },
        );
        for delivery in parked {
            state.enqueue(queue, delivery);
        }

        tracing::trace!(queue = %queue, consumer_tag = %tag, "Consumer registered");

        Ok(Consumer::new(tag, receiver.boxed()))
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> BrokerResult<()> {
        let mut state = self.state.lock();
        state.check(BrokerOp::Publish)?;

        if !state.exchanges.contains(exchange) {
            let err = BrokerError::ExchangeNotFound(exchange.to_string());
            return Err(self.channel_exception(&mut state, err));
        }

        state.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
        });

        let targets: HashSet<String> = state
            .bindings
            .get(exchange)
            .map(|bindings| {
                bindings
                    .iter()
                    .filter(|(_, pattern)| topic_matches(pattern, routing_key))
                    .map(|(queue, _)| queue.clone())
                    .collect()
            })
            .unwrap_or_default();

        for queue in targets {
            let delivery = Delivery {
                delivery_tag: self.next_delivery_tag(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                redelivered: false,
                data: payload.to_vec(),
            };
            state.enqueue(&queue, delivery);
        }

        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()> {
        let mut state = self.state.lock();
        state.check(BrokerOp::Ack)?;

        if !state.unacked.remove(&delivery_tag) {
            let err = BrokerError::UnknownDelivery(delivery_tag);
            return Err(self.channel_exception(&mut state, err));
        }
        state.acked.push(delivery_tag);
        Ok(())
    }

    async fn cancel(&self, consumer_tag: &ConsumerTag) -> BrokerResult<()> {
        let mut state = self.state.lock();
        state.check(BrokerOp::Cancel)?;
        state.cancelled.push(consumer_tag.clone());

        // Unknown tags are a no-op, as on a real broker
        if let Some(entry) = state.consumers.remove(consumer_tag) {
            if let Some(queue) = state.queues.get_mut(&entry.queue) {
                queue.consumers.retain(|tag| tag != consumer_tag);
            }
            state.remove_if_unused(&entry.queue);
            tracing::trace!(consumer_tag = %consumer_tag, "Consumer cancelled");
        }

        Ok(())
    }

    async fn closed(&self) -> BrokerError {
        let mut lost = self.lost.subscribe();
        let reason = match lost.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        reason.map_or(BrokerError::Closed, BrokerError::Lost)
    }
}
