use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::{Mutex, Notify};

use crate::{
    MessagingError, Result,
    broker::{Acknowledger, Broker, BrokerChannel, Delivery, DeliveryStream, OutgoingMessage},
};

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    Nack { requeue: bool },
}

/// A settlement recorded by the in-memory broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledDelivery {
    pub message_id: Option<String>,
    pub settlement: Settlement,
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    body: Vec<u8>,
    message_id: Option<String>,
    redelivered: bool,
}

#[derive(Default)]
struct State {
    published: Vec<OutgoingMessage>,
    queues: HashMap<String, VecDeque<QueuedMessage>>,
    settlements: Vec<SettledDelivery>,
    fail_connect: bool,
    stall_connect: bool,
    fail_publish: bool,
    fail_publish_ids: HashSet<String>,
    connections_opened: usize,
    channels_closed: usize,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    /// Bumped by `disconnect_all`; channels from an older generation are dead.
    generation: AtomicU64,
    notify: Notify,
}

/// In-memory broker for testing.
///
/// Queues are plain FIFO lists filled through [`InMemoryBroker::enqueue`].
/// Published messages are recorded rather than routed. Failures can be
/// injected for connecting and publishing, and every open channel can be
/// severed at once to simulate a lost connection.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    /// Creates a new broker with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message to a queue.
    pub async fn enqueue(&self, queue: &str, message_id: Option<&str>, body: impl Into<Vec<u8>>) {
        let message = QueuedMessage {
            body: body.into(),
            message_id: message_id.map(str::to_string),
            redelivered: false,
        };
        self.shared
            .state
            .lock()
            .await
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(message);
        self.shared.notify.notify_waiters();
    }

    /// Returns every message accepted by `publish`, in order.
    pub async fn published(&self) -> Vec<OutgoingMessage> {
        self.shared.state.lock().await.published.clone()
    }

    /// Returns every ACK and NACK, in order.
    pub async fn settlements(&self) -> Vec<SettledDelivery> {
        self.shared.state.lock().await.settlements.clone()
    }

    /// Returns the number of messages waiting in a queue.
    pub async fn queue_len(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .await
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// Makes `connect` fail until reset.
    pub async fn set_fail_connect(&self, fail: bool) {
        self.shared.state.lock().await.fail_connect = fail;
    }

    /// Makes `connect` never complete, like a broker host that drops packets.
    pub async fn set_stall_connect(&self, stall: bool) {
        self.shared.state.lock().await.stall_connect = stall;
    }

    /// Makes every publish fail until reset.
    pub async fn set_fail_publish(&self, fail: bool) {
        self.shared.state.lock().await.fail_publish = fail;
    }

    /// Makes publishing the given message id fail until reset.
    pub async fn fail_publish_for(&self, message_id: &str) {
        self.shared
            .state
            .lock()
            .await
            .fail_publish_ids
            .insert(message_id.to_string());
    }

    /// Lets the given message id publish again.
    pub async fn allow_publish_for(&self, message_id: &str) {
        self.shared
            .state
            .lock()
            .await
            .fail_publish_ids
            .remove(message_id);
    }

    /// Returns how many connections have been opened.
    pub async fn connections_opened(&self) -> usize {
        self.shared.state.lock().await.connections_opened
    }

    /// Returns how many channels were closed by their owner.
    pub async fn channels_closed(&self) -> usize {
        self.shared.state.lock().await.channels_closed
    }

    /// Severs every open channel and breaks their subscriptions.
    pub fn disconnect_all(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>> {
        let mut state = self.shared.state.lock().await;
        if state.stall_connect {
            drop(state);
            return std::future::pending().await;
        }
        if state.fail_connect {
            return Err(MessagingError::Connection(
                "connection refused (injected)".to_string(),
            ));
        }
        state.connections_opened += 1;

        Ok(Box::new(InMemoryChannel {
            shared: self.shared.clone(),
            generation: self.shared.generation.load(Ordering::SeqCst),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct InMemoryChannel {
    shared: Arc<Shared>,
    generation: u64,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.shared.generation.load(Ordering::SeqCst) == self.generation
    }

    async fn publish(&self, message: OutgoingMessage) -> Result<()> {
        if !self.is_open() {
            return Err(MessagingError::ChannelClosed);
        }

        let mut state = self.shared.state.lock().await;
        if state.fail_publish || state.fail_publish_ids.contains(&message.message_id) {
            return Err(MessagingError::Publish(format!(
                "broker rejected message {} (injected)",
                message.message_id
            )));
        }
        state.published.push(message);
        Ok(())
    }

    async fn consume(&self, queue: &str, _prefetch: u16) -> Result<DeliveryStream> {
        if !self.is_open() {
            return Err(MessagingError::ChannelClosed);
        }

        let queue = queue.to_string();
        let generation = self.generation;
        let closed = self.closed.clone();

        let deliveries = stream::unfold(Some(self.shared.clone()), move |shared| {
            let queue = queue.clone();
            let closed = closed.clone();
            async move {
                let shared = shared?;
                loop {
                    let notified = shared.notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    if closed.load(Ordering::SeqCst) {
                        return None;
                    }
                    if shared.generation.load(Ordering::SeqCst) != generation {
                        let err = MessagingError::Consume("connection lost".to_string());
                        return Some((Err(err), None));
                    }

                    let next = {
                        let mut state = shared.state.lock().await;
                        state.queues.get_mut(&queue).and_then(VecDeque::pop_front)
                    };
                    if let Some(message) = next {
                        let acker = MemoryAcker {
                            shared: shared.clone(),
                            queue: queue.clone(),
                            message: message.clone(),
                        };
                        let delivery = Delivery::new(
                            message.body,
                            message.message_id,
                            message.redelivered,
                            Box::new(acker),
                        );
                        return Some((Ok(delivery), Some(shared.clone())));
                    }

                    notified.await;
                }
            }
        });

        Ok(Box::pin(deliveries))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.state.lock().await.channels_closed += 1;
            self.shared.notify.notify_waiters();
        }
        Ok(())
    }
}

struct MemoryAcker {
    shared: Arc<Shared>,
    queue: String,
    message: QueuedMessage,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        self.shared
            .state
            .lock()
            .await
            .settlements
            .push(SettledDelivery {
                message_id: self.message.message_id.clone(),
                settlement: Settlement::Ack,
            });
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        state.settlements.push(SettledDelivery {
            message_id: self.message.message_id.clone(),
            settlement: Settlement::Nack { requeue },
        });
        if requeue {
            let mut message = self.message.clone();
            message.redelivered = true;
            state
                .queues
                .entry(self.queue.clone())
                .or_default()
                .push_back(message);
            drop(state);
            self.shared.notify.notify_waiters();
        }
        Ok(())
    }
}
