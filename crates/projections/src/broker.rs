//! Message delivery abstraction and an in-process at-least-once broker.
//!
//! Consumers receive [`Delivery`] values from a [`MessageSource`] and must
//! settle each one with [`Delivery::ack`] or [`Delivery::nack`]. A nacked
//! message is delivered again later, possibly after messages published
//! after it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

/// Default number of redeliveries before a message is dead-lettered.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 16;

/// Delay before the first redelivery of a nacked message.
pub const DEFAULT_REDELIVERY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Upper bound on the delay between two redeliveries.
pub const DEFAULT_REDELIVERY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Exponential delay applied before a nacked message is requeued.
///
/// The delay doubles with every redelivery, starting at `base` and capped
/// at `max`, so the default cap of 16 redeliveries spans close to a minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl RedeliveryBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before delivering a message that failed on `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1 << exponent).min(self.max)
    }
}

impl Default for RedeliveryBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_REDELIVERY_BASE_DELAY, DEFAULT_REDELIVERY_MAX_DELAY)
    }
}

/// Errors raised by the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The queue has no live consumer side any more.
    #[error("Queue closed: {0}")]
    QueueClosed(String),

    /// Someone already holds the consumer for this queue.
    #[error("Queue already has a consumer: {0}")]
    AlreadySubscribed(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// A message as stored on a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub queue: String,
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

/// Settles deliveries with the broker that produced them.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Marks the message as processed.
    async fn ack(&self, message: &Message) -> Result<()>;

    /// Returns the message to the broker for redelivery.
    async fn nack(&self, message: Message) -> Result<()>;
}

/// A message handed to a consumer, together with the handle to settle it.
pub struct Delivery {
    message: Message,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    /// Wraps a message with the acknowledger that settles it.
    pub fn new(message: Message, acker: Arc<dyn Acknowledger>) -> Self {
        Self { message, acker }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    /// Acknowledges the message; it will not be delivered again.
    pub async fn ack(self) -> Result<()> {
        self.acker.ack(&self.message).await
    }

    /// Rejects the message so the broker delivers it again.
    pub async fn nack(self) -> Result<()> {
        self.acker.nack(self.message).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// A stream of deliveries from one queue.
#[async_trait]
pub trait MessageSource: Send {
    /// Waits for the next delivery. Returns None once the queue is closed.
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose a message.
    async fn recv(&mut self) -> Option<Delivery>;
}

struct QueueState {
    tx: mpsc::UnboundedSender<Message>,
    rx: Option<mpsc::UnboundedReceiver<Message>>,
    dead_letters: Arc<Mutex<Vec<Message>>>,
}

impl QueueState {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Some(rx),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// In-process broker with named queues and at-least-once delivery.
///
/// Each queue has exactly one consumer. Nacked messages go to the back of
/// their queue with an incremented attempt counter once their
/// [`RedeliveryBackoff`] delay has passed; after `max_redeliveries` they are
/// moved to the queue's dead letters instead.
#[derive(Clone)]
pub struct InMemoryBroker {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
    max_redeliveries: u32,
    backoff: RedeliveryBackoff,
}

impl InMemoryBroker {
    /// Creates a broker with the default redelivery cap.
    pub fn new() -> Self {
        Self::with_max_redeliveries(DEFAULT_MAX_REDELIVERIES)
    }

    /// Creates a broker that dead-letters a message after `max` redeliveries.
    pub fn with_max_redeliveries(max: u32) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            max_redeliveries: max,
            backoff: RedeliveryBackoff::default(),
        }
    }

    /// Replaces the delay schedule applied to nacked messages.
    pub fn with_backoff(mut self, backoff: RedeliveryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Publishes `payload` to `queue`, creating the queue if needed.
    #[tracing::instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<Uuid> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .entry(queue.to_string())
            .or_insert_with(QueueState::new);

        let id = Uuid::new_v4();
        state
            .tx
            .send(Message {
                id,
                queue: queue.to_string(),
                payload,
                attempt: 1,
            })
            .map_err(|_| BrokerError::QueueClosed(queue.to_string()))?;

        tracing::trace!(message_id = %id, "published");
        Ok(id)
    }

    /// Takes the consumer side of `queue`, creating the queue if needed.
    pub async fn subscribe(&self, queue: &str) -> Result<QueueConsumer> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .entry(queue.to_string())
            .or_insert_with(QueueState::new);

        let rx = state
            .rx
            .take()
            .ok_or_else(|| BrokerError::AlreadySubscribed(queue.to_string()))?;

        let acker = Arc::new(QueueAcker {
            tx: state.tx.clone(),
            dead_letters: Arc::clone(&state.dead_letters),
            max_redeliveries: self.max_redeliveries,
            backoff: self.backoff,
        });

        Ok(QueueConsumer { rx, acker })
    }

    /// Returns the messages dead-lettered on `queue`.
    pub async fn dead_letters(&self, queue: &str) -> Vec<Message> {
        let dead_letters = {
            let queues = self.queues.lock().await;
            match queues.get(queue) {
                Some(state) => Arc::clone(&state.dead_letters),
                None => return Vec::new(),
            }
        };
        dead_letters.lock().await.clone()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

struct QueueAcker {
    tx: mpsc::UnboundedSender<Message>,
    dead_letters: Arc<Mutex<Vec<Message>>>,
    max_redeliveries: u32,
    backoff: RedeliveryBackoff,
}

#[async_trait]
impl Acknowledger for QueueAcker {
    async fn ack(&self, message: &Message) -> Result<()> {
        tracing::trace!(message_id = %message.id, queue = %message.queue, "acked");
        Ok(())
    }

    async fn nack(&self, mut message: Message) -> Result<()> {
        if message.attempt > self.max_redeliveries {
            tracing::error!(
                message_id = %message.id,
                queue = %message.queue,
                attempts = message.attempt,
                "redelivery limit reached, dead-lettering message"
            );
            self.dead_letters.lock().await.push(message);
            return Ok(());
        }

        if self.tx.is_closed() {
            return Err(BrokerError::QueueClosed(message.queue));
        }

        let delay = self.backoff.delay(message.attempt);
        message.attempt += 1;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(mpsc::error::SendError(message)) = tx.send(message) {
                tracing::warn!(
                    message_id = %message.id,
                    queue = %message.queue,
                    "queue closed before redelivery, message lost"
                );
            }
        });
        tracing::debug!(delay_ms = delay.as_millis() as u64, "redelivery scheduled");
        Ok(())
    }
}

/// Consumer side of one [`InMemoryBroker`] queue.
pub struct QueueConsumer {
    rx: mpsc::UnboundedReceiver<Message>,
    acker: Arc<QueueAcker>,
}

#[async_trait]
impl MessageSource for QueueConsumer {
    async fn recv(&mut self) -> Option<Delivery> {
        let message = self.rx.recv().await?;
        let acker: Arc<dyn Acknowledger> = self.acker.clone();
        Some(Delivery::new(message, acker))
    }
}
