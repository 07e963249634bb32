//! # QueueChannel: buffered point-to-point channel.
//!
//! Messages are stored in FIFO order and handed to exactly one receiver.
//!
//! ## Architecture
//! ```text
//! send() ──► acquire space permit ──► [VecDeque] ──► add item permit
//!                (bounded only)                          │
//! receive() ◄── pop_front ◄───────── acquire item permit ┘
//! ```
//!
//! ## Rules
//! - **FIFO**: receivers get messages in the order sends completed.
//! - **Capacity**: with `queue_capacity = n > 0`, `send` waits while `n` messages are queued.
//! - **Fairness**: waiting senders and receivers are served in arrival order (tokio semaphores are fair).

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::channels::{MessageChannel, PollableChannel};
use crate::config::ChannelConfig;
use crate::error::SendError;
use crate::message::Message;

/// Buffered FIFO channel, optionally bounded.
pub struct QueueChannel<T> {
    name: String,
    queue: Mutex<VecDeque<Message<T>>>,
    /// One permit per queued message.
    items: Semaphore,
    /// One permit per free slot; `None` when unbounded.
    space: Option<Semaphore>,
    capacity: Option<usize>,
    send_timeout: Option<Duration>,
}

impl<T: Send + 'static> QueueChannel<T> {
    /// Creates an unbounded queue channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, &ChannelConfig::default())
    }

    /// Creates a queue holding at most `capacity` messages (`0` = unbounded).
    pub fn bounded(name: impl Into<String>, capacity: usize) -> Self {
        let cfg = ChannelConfig {
            queue_capacity: capacity,
            ..ChannelConfig::default()
        };
        Self::with_config(name, &cfg)
    }

    /// Creates a queue channel from configuration.
    ///
    /// Uses `queue_capacity` and `send_timeout`.
    pub fn with_config(name: impl Into<String>, cfg: &ChannelConfig) -> Self {
        let capacity = cfg.queue_limit();
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            items: Semaphore::new(0),
            space: capacity.map(Semaphore::new),
            capacity,
            send_timeout: cfg.send_deadline(),
        }
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if no message is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Free slots left, or `None` when unbounded.
    pub fn remaining_capacity(&self) -> Option<usize> {
        self.capacity.map(|cap| cap.saturating_sub(self.len()))
    }

    /// Removes every queued message and returns them in FIFO order.
    pub fn clear(&self) -> Vec<Message<T>> {
        let drained: Vec<_> = self.lock().drain(..).collect();
        for _ in 0..drained.len() {
            if let Ok(permit) = self.items.try_acquire() {
                permit.forget();
            }
        }
        if let Some(space) = &self.space {
            space.add_permits(drained.len());
        }
        drained
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Message<T>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enqueue(&self, message: Message<T>, timeout: Option<Duration>) -> Result<(), SendError> {
        if let Some(space) = &self.space {
            let acquired = match timeout {
                Some(dur) => tokio::time::timeout(dur, space.acquire())
                    .await
                    .map_err(|_| SendError::Timeout {
                        channel: self.name.as_str().into(),
                        timeout: dur,
                    })?,
                None => space.acquire().await,
            };
            // The semaphores are never closed.
            let Ok(permit) = acquired else {
                return Err(SendError::Closed {
                    channel: self.name.as_str().into(),
                });
            };
            permit.forget();
        }
        self.lock().push_back(message);
        self.items.add_permits(1);
        Ok(())
    }

    fn dequeue(&self) -> Option<Message<T>> {
        let message = self.lock().pop_front()?;
        if let Some(space) = &self.space {
            space.add_permits(1);
        }
        Some(message)
    }

    async fn next(&self) -> Message<T> {
        loop {
            // Permits track queued messages; `clear` may race a waiting receiver.
            if let Ok(permit) = self.items.acquire().await {
                permit.forget();
            }
            if let Some(message) = self.dequeue() {
                return message;
            }
        }
    }
}

#[async_trait]
impl<T: Send + 'static> MessageChannel<T> for QueueChannel<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: Message<T>) -> Result<(), SendError> {
        self.enqueue(message, self.send_timeout).await
    }

    async fn send_timeout(&self, message: Message<T>, timeout: Duration) -> Result<(), SendError> {
        self.enqueue(message, Some(timeout)).await
    }
}

#[async_trait]
impl<T: Send + 'static> PollableChannel<T> for QueueChannel<T> {
    async fn receive(&self, timeout: Option<Duration>) -> Option<Message<T>> {
        match timeout {
            Some(dur) => tokio::time::timeout(dur, self.next()).await.ok(),
            None => Some(self.next().await),
        }
    }

    fn try_receive(&self) -> Option<Message<T>> {
        let permit = self.items.try_acquire().ok()?;
        permit.forget();
        self.dequeue()
    }
}
