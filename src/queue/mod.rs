//! Queue abstraction: two logical topics (`url_queue`, `work_queue`) carrying
//! JSON-encoded [`UrlQueueItem`] tasks, consumed in competing-consumer mode.
//!
//! The send and receive capabilities are split into separate traits so a
//! process only holds the side it is entitled to use.

pub mod redis;

pub use self::redis::{RedisPublisher, RedisReceiver};

use async_trait::async_trait;

use crate::models::UrlQueueItem;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(#[from] ::redis::RedisError),
    #[error("failed to encode task: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Send half of a topic. May wait when the transport's outbound side is busy.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn send(&self, item: &UrlQueueItem) -> Result<(), QueueError>;
}

/// Receive half of a topic.
///
/// `recv` blocks until a task is available. The delivered task stays parked
/// on the transport until `ack` retires it: a consumer that dies mid-task
/// leaves the payload where an operator can find and replay it.
#[async_trait]
pub trait Receiver: Send {
    async fn recv(&mut self) -> Result<UrlQueueItem, QueueError>;
    async fn ack(&mut self, item: &UrlQueueItem) -> Result<(), QueueError>;
}
