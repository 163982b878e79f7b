//! Redis list transport for the two task topics.
//!
//! Publishing is an `RPUSH` onto the topic key, so items from one publisher
//! arrive in FIFO order. Receiving uses the reliable-queue pattern: `BLMOVE`
//! pops the head into a per-consumer processing list, and `ack` removes the
//! payload from that list once the task's storage mutations are done. A crash
//! between the two leaves the payload parked in the processing list for
//! manual replay.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Direction};
use std::collections::HashMap;
use uuid::Uuid;

use super::{Publisher, QueueError, Receiver};
use crate::config::QueueConfig;
use crate::models::UrlQueueItem;

/// How long each BLMOVE blocks before the receive loop re-arms. Keeps the
/// receiver responsive to shutdown without busy-polling.
const POP_TIMEOUT_SECS: f64 = 1.0;

#[derive(Clone)]
pub struct RedisPublisher {
    conn: MultiplexedConnection,
    topic: String,
}

impl RedisPublisher {
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.conn_url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(RedisPublisher {
            conn,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn send(&self, item: &UrlQueueItem) -> Result<(), QueueError> {
        let payload = serde_json::to_string(item)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(&self.topic, payload).await?;
        Ok(())
    }
}

pub struct RedisReceiver {
    conn: MultiplexedConnection,
    topic: String,
    processing: String,
    /// Raw payloads of delivered-but-unacked tasks, keyed by the decoded
    /// task. `ack` must remove the exact bytes that were delivered.
    in_flight: HashMap<UrlQueueItem, String>,
}

impl RedisReceiver {
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.conn_url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        let consumer = Uuid::new_v4();
        Ok(RedisReceiver {
            conn,
            processing: format!("{}:processing:{}", config.topic, consumer),
            topic: config.topic.clone(),
            in_flight: HashMap::new(),
        })
    }
}

#[async_trait]
impl Receiver for RedisReceiver {
    async fn recv(&mut self) -> Result<UrlQueueItem, QueueError> {
        loop {
            let moved: Option<String> = self
                .conn
                .blmove(
                    &self.topic,
                    &self.processing,
                    Direction::Left,
                    Direction::Right,
                    POP_TIMEOUT_SECS,
                )
                .await?;

            let Some(payload) = moved else {
                continue;
            };

            match serde_json::from_str::<UrlQueueItem>(&payload) {
                Ok(item) => {
                    self.in_flight.insert(item.clone(), payload);
                    return Ok(item);
                }
                Err(e) => {
                    // A payload that doesn't decode can never be processed;
                    // drop it from the processing list and keep receiving.
                    tracing::error!(
                        topic = %self.topic,
                        error = %e,
                        payload = %payload,
                        "discarding undecodable task"
                    );
                    let _: i64 = self.conn.lrem(&self.processing, 1, payload).await?;
                }
            }
        }
    }

    async fn ack(&mut self, item: &UrlQueueItem) -> Result<(), QueueError> {
        let payload = match self.in_flight.remove(item) {
            Some(p) => p,
            None => serde_json::to_string(item)?,
        };
        let _: i64 = self.conn.lrem(&self.processing, 1, payload).await?;
        Ok(())
    }
}
