//! In-process pub/sub for chat envelopes

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use cipherchat_client::{MessageTransport, TransportError};
use cipherchat_proto::{ChatEnvelope, decode, encode};
use tokio::sync::mpsc;

/// Per-subscriber queue depth
pub const SUBSCRIBER_CAPACITY: usize = 64;

/// Fans every published envelope out to all live subscribers.
///
/// Envelopes are JSON round-tripped on publish. Everything ever published
/// is kept so tests can replay it.
#[derive(Default)]
pub struct PubSubHub {
    subscribers: Mutex<Vec<mpsc::Sender<ChatEnvelope>>>,
    history: Mutex<Vec<ChatEnvelope>>,
}

impl PubSubHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes published so far, oldest first.
    pub fn history(&self) -> Vec<ChatEnvelope> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Live subscriber count.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

#[async_trait]
impl MessageTransport for PubSubHub {
    async fn publish(&self, envelope: ChatEnvelope) -> Result<(), TransportError> {
        let envelope: ChatEnvelope = decode(&encode(&envelope)?)?;
        self.history.lock().unwrap_or_else(PoisonError::into_inner).push(envelope.clone());

        let subscribers = {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers.retain(|tx| !tx.is_closed());
            subscribers.clone()
        };
        for tx in subscribers {
            // A subscriber dropping mid-publish is not the publisher's problem
            let _ = tx.send(envelope.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ChatEnvelope>, TransportError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
        Ok(rx)
    }
}
