//! Chat session
//!
//! Binds a [`MessageTransport`] to a [`MessageChannel`]: outbound text and
//! files are sealed under the group key and published; inbound envelopes are
//! pulled from the subscription and opened one at a time.

use std::sync::Arc;

use cipherchat_core::{
    Environment, EstablishedSession, FileAttachment, MessageChannel, Opened, ReplayGuard,
    SessionSecurity,
};
use cipherchat_proto::ChatEnvelope;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{error::ChatError, transport::MessageTransport};

/// A participant's view of one chat.
pub struct ChatSession<E: Environment, M: MessageTransport> {
    env: E,
    channel: MessageChannel<E>,
    transport: Arc<M>,
    inbox: mpsc::Receiver<ChatEnvelope>,
    sender_id: String,
    sender_name: String,
}

impl<E: Environment, M: MessageTransport> ChatSession<E, M> {
    /// Join the chat with the keys from a completed handshake.
    ///
    /// The session key is dropped here; only the group key is kept.
    ///
    /// # Errors
    ///
    /// - `ChatError::NoGroupKey` for unauthenticated sessions
    /// - `ChatError::Transport` if subscribing fails
    pub async fn join(
        env: E,
        session: EstablishedSession,
        transport: Arc<M>,
        replay: Arc<ReplayGuard>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
    ) -> Result<Self, ChatError> {
        if session.security() != SessionSecurity::Authenticated {
            return Err(ChatError::NoGroupKey);
        }
        let (_, Some(group_key)) = session.into_keys() else {
            return Err(ChatError::NoGroupKey);
        };

        let inbox = transport.subscribe().await?;
        let sender_id = sender_id.into();
        info!(%sender_id, "joined chat");

        Ok(Self {
            channel: MessageChannel::new(env.clone(), group_key, replay),
            env,
            transport,
            inbox,
            sender_id,
            sender_name: sender_name.into(),
        })
    }

    /// Our user id.
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Encrypt and publish a text message. Returns the published envelope.
    ///
    /// # Errors
    ///
    /// `ChatError::Transport` if publishing fails.
    pub async fn send_text(&self, text: &str) -> Result<ChatEnvelope, ChatError> {
        let envelope = self.channel.seal_text(&self.sender_id, &self.sender_name, text);
        self.publish(envelope).await
    }

    /// Encrypt and publish a file. Returns the published envelope.
    ///
    /// # Errors
    ///
    /// `ChatError::Transport` if publishing fails.
    pub async fn send_file(&self, file: &FileAttachment) -> Result<ChatEnvelope, ChatError> {
        let envelope = self.channel.seal_file(&self.sender_id, &self.sender_name, file);
        self.publish(envelope).await
    }

    /// Wait for the next inbound envelope and open it.
    ///
    /// Returns `None` once the subscription is closed. Rejected and
    /// undecryptable envelopes are returned as items, never as errors.
    pub async fn next(&mut self) -> Option<Opened> {
        let envelope = self.inbox.recv().await?;
        Some(self.channel.open(&envelope, self.env.wall_clock_millis()))
    }

    /// Open an already received envelope (e.g. loaded from history).
    pub fn open(&self, envelope: &ChatEnvelope) -> Opened {
        self.channel.open(envelope, self.env.wall_clock_millis())
    }

    /// Leave the chat. The group key is zeroized as the session drops.
    pub fn clear(self) {
        info!(sender_id = %self.sender_id, "cleared chat session keys");
    }

    async fn publish(&self, envelope: ChatEnvelope) -> Result<ChatEnvelope, ChatError> {
        self.transport.publish(envelope.clone()).await?;
        debug!(nonce = %envelope.nonce, "published message");
        Ok(envelope)
    }
}
