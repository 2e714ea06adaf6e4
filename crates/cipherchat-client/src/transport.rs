//! Transport seams
//!
//! The coordinator and chat session never open connections themselves; the
//! caller injects an explicit transport object. Implementations may be HTTP
//! clients, in-process loopbacks or test doubles.

use async_trait::async_trait;
use cipherchat_proto::{
    ChatEnvelope, ConfirmRequest, ConfirmResponse, InitiateRequest, InitiateResponse,
    VulnerableInitiateRequest, VulnerableInitiateResponse,
};
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Remote handshake endpoints
#[async_trait]
pub trait HandshakeTransport: Send + Sync + 'static {
    /// `POST initiate`
    async fn initiate(&self, request: InitiateRequest) -> Result<InitiateResponse, TransportError>;

    /// `POST vulnerable-initiate`
    async fn vulnerable_initiate(
        &self,
        request: VulnerableInitiateRequest,
    ) -> Result<VulnerableInitiateResponse, TransportError>;

    /// `POST confirm`
    async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmResponse, TransportError>;
}

/// Publish/subscribe carrier for chat envelopes
#[async_trait]
pub trait MessageTransport: Send + Sync + 'static {
    /// Publish an envelope to every subscriber (including the sender).
    async fn publish(&self, envelope: ChatEnvelope) -> Result<(), TransportError>;

    /// Start receiving envelopes published after this call.
    async fn subscribe(&self) -> Result<mpsc::Receiver<ChatEnvelope>, TransportError>;
}
