//! One responder, one chat hub, any number of clients

use std::sync::Arc;

use cipherchat_client::{ChatError, ChatSession, HandshakeConfig, HandshakeCoordinator};
use cipherchat_core::{
    EstablishedSession, Environment, KeyValueStore, ReplayGuard, ReplayGuardConfig,
};
use cipherchat_server::{Responder, ResponderConfig, ResponderError};

use crate::{hub::PubSubHub, loopback::LoopbackTransport};

/// A responder reachable over loopback plus a shared message hub.
pub struct World<E: Environment> {
    env: E,
    responder: Arc<Responder<E>>,
    transport: Arc<LoopbackTransport<E>>,
    hub: Arc<PubSubHub>,
}

impl<E: Environment> World<E> {
    /// Start a responder with a fresh identity and group key.
    ///
    /// # Errors
    ///
    /// `ResponderError::Setup` if key generation fails.
    pub fn new(env: E, config: ResponderConfig) -> Result<Self, ResponderError> {
        let responder = Arc::new(Responder::new(env.clone(), config)?);
        Ok(Self {
            transport: Arc::new(LoopbackTransport::new(Arc::clone(&responder))),
            env,
            responder,
            hub: Arc::new(PubSubHub::new()),
        })
    }

    /// Shared environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// The responder.
    pub fn responder(&self) -> &Arc<Responder<E>> {
        &self.responder
    }

    /// Loopback transport to the responder.
    pub fn transport(&self) -> &Arc<LoopbackTransport<E>> {
        &self.transport
    }

    /// Chat hub.
    pub fn hub(&self) -> &Arc<PubSubHub> {
        &self.hub
    }

    /// Coordinator talking to the responder directly, with the responder's
    /// identity pinned.
    pub fn coordinator<S: KeyValueStore>(
        &self,
        store: S,
        config: HandshakeConfig,
    ) -> HandshakeCoordinator<S, E, LoopbackTransport<E>> {
        let config = HandshakeConfig {
            responder_identity: Some(self.responder.identity().clone()),
            ..config
        };
        HandshakeCoordinator::new(self.env.clone(), store, Arc::clone(&self.transport), config)
    }

    /// Join the hub with a completed session and a fresh replay guard.
    ///
    /// # Errors
    ///
    /// `ChatError::NoGroupKey` for unauthenticated sessions.
    pub async fn join(
        &self,
        session: EstablishedSession,
        user_id: &str,
        display_name: &str,
    ) -> Result<ChatSession<E, PubSubHub>, ChatError> {
        let replay = Arc::new(ReplayGuard::new(ReplayGuardConfig::default()));
        ChatSession::join(
            self.env.clone(),
            session,
            Arc::clone(&self.hub),
            replay,
            user_id,
            display_name,
        )
        .await
    }
}
