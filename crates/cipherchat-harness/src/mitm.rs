//! Active man-in-the-middle
//!
//! Sits between a client and a real transport and swaps ephemeral public
//! keys in flight. Against the unauthenticated variant this yields two
//! session keys the attacker shares with each side. Against the
//! authenticated variant the swap breaks a signature and the handshake
//! aborts.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use cipherchat_client::{HandshakeTransport, TransportError};
use cipherchat_core::{EnvRng, Environment};
use cipherchat_crypto::{EphemeralKeyPair, SessionKey, derive_session_key};
use cipherchat_proto::{
    ConfirmRequest, ConfirmResponse, InitiateRequest, InitiateResponse, VulnerableInitiateRequest,
    VulnerableInitiateResponse,
};
use tracing::warn;

/// Which ephemeral keys the attacker replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interception {
    /// Forward everything untouched
    Passive,
    /// Replace the client's key on the way to the responder
    ClientKey,
    /// Replace the responder's key on the way back to the client
    ServerKey,
    /// Replace both
    #[default]
    Both,
}

impl Interception {
    fn client_key(self) -> bool {
        matches!(self, Self::ClientKey | Self::Both)
    }

    fn server_key(self) -> bool {
        matches!(self, Self::ServerKey | Self::Both)
    }
}

/// Secrets the attacker managed to derive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intercepted {
    /// Key shared with the client
    pub client_session: Option<SessionKey>,
    /// Key shared with the responder
    pub server_session: Option<SessionKey>,
    /// Number of keys swapped
    pub substitutions: usize,
}

/// Key-substituting proxy in front of `T`.
pub struct MitmTransport<T: HandshakeTransport, E: Environment> {
    inner: Arc<T>,
    env: E,
    interception: Interception,
    intercepted: Mutex<Intercepted>,
}

impl<T: HandshakeTransport, E: Environment> MitmTransport<T, E> {
    /// Attacker relaying to `inner`, drawing its own keys from `env`.
    pub fn new(inner: Arc<T>, env: E, interception: Interception) -> Self {
        Self { inner, env, interception, intercepted: Mutex::new(Intercepted::default()) }
    }

    /// Snapshot of what the attacker holds.
    pub fn intercepted(&self) -> Intercepted {
        self.intercepted.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn ephemeral(&self) -> EphemeralKeyPair {
        EphemeralKeyPair::generate(&mut EnvRng::new(&self.env))
    }

    fn record(&self, update: impl FnOnce(&mut Intercepted)) {
        update(&mut self.intercepted.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Swap `client_key` for an attacker key. Returns the attacker half to
    /// finish against the responder's reply.
    fn swap_client_key(&self, client_key: &mut Vec<u8>) -> Option<EphemeralKeyPair> {
        if !self.interception.client_key() {
            return None;
        }
        let attacker = self.ephemeral();
        *client_key = attacker.public_key_bytes();
        self.record(|state| state.substitutions += 1);
        warn!("substituted client ephemeral key");
        Some(attacker)
    }

    /// Swap the responder's key for an attacker key agreed with the client.
    fn swap_server_key(
        &self,
        client_key: &[u8],
        server_key: &mut Option<Vec<u8>>,
    ) -> Result<(), TransportError> {
        if !self.interception.server_key() || server_key.is_none() {
            return Ok(());
        }
        let attacker = self.ephemeral();
        *server_key = Some(attacker.public_key_bytes());
        let shared = attacker
            .agree(client_key)
            .map_err(|e| TransportError::Malformed(format!("client key unusable: {e}")))?;
        self.record(|state| {
            state.client_session = Some(derive_session_key(&shared));
            state.substitutions += 1;
        });
        warn!("substituted responder ephemeral key");
        Ok(())
    }

    fn finish_with_server(
        &self,
        attacker: Option<EphemeralKeyPair>,
        server_key: Option<&[u8]>,
    ) -> Result<(), TransportError> {
        let (Some(attacker), Some(server_key)) = (attacker, server_key) else {
            return Ok(());
        };
        let shared = attacker
            .agree(server_key)
            .map_err(|e| TransportError::Malformed(format!("responder key unusable: {e}")))?;
        self.record(|state| state.server_session = Some(derive_session_key(&shared)));
        Ok(())
    }
}

#[async_trait]
impl<T: HandshakeTransport, E: Environment> HandshakeTransport for MitmTransport<T, E> {
    async fn initiate(
        &self,
        mut request: InitiateRequest,
    ) -> Result<InitiateResponse, TransportError> {
        let client_key = request.client_ephemeral_key.clone();
        let attacker = self.swap_client_key(&mut request.client_ephemeral_key);

        let mut response = self.inner.initiate(request).await?;
        self.finish_with_server(attacker, response.server_ephemeral_key.as_deref())?;
        self.swap_server_key(&client_key, &mut response.server_ephemeral_key)?;
        Ok(response)
    }

    async fn vulnerable_initiate(
        &self,
        mut request: VulnerableInitiateRequest,
    ) -> Result<VulnerableInitiateResponse, TransportError> {
        let client_key = request.client_ephemeral_key.clone();
        let attacker = self.swap_client_key(&mut request.client_ephemeral_key);

        let mut response = self.inner.vulnerable_initiate(request).await?;
        self.finish_with_server(attacker, response.server_ephemeral_key.as_deref())?;
        self.swap_server_key(&client_key, &mut response.server_ephemeral_key)?;
        Ok(response)
    }

    async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmResponse, TransportError> {
        self.inner.confirm(request).await
    }
}
