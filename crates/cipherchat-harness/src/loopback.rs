//! In-process handshake transport
//!
//! Every request and response is encoded to JSON and decoded again on the
//! other side, so the wire format is exercised exactly as over HTTP.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use cipherchat_client::{HandshakeTransport, TransportError};
use cipherchat_core::Environment;
use cipherchat_proto::{
    ConfirmRequest, ConfirmResponse, InitiateRequest, InitiateResponse, VulnerableInitiateRequest,
    VulnerableInitiateResponse, decode, encode,
};
use cipherchat_server::{Responder, ResponderError};
use serde::{Serialize, de::DeserializeOwned};

/// Connects a client directly to a [`Responder`].
pub struct LoopbackTransport<E: Environment> {
    responder: Arc<Responder<E>>,
    offline: AtomicBool,
}

impl<E: Environment> LoopbackTransport<E> {
    /// Transport delivering to `responder`.
    pub fn new(responder: Arc<Responder<E>>) -> Self {
        Self { responder, offline: AtomicBool::new(false) }
    }

    /// Responder on the far side.
    pub fn responder(&self) -> &Arc<Responder<E>> {
        &self.responder
    }

    /// Simulate the responder being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("responder offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Environment> HandshakeTransport for LoopbackTransport<E> {
    async fn initiate(&self, request: InitiateRequest) -> Result<InitiateResponse, TransportError> {
        self.check_online()?;
        let request = over_wire(&request)?;
        let response = self.responder.handle_initiate(&request).map_err(rejected)?;
        over_wire(&response)
    }

    async fn vulnerable_initiate(
        &self,
        request: VulnerableInitiateRequest,
    ) -> Result<VulnerableInitiateResponse, TransportError> {
        self.check_online()?;
        let request = over_wire(&request)?;
        let response = self.responder.handle_vulnerable_initiate(&request).map_err(rejected)?;
        over_wire(&response)
    }

    async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmResponse, TransportError> {
        self.check_online()?;
        let request = over_wire(&request)?;
        let response = self.responder.handle_confirm(&request).map_err(rejected)?;
        over_wire(&response)
    }
}

fn over_wire<T: Serialize + DeserializeOwned>(value: &T) -> Result<T, TransportError> {
    Ok(decode(&encode(value)?)?)
}

fn rejected(error: ResponderError) -> TransportError {
    TransportError::Remote { status: error.status().to_owned(), reason: error.to_string() }
}
