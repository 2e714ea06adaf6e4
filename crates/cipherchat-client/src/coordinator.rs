//! Handshake coordinator
//!
//! Drives the sans-IO [`Handshake`] over an injected [`HandshakeTransport`].
//! The coordinator owns everything the state machine cannot: the identity
//! key store, remote calls, timeouts, cancellation and single-flight.
//!
//! # Invariants
//!
//! - At most one attempt runs per user id; a second `establish` for the same
//!   id fails with `AlreadyInProgress` while the first is running.
//! - A cancelled or timed-out attempt never acts on a late response: the
//!   pending remote call is dropped before the state machine sees it.
//! - Every failure returns the state machine to `Idle` and discards the
//!   attempt's ephemeral and session keys.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use cipherchat_core::{
    EnvRng, Environment, EstablishedSession, Handshake, HandshakeError, HandshakeMode,
    IdentityKeyStore, IdentityKeys, KeyStoreError, KeyValueStore,
};
use cipherchat_crypto::{EphemeralKeyPair, IV_SIZE, IdentityAlgorithm, IdentityPublicKey};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::{error::TransportError, event::HandshakeEvent, transport::HandshakeTransport};

/// Default timeout for each remote handshake call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 64;

/// Handshake configuration
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Variant to run. `Vulnerable` additionally requires the
    /// `insecure-demo` feature.
    pub mode: HandshakeMode,
    /// Timeout for each remote call
    pub request_timeout: Duration,
    /// Algorithm for newly generated identity keys
    pub identity_algorithm: IdentityAlgorithm,
    /// Pinned responder identity. When set, the responder's ephemeral key
    /// must carry its signature.
    pub responder_identity: Option<IdentityPublicKey>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            mode: HandshakeMode::Secure,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            identity_algorithm: IdentityAlgorithm::EcdsaP256,
            responder_identity: None,
        }
    }
}

/// Runs handshake attempts for any number of identities.
pub struct HandshakeCoordinator<S: KeyValueStore, E: Environment, T: HandshakeTransport> {
    env: E,
    transport: Arc<T>,
    keys: Arc<IdentityKeyStore<S, E>>,
    config: HandshakeConfig,
    /// user id -> cancellation flag of the running attempt
    in_flight: Mutex<HashMap<String, watch::Sender<bool>>>,
    events: broadcast::Sender<HandshakeEvent>,
}

impl<S: KeyValueStore, E: Environment, T: HandshakeTransport> HandshakeCoordinator<S, E, T> {
    /// Create a coordinator persisting identities in `store`.
    pub fn new(env: E, store: S, transport: Arc<T>, config: HandshakeConfig) -> Self {
        let keys = Arc::new(IdentityKeyStore::new(store, env.clone(), config.identity_algorithm));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { env, transport, keys, config, in_flight: Mutex::new(HashMap::new()), events }
    }

    /// Subscribe to transition, success and failure events.
    pub fn subscribe(&self) -> broadcast::Receiver<HandshakeEvent> {
        self.events.subscribe()
    }

    /// Identity key store used by this coordinator.
    pub fn identity_store(&self) -> &Arc<IdentityKeyStore<S, E>> {
        &self.keys
    }

    /// Active configuration.
    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Whether an attempt for `user_id` is running.
    pub fn is_in_progress(&self, user_id: &str) -> bool {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).contains_key(user_id)
    }

    /// Abandon the running attempt for `user_id`, if any.
    ///
    /// The attempt resolves with `HandshakeError::Cancelled` at its next
    /// suspension point. Returns whether an attempt was running.
    pub fn cancel(&self, user_id: &str) -> bool {
        let in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        match in_flight.get(user_id) {
            Some(flag) => {
                flag.send_replace(true);
                info!(user_id, "handshake cancellation requested");
                true
            },
            None => false,
        }
    }

    /// Run one handshake attempt for `user_id`.
    ///
    /// Loads or generates the identity, performs the remote round trips and
    /// returns the established keys. No retry is attempted.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::AlreadyInProgress` if an attempt for `user_id` is
    ///   running
    /// - `HandshakeError::InsecureModeDisabled` for `Vulnerable` mode without
    ///   the `insecure-demo` feature
    /// - any other `HandshakeError` aborts the attempt; see its variants
    pub async fn establish(&self, user_id: &str) -> Result<EstablishedSession, HandshakeError> {
        let (_in_flight, mut cancel) = self.acquire(user_id)?;

        let mut handshake = Handshake::new(self.config.mode);
        if let Some(responder) = &self.config.responder_identity {
            handshake = handshake.with_responder_identity(responder.clone());
        }
        info!(user_id, mode = ?self.config.mode, "starting handshake");

        match self.drive(&mut handshake, user_id, &mut cancel).await {
            Ok(session) => {
                self.publish_transitions(user_id, &mut handshake);
                info!(user_id, security = ?session.security(), "handshake established");
                self.emit(HandshakeEvent::Established {
                    user_id: user_id.to_owned(),
                    security: session.security(),
                });
                Ok(session)
            },
            Err(error) => {
                handshake.fail();
                self.publish_transitions(user_id, &mut handshake);
                warn!(user_id, %error, "handshake aborted");
                self.emit(HandshakeEvent::Failed {
                    user_id: user_id.to_owned(),
                    error: error.clone(),
                });
                Err(error)
            },
        }
    }

    async fn drive(
        &self,
        handshake: &mut Handshake,
        user_id: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<EstablishedSession, HandshakeError> {
        handshake.begin()?;
        self.publish_transitions(user_id, handshake);

        match handshake.mode() {
            HandshakeMode::Secure => self.drive_secure(handshake, user_id, cancel).await?,
            #[cfg(feature = "insecure-demo")]
            HandshakeMode::Vulnerable => self.drive_vulnerable(handshake, user_id, cancel).await?,
            #[cfg(not(feature = "insecure-demo"))]
            HandshakeMode::Vulnerable => return Err(HandshakeError::InsecureModeDisabled),
        }

        handshake.finish()
    }

    async fn drive_secure(
        &self,
        handshake: &mut Handshake,
        user_id: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), HandshakeError> {
        let identity = cancellable(cancel, self.load_identity(user_id)).await?;

        let ephemeral = EphemeralKeyPair::generate(&mut EnvRng::new(&self.env));
        let request = handshake.initiate(
            identity.keypair(),
            ephemeral,
            self.env.random_uuid(),
            self.env.wall_clock_millis(),
            &mut EnvRng::new(&self.env),
        )?;
        self.publish_transitions(user_id, handshake);

        let response = self.remote(cancel, self.transport.initiate(request)).await?;
        handshake.receive_initiate_response(response)?;
        self.publish_transitions(user_id, handshake);

        let mut iv = [0u8; IV_SIZE];
        self.env.random_bytes(&mut iv);
        let request =
            handshake.confirmation(iv, self.env.random_uuid(), self.env.wall_clock_millis())?;

        let response = self.remote(cancel, self.transport.confirm(request)).await?;
        handshake.receive_confirm_response(response)?;
        self.publish_transitions(user_id, handshake);
        Ok(())
    }

    #[cfg(feature = "insecure-demo")]
    async fn drive_vulnerable(
        &self,
        handshake: &mut Handshake,
        user_id: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), HandshakeError> {
        warn!(user_id, "running unauthenticated handshake");

        let ephemeral = EphemeralKeyPair::generate(&mut EnvRng::new(&self.env));
        let request = handshake.initiate_vulnerable(ephemeral)?;
        self.publish_transitions(user_id, handshake);

        let response = self.remote(cancel, self.transport.vulnerable_initiate(request)).await?;
        handshake.receive_vulnerable_response(response)?;
        self.publish_transitions(user_id, handshake);
        Ok(())
    }

    /// Load or generate the identity on the blocking pool (RSA generation
    /// takes seconds).
    async fn load_identity(&self, user_id: &str) -> Result<Arc<IdentityKeys>, HandshakeError> {
        let keys = Arc::clone(&self.keys);
        let user_id = user_id.to_owned();
        let loaded = tokio::task::spawn_blocking(move || keys.ensure_keys(&user_id))
            .await
            .map_err(|e| KeyStoreError::Aborted(e.to_string()))?;
        Ok(loaded?)
    }

    /// Await a remote call, bounded by the request timeout and cancellation.
    async fn remote<R>(
        &self,
        cancel: &mut watch::Receiver<bool>,
        call: impl Future<Output = Result<R, TransportError>>,
    ) -> Result<R, HandshakeError> {
        let timeout = self.config.request_timeout;
        let bounded = async {
            tokio::select! {
                result = call => result.map_err(HandshakeError::from),
                () = self.env.sleep(timeout) => Err(HandshakeError::Timeout { elapsed: timeout }),
            }
        };
        cancellable(cancel, bounded).await
    }

    fn acquire(
        &self,
        user_id: &str,
    ) -> Result<(InFlight<'_>, watch::Receiver<bool>), HandshakeError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.contains_key(user_id) {
            return Err(HandshakeError::AlreadyInProgress { user_id: user_id.to_owned() });
        }

        let (flag, cancel) = watch::channel(false);
        in_flight.insert(user_id.to_owned(), flag);
        Ok((InFlight { registry: &self.in_flight, user_id: user_id.to_owned() }, cancel))
    }

    fn publish_transitions(&self, user_id: &str, handshake: &mut Handshake) {
        for transition in handshake.take_transitions() {
            self.emit(HandshakeEvent::Transition {
                user_id: user_id.to_owned(),
                from: transition.from,
                to: transition.to,
            });
        }
    }

    fn emit(&self, event: HandshakeEvent) {
        // Err only means nobody is subscribed
        let _ = self.events.send(event);
    }
}

/// Removes the single-flight entry when the attempt ends, however it ends.
struct InFlight<'a> {
    registry: &'a Mutex<HashMap<String, watch::Sender<bool>>>,
    user_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.user_id);
    }
}

async fn cancellable<R>(
    cancel: &mut watch::Receiver<bool>,
    work: impl Future<Output = Result<R, HandshakeError>>,
) -> Result<R, HandshakeError> {
    tokio::select! {
        biased;
        () = cancelled(cancel) => Err(HandshakeError::Cancelled),
        result = work => result,
    }
}

/// Resolves once the flag is raised or its sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}
