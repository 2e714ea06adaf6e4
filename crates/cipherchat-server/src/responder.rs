//! Reference handshake responder
//!
//! The remote side of the handshake: verifies initiate requests, derives the
//! same session key as the client, checks key confirmation and releases the
//! group key wrapped under the session key.
//!
//! # Invariants
//!
//! - Every request passes the replay guard before any key material is
//!   touched.
//! - A pending handshake is consumed by the first confirm naming it, whether
//!   or not confirmation succeeds.
//! - The group key is only released after the client proved possession of
//!   the session key.
//! - Every decision is written to the [`SecurityLog`].

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use cipherchat_core::{
    Admission, CONFIRMATION_PAYLOAD, EnvRng, Environment, ReplayGuard, ReplayGuardConfig,
    replay::DEFAULT_WINDOW,
};
use cipherchat_crypto::{
    CryptoError, EphemeralKeyPair, GroupKey, IV_SIZE, IdentityAlgorithm, IdentityKeyPair,
    IdentityPublicKey, KEY_SIZE, SessionKey, decrypt, derive_session_key, encrypt, sign, verify,
};
use cipherchat_proto::{ConfirmRequest, ConfirmResponse, InitiateRequest, InitiateResponse};
#[cfg(feature = "insecure-demo")]
use cipherchat_proto::{VulnerableInitiateRequest, VulnerableInitiateResponse};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::audit::{AuditStatus, SecurityEvent, SecurityLog};

/// Responder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponderConfig {
    /// Maximum request age, and lifetime of a pending handshake
    pub freshness_window: Duration,
    /// How long request nonces are remembered (at least the window)
    pub nonce_ttl: Duration,
    /// Serve the unauthenticated initiate endpoint
    pub allow_vulnerable: bool,
    /// Retained security log entries
    pub log_capacity: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            freshness_window: DEFAULT_WINDOW,
            nonce_ttl: DEFAULT_WINDOW,
            allow_vulnerable: false,
            log_capacity: crate::audit::DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Errors returned to the client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponderError {
    /// Request refused; the decision is in the security log
    #[error("{status}: {reason}")]
    Rejected {
        /// Audit status of the decision
        status: AuditStatus,
        /// Human-readable reason
        reason: String,
    },

    /// Responder key material could not be created
    #[error("responder setup failed: {0}")]
    Setup(#[from] CryptoError),
}

impl ResponderError {
    /// Audit status label for the wire.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Rejected { status, .. } => status.as_str(),
            Self::Setup(_) => AuditStatus::Failed.as_str(),
        }
    }
}

struct PendingHandshake {
    session_key: SessionKey,
    created_at_ms: u64,
}

/// In-process responder holding the group key.
pub struct Responder<E: Environment> {
    env: E,
    config: ResponderConfig,
    identity: IdentityKeyPair,
    group_key: GroupKey,
    replay: ReplayGuard,
    pending: Mutex<HashMap<String, PendingHandshake>>,
    last_unauthenticated: Mutex<Option<SessionKey>>,
    log: SecurityLog,
}

impl<E: Environment> Responder<E> {
    /// Create a responder with a fresh ECDSA identity and group key.
    ///
    /// # Errors
    ///
    /// `ResponderError::Setup` if identity key generation fails.
    pub fn new(env: E, config: ResponderConfig) -> Result<Self, ResponderError> {
        let identity =
            IdentityKeyPair::generate(IdentityAlgorithm::EcdsaP256, &mut EnvRng::new(&env))?;
        let mut group_key = [0u8; KEY_SIZE];
        env.random_bytes(&mut group_key);
        Ok(Self::with_keys(env, config, identity, GroupKey::from_bytes(group_key)))
    }

    /// Create a responder with the given identity and group key.
    pub fn with_keys(
        env: E,
        config: ResponderConfig,
        identity: IdentityKeyPair,
        group_key: GroupKey,
    ) -> Self {
        let replay = ReplayGuard::new(ReplayGuardConfig {
            window: config.freshness_window,
            nonce_ttl: config.nonce_ttl,
        });
        Self {
            env,
            log: SecurityLog::new(config.log_capacity),
            config,
            identity,
            group_key,
            replay,
            pending: Mutex::new(HashMap::new()),
            last_unauthenticated: Mutex::new(None),
        }
    }

    /// Public identity clients may pin.
    pub fn identity(&self) -> &IdentityPublicKey {
        self.identity.public_key()
    }

    /// Group key released to confirmed clients.
    pub fn group_key(&self) -> &GroupKey {
        &self.group_key
    }

    /// Audit log of all decisions.
    pub fn security_log(&self) -> &SecurityLog {
        &self.log
    }

    /// Handshakes awaiting confirmation.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Session key of the most recent unauthenticated handshake.
    pub fn last_unauthenticated_session(&self) -> Option<SessionKey> {
        self.last_unauthenticated.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `POST initiate`
    ///
    /// # Errors
    ///
    /// `ResponderError::Rejected` with `timestamp_expired`, `duplicate_nonce`
    /// or `failed` (bad identity key, bad signature, bad ephemeral key).
    pub fn handle_initiate(
        &self,
        request: &InitiateRequest,
    ) -> Result<InitiateResponse, ResponderError> {
        const EVENT: &str = "initiate";
        let now = self.env.wall_clock_millis();
        self.admit(EVENT, &request.nonce, request.timestamp, now)?;

        let client = IdentityPublicKey::from_jwk(&request.client_identity_key).map_err(|e| {
            self.reject(EVENT, now, AuditStatus::Failed, format!("invalid identity key: {e}"))
        })?;
        if !verify(&client, &request.client_ephemeral_key, &request.signature) {
            return Err(self.reject(
                EVENT,
                now,
                AuditStatus::Failed,
                "signature verification failed".into(),
            ));
        }

        let ephemeral = EphemeralKeyPair::generate(&mut EnvRng::new(&self.env));
        let server_ephemeral_key = ephemeral.public_key_bytes();
        let shared = ephemeral.agree(&request.client_ephemeral_key).map_err(|e| {
            self.reject(EVENT, now, AuditStatus::Failed, format!("invalid ephemeral key: {e}"))
        })?;
        let server_signature = sign(&self.identity, &server_ephemeral_key, &mut EnvRng::new(&self.env))
            .map_err(|e| self.reject(EVENT, now, AuditStatus::Failed, e.to_string()))?;

        let handshake_id = self.env.random_uuid();
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let lifetime_ms = millis(self.config.freshness_window);
            pending.retain(|_, p| now.saturating_sub(p.created_at_ms) <= lifetime_ms);
            pending.insert(handshake_id.clone(), PendingHandshake {
                session_key: derive_session_key(&shared),
                created_at_ms: now,
            });
        }

        self.log.record(SecurityEvent {
            timestamp: now,
            event: EVENT.into(),
            status: AuditStatus::Ok,
            details: json!({
                "handshakeId": handshake_id,
                "algorithm": client.algorithm().to_string(),
            }),
        });

        Ok(InitiateResponse {
            handshake_id: Some(handshake_id),
            server_ephemeral_key: Some(server_ephemeral_key),
            server_signature: Some(server_signature),
        })
    }

    /// `POST confirm`
    ///
    /// # Errors
    ///
    /// `ResponderError::Rejected` with `timestamp_expired`, `duplicate_nonce`,
    /// `unknown_handshake` or `decrypt_failed`.
    pub fn handle_confirm(
        &self,
        request: &ConfirmRequest,
    ) -> Result<ConfirmResponse, ResponderError> {
        const EVENT: &str = "confirm";
        let now = self.env.wall_clock_millis();
        self.admit(EVENT, &request.nonce, request.timestamp, now)?;

        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&request.handshake_id);
        let Some(pending) = pending else {
            return Err(self.reject(
                EVENT,
                now,
                AuditStatus::UnknownHandshake,
                format!("unknown handshake {}", request.handshake_id),
            ));
        };
        if now.saturating_sub(pending.created_at_ms) > millis(self.config.freshness_window) {
            return Err(self.reject(
                EVENT,
                now,
                AuditStatus::UnknownHandshake,
                format!("handshake {} expired", request.handshake_id),
            ));
        }

        match decrypt(pending.session_key.key(), &request.iv, &request.confirmation_tag) {
            Ok(tag) if tag == CONFIRMATION_PAYLOAD => {},
            Ok(_) => {
                return Err(self.reject(
                    EVENT,
                    now,
                    AuditStatus::DecryptFailed,
                    "unexpected confirmation payload".into(),
                ));
            },
            Err(e) => {
                return Err(self.reject(EVENT, now, AuditStatus::DecryptFailed, e.to_string()));
            },
        }

        let mut group_iv = [0u8; IV_SIZE];
        self.env.random_bytes(&mut group_iv);
        let encrypted_group_key =
            encrypt(pending.session_key.key(), &group_iv, self.group_key.key().as_bytes());

        self.log.record(SecurityEvent {
            timestamp: now,
            event: EVENT.into(),
            status: AuditStatus::Ok,
            details: json!({ "handshakeId": request.handshake_id }),
        });

        Ok(ConfirmResponse {
            encrypted_group_key: Some(encrypted_group_key),
            group_iv: Some(group_iv.to_vec()),
        })
    }

    /// `POST vulnerable-initiate`: unsigned agreement, no handshake id.
    ///
    /// # Errors
    ///
    /// `ResponderError::Rejected` with `disabled` unless
    /// `ResponderConfig::allow_vulnerable` is set, or `failed` for a bad
    /// ephemeral key.
    #[cfg(feature = "insecure-demo")]
    pub fn handle_vulnerable_initiate(
        &self,
        request: &VulnerableInitiateRequest,
    ) -> Result<VulnerableInitiateResponse, ResponderError> {
        const EVENT: &str = "vulnerable_initiate";
        let now = self.env.wall_clock_millis();
        if !self.config.allow_vulnerable {
            return Err(self.reject(
                EVENT,
                now,
                AuditStatus::Disabled,
                "vulnerable endpoint disabled".into(),
            ));
        }

        let ephemeral = EphemeralKeyPair::generate(&mut EnvRng::new(&self.env));
        let server_ephemeral_key = ephemeral.public_key_bytes();
        let shared = ephemeral.agree(&request.client_ephemeral_key).map_err(|e| {
            self.reject(EVENT, now, AuditStatus::Failed, format!("invalid ephemeral key: {e}"))
        })?;
        *self.last_unauthenticated.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(derive_session_key(&shared));

        self.log.record(SecurityEvent {
            timestamp: now,
            event: EVENT.into(),
            status: AuditStatus::Ok,
            details: json!({ "authenticated": false }),
        });

        Ok(VulnerableInitiateResponse { server_ephemeral_key: Some(server_ephemeral_key) })
    }

    fn admit(
        &self,
        event: &str,
        nonce: &str,
        timestamp: u64,
        now: u64,
    ) -> Result<(), ResponderError> {
        match self.replay.admit(nonce, timestamp, now) {
            Admission::Accepted => {
                debug!(event, nonce, "request admitted");
                Ok(())
            },
            Admission::Stale => Err(self.reject(
                event,
                now,
                AuditStatus::TimestampExpired,
                format!("timestamp {timestamp} outside window"),
            )),
            Admission::Duplicate => Err(self.reject(
                event,
                now,
                AuditStatus::DuplicateNonce,
                format!("nonce {nonce} already used"),
            )),
        }
    }

    fn reject(&self, event: &str, now: u64, status: AuditStatus, reason: String) -> ResponderError {
        self.log.record(SecurityEvent {
            timestamp: now,
            event: event.into(),
            status,
            details: json!({ "reason": reason }),
        });
        ResponderError::Rejected { status, reason }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
