//! Handshake state machine
//!
//! Sans-IO: methods consume responses and produce request bodies, the caller
//! performs the remote calls. This keeps the protocol deterministic and lets
//! the async driver own timeouts, cancellation and single-flight.
//!
//! # State Machine
//!
//! ```text
//! Idle ─begin─► LoadingIdentity ─initiate─► Initiating ─response─► Deriving
//!  ▲                                                                  │
//!  │                         (vulnerable: straight to Done) ◄─────────┤
//!  │                                                                  ▼
//!  └─finish── Done ◄── UnwrappingGroupKey ◄─confirm response── Confirming
//! ```
//!
//! Any failure calls [`Handshake::fail`], which discards the ephemeral key
//! and session key and returns to `Idle`.
//!
//! # Security
//!
//! The secure path signs the raw ephemeral public key with the identity key
//! and proves possession of the session key before the responder releases the
//! group key. The vulnerable path does neither and is only constructible with
//! the `insecure-demo` feature; its sessions are marked
//! [`SessionSecurity::Unauthenticated`].

use cipherchat_crypto::{
    EphemeralKeyPair, GroupKey, IV_SIZE, IdentityKeyPair, IdentityPublicKey, SessionKey, decrypt,
    derive_session_key, encrypt, sign, verify,
};
use cipherchat_proto::{ConfirmRequest, ConfirmResponse, InitiateRequest, InitiateResponse};
#[cfg(feature = "insecure-demo")]
use cipherchat_proto::{VulnerableInitiateRequest, VulnerableInitiateResponse};
use rand_core::CryptoRngCore;
use tracing::debug;

use crate::error::HandshakeError;

/// Plaintext encrypted under the session key to prove possession.
pub const CONFIRMATION_PAYLOAD: &[u8] = b"KEY_CONFIRM";

/// Handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// No attempt in progress
    Idle,
    /// Loading or generating the identity keypair
    LoadingIdentity,
    /// Initiate request sent, awaiting responder ephemeral key
    Initiating,
    /// Computing shared secret and session key
    Deriving,
    /// Confirmation sent, awaiting wrapped group key
    Confirming,
    /// Decrypting the group key
    UnwrappingGroupKey,
    /// Session established, waiting to be handed off
    Done,
}

/// Which handshake variant to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeMode {
    /// Signed ephemeral key plus key confirmation
    #[default]
    Secure,
    /// Unsigned key agreement. Demonstration only; see module docs.
    Vulnerable,
}

/// Authentication level of an established session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSecurity {
    /// Ephemeral key signed and session key confirmed
    Authenticated,
    /// Unsigned agreement, never confirmed
    Unauthenticated,
}

/// A single state change, for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Previous state
    pub from: HandshakeState,
    /// New state
    pub to: HandshakeState,
}

/// Keys produced by a completed handshake.
pub struct EstablishedSession {
    security: SessionSecurity,
    handshake_id: Option<String>,
    session_key: SessionKey,
    group_key: Option<GroupKey>,
}

impl EstablishedSession {
    /// Authentication level.
    pub fn security(&self) -> SessionSecurity {
        self.security
    }

    /// Responder-assigned id. `None` for unauthenticated sessions.
    pub fn handshake_id(&self) -> Option<&str> {
        self.handshake_id.as_deref()
    }

    /// Key derived from the ephemeral agreement.
    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    /// Chat key. `None` for unauthenticated sessions.
    pub fn group_key(&self) -> Option<&GroupKey> {
        self.group_key.as_ref()
    }

    /// Take ownership of the keys.
    pub fn into_keys(self) -> (SessionKey, Option<GroupKey>) {
        (self.session_key, self.group_key)
    }
}

impl std::fmt::Debug for EstablishedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstablishedSession")
            .field("security", &self.security)
            .field("handshake_id", &self.handshake_id)
            .field("has_group_key", &self.group_key.is_some())
            .finish_non_exhaustive()
    }
}

/// One handshake attempt.
pub struct Handshake {
    mode: HandshakeMode,
    state: HandshakeState,
    /// Pinned responder identity; when set, responses must be signed by it
    responder_identity: Option<IdentityPublicKey>,
    ephemeral: Option<EphemeralKeyPair>,
    handshake_id: Option<String>,
    session_key: Option<SessionKey>,
    group_key: Option<GroupKey>,
    transitions: Vec<Transition>,
}

impl Handshake {
    /// Create an idle handshake.
    pub fn new(mode: HandshakeMode) -> Self {
        Self {
            mode,
            state: HandshakeState::Idle,
            responder_identity: None,
            ephemeral: None,
            handshake_id: None,
            session_key: None,
            group_key: None,
            transitions: Vec::new(),
        }
    }

    /// Require the responder's ephemeral key to be signed by `identity`.
    pub fn with_responder_identity(mut self, identity: IdentityPublicKey) -> Self {
        self.responder_identity = Some(identity);
        self
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Variant being run.
    pub fn mode(&self) -> HandshakeMode {
        self.mode
    }

    /// Drain the transitions recorded since the last call.
    pub fn take_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    /// Start an attempt.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not `Idle`
    pub fn begin(&mut self) -> Result<(), HandshakeError> {
        self.require(HandshakeState::Idle, "begin handshake")?;
        self.enter(HandshakeState::LoadingIdentity);
        Ok(())
    }

    /// Build the signed initiate request.
    ///
    /// Signs the raw (uncompressed SEC1) ephemeral public key with the
    /// identity key. The ephemeral keypair is held until the responder's key
    /// arrives.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not `LoadingIdentity` or not in
    ///   secure mode
    /// - `HandshakeError::Crypto` if signing fails
    pub fn initiate(
        &mut self,
        identity: &IdentityKeyPair,
        ephemeral: EphemeralKeyPair,
        nonce: String,
        timestamp: u64,
        rng: &mut impl CryptoRngCore,
    ) -> Result<InitiateRequest, HandshakeError> {
        self.require(HandshakeState::LoadingIdentity, "initiate")?;
        self.require_mode(HandshakeMode::Secure, "initiate")?;

        let client_ephemeral_key = ephemeral.public_key_bytes();
        let signature = sign(identity, &client_ephemeral_key, rng)?;

        self.ephemeral = Some(ephemeral);
        self.enter(HandshakeState::Initiating);

        Ok(InitiateRequest {
            client_ephemeral_key,
            client_identity_key: identity.public_key().to_jwk(),
            signature,
            nonce,
            timestamp,
        })
    }

    /// Build the unsigned initiate request.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not `LoadingIdentity` or not in
    ///   vulnerable mode
    #[cfg(feature = "insecure-demo")]
    pub fn initiate_vulnerable(
        &mut self,
        ephemeral: EphemeralKeyPair,
    ) -> Result<VulnerableInitiateRequest, HandshakeError> {
        self.require(HandshakeState::LoadingIdentity, "initiate vulnerable")?;
        self.require_mode(HandshakeMode::Vulnerable, "initiate vulnerable")?;

        let client_ephemeral_key = ephemeral.public_key_bytes();
        self.ephemeral = Some(ephemeral);
        self.enter(HandshakeState::Initiating);

        Ok(VulnerableInitiateRequest { client_ephemeral_key })
    }

    /// Consume the initiate response and derive the session key.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not `Initiating` in secure mode
    /// - `HandshakeError::MissingField` for an absent `handshakeId`,
    ///   `serverEphemeralKey` or (when pinned) `serverSignature`
    /// - `HandshakeError::ResponderSignatureInvalid` if the pinned responder
    ///   identity did not sign the ephemeral key
    /// - `HandshakeError::Crypto` if the responder key is invalid
    pub fn receive_initiate_response(
        &mut self,
        response: InitiateResponse,
    ) -> Result<(), HandshakeError> {
        self.require(HandshakeState::Initiating, "receive initiate response")?;
        self.require_mode(HandshakeMode::Secure, "receive initiate response")?;

        let handshake_id =
            response.handshake_id.ok_or(HandshakeError::MissingField { field: "handshakeId" })?;
        let server_key = response
            .server_ephemeral_key
            .ok_or(HandshakeError::MissingField { field: "serverEphemeralKey" })?;

        if let Some(responder) = &self.responder_identity {
            let signature = response
                .server_signature
                .ok_or(HandshakeError::MissingField { field: "serverSignature" })?;
            if !verify(responder, &server_key, &signature) {
                return Err(HandshakeError::ResponderSignatureInvalid);
            }
        }

        self.handshake_id = Some(handshake_id);
        self.derive(&server_key)?;
        self.enter(HandshakeState::Confirming);
        Ok(())
    }

    /// Consume the vulnerable initiate response. Completes the handshake
    /// without confirmation.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not `Initiating` in vulnerable mode
    /// - `HandshakeError::MissingField` for an absent `serverEphemeralKey`
    /// - `HandshakeError::Crypto` if the responder key is invalid
    #[cfg(feature = "insecure-demo")]
    pub fn receive_vulnerable_response(
        &mut self,
        response: VulnerableInitiateResponse,
    ) -> Result<(), HandshakeError> {
        self.require(HandshakeState::Initiating, "receive vulnerable response")?;
        self.require_mode(HandshakeMode::Vulnerable, "receive vulnerable response")?;

        let server_key = response
            .server_ephemeral_key
            .ok_or(HandshakeError::MissingField { field: "serverEphemeralKey" })?;

        self.derive(&server_key)?;
        self.enter(HandshakeState::Done);
        Ok(())
    }

    /// Build the key confirmation: `KEY_CONFIRM` encrypted under the session
    /// key with `iv`.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::NotConfirmable` in vulnerable mode
    /// - `HandshakeError::InvalidState` if not `Confirming`
    pub fn confirmation(
        &self,
        iv: [u8; IV_SIZE],
        nonce: String,
        timestamp: u64,
    ) -> Result<ConfirmRequest, HandshakeError> {
        if self.mode == HandshakeMode::Vulnerable {
            return Err(HandshakeError::NotConfirmable);
        }
        self.require(HandshakeState::Confirming, "confirm")?;

        let (Some(handshake_id), Some(session_key)) = (&self.handshake_id, &self.session_key)
        else {
            return Err(HandshakeError::NotConfirmable);
        };

        Ok(ConfirmRequest {
            handshake_id: handshake_id.clone(),
            iv: iv.to_vec(),
            confirmation_tag: encrypt(session_key.key(), &iv, CONFIRMATION_PAYLOAD),
            nonce,
            timestamp,
        })
    }

    /// Unwrap the group key from the confirm response.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not `Confirming`
    /// - `HandshakeError::MissingField` for an absent `encryptedGroupKey` or
    ///   `groupIv`
    /// - `HandshakeError::Crypto` if the group key fails to decrypt
    pub fn receive_confirm_response(
        &mut self,
        response: ConfirmResponse,
    ) -> Result<(), HandshakeError> {
        self.require(HandshakeState::Confirming, "receive confirm response")?;

        let wrapped = response
            .encrypted_group_key
            .ok_or(HandshakeError::MissingField { field: "encryptedGroupKey" })?;
        let iv = response.group_iv.ok_or(HandshakeError::MissingField { field: "groupIv" })?;

        self.enter(HandshakeState::UnwrappingGroupKey);
        let Some(session_key) = &self.session_key else {
            return Err(self.invalid("unwrap group key"));
        };
        let raw = decrypt(session_key.key(), &iv, &wrapped)?;
        self.group_key = Some(GroupKey::from_slice(&raw)?);

        self.enter(HandshakeState::Done);
        Ok(())
    }

    /// Hand off the established keys and return to `Idle`.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not `Done`
    pub fn finish(&mut self) -> Result<EstablishedSession, HandshakeError> {
        self.require(HandshakeState::Done, "finish")?;
        let Some(session_key) = self.session_key.take() else {
            return Err(self.invalid("finish"));
        };

        let security = match self.mode {
            HandshakeMode::Secure => SessionSecurity::Authenticated,
            HandshakeMode::Vulnerable => SessionSecurity::Unauthenticated,
        };
        let session = EstablishedSession {
            security,
            handshake_id: self.handshake_id.take(),
            session_key,
            group_key: self.group_key.take(),
        };

        self.enter(HandshakeState::Idle);
        Ok(session)
    }

    /// Abort the attempt: discard transient key material and return to
    /// `Idle`.
    pub fn fail(&mut self) {
        self.ephemeral = None;
        self.handshake_id = None;
        self.session_key = None;
        self.group_key = None;
        if self.state != HandshakeState::Idle {
            self.enter(HandshakeState::Idle);
        }
    }

    fn derive(&mut self, remote_key: &[u8]) -> Result<(), HandshakeError> {
        self.enter(HandshakeState::Deriving);
        let Some(ephemeral) = self.ephemeral.take() else {
            return Err(self.invalid("derive session key"));
        };

        let shared = ephemeral.agree(remote_key)?;
        self.session_key = Some(derive_session_key(&shared));
        Ok(())
    }

    fn enter(&mut self, to: HandshakeState) {
        let from = self.state;
        debug!(?from, ?to, mode = ?self.mode, "handshake transition");
        self.state = to;
        self.transitions.push(Transition { from, to });
    }

    fn require(&self, expected: HandshakeState, operation: &str) -> Result<(), HandshakeError> {
        if self.state == expected { Ok(()) } else { Err(self.invalid(operation)) }
    }

    fn require_mode(&self, expected: HandshakeMode, operation: &str) -> Result<(), HandshakeError> {
        if self.mode == expected { Ok(()) } else { Err(self.invalid(operation)) }
    }

    fn invalid(&self, operation: &str) -> HandshakeError {
        HandshakeError::InvalidState { state: self.state, operation: operation.to_owned() }
    }
}

#[cfg(test)]
mod tests {
    use cipherchat_crypto::IdentityAlgorithm;
    use rand_core::OsRng;

    use super::*;

    /// Responder side of the secure path, built directly on the primitives.
    struct Peer {
        group_key: GroupKey,
        identity: IdentityKeyPair,
    }

    impl Peer {
        fn new() -> Self {
            Self {
                group_key: GroupKey::from_bytes([7u8; 32]),
                identity: IdentityKeyPair::generate(IdentityAlgorithm::EcdsaP256, &mut OsRng)
                    .unwrap(),
            }
        }

        fn answer(&self, request: &InitiateRequest) -> (InitiateResponse, SessionKey) {
            let client = IdentityPublicKey::from_jwk(&request.client_identity_key).unwrap();
            assert!(verify(&client, &request.client_ephemeral_key, &request.signature));

            let ephemeral = EphemeralKeyPair::generate(&mut OsRng);
            let server_key = ephemeral.public_key_bytes();
            let signature = sign(&self.identity, &server_key, &mut OsRng).unwrap();
            let session = derive_session_key(&ephemeral.agree(&request.client_ephemeral_key).unwrap());

            let response = InitiateResponse {
                handshake_id: Some("hs-1".into()),
                server_ephemeral_key: Some(server_key),
                server_signature: Some(signature),
            };
            (response, session)
        }

        fn confirm(&self, request: &ConfirmRequest, session: &SessionKey) -> ConfirmResponse {
            let tag = decrypt(session.key(), &request.iv, &request.confirmation_tag).unwrap();
            assert_eq!(tag, CONFIRMATION_PAYLOAD);

            let iv = [9u8; IV_SIZE];
            ConfirmResponse {
                encrypted_group_key: Some(encrypt(session.key(), &iv, self.group_key.key().as_bytes())),
                group_iv: Some(iv.to_vec()),
            }
        }
    }

    fn identity() -> IdentityKeyPair {
        IdentityKeyPair::generate(IdentityAlgorithm::EcdsaP256, &mut OsRng).unwrap()
    }

    fn initiated(handshake: &mut Handshake, identity: &IdentityKeyPair) -> InitiateRequest {
        handshake.begin().unwrap();
        handshake
            .initiate(identity, EphemeralKeyPair::generate(&mut OsRng), "n-1".into(), 1_000, &mut OsRng)
            .unwrap()
    }

    #[test]
    fn secure_handshake_establishes_shared_keys() {
        let peer = Peer::new();
        let identity = identity();
        let mut handshake = Handshake::new(HandshakeMode::Secure);

        let request = initiated(&mut handshake, &identity);
        assert_eq!(handshake.state(), HandshakeState::Initiating);

        let (response, peer_session) = peer.answer(&request);
        handshake.receive_initiate_response(response).unwrap();
        assert_eq!(handshake.state(), HandshakeState::Confirming);

        let confirm = handshake.confirmation([1u8; IV_SIZE], "n-2".into(), 2_000).unwrap();
        assert_eq!(confirm.handshake_id, "hs-1");
        handshake.receive_confirm_response(peer.confirm(&confirm, &peer_session)).unwrap();
        assert_eq!(handshake.state(), HandshakeState::Done);

        let session = handshake.finish().unwrap();
        assert_eq!(handshake.state(), HandshakeState::Idle);
        assert_eq!(session.security(), SessionSecurity::Authenticated);
        assert_eq!(session.session_key(), &peer_session);
        assert_eq!(session.group_key(), Some(&peer.group_key));
    }

    #[test]
    fn transitions_follow_the_secure_path() {
        let peer = Peer::new();
        let identity = identity();
        let mut handshake = Handshake::new(HandshakeMode::Secure);

        let request = initiated(&mut handshake, &identity);
        let (response, session) = peer.answer(&request);
        handshake.receive_initiate_response(response).unwrap();
        let confirm = handshake.confirmation([1u8; IV_SIZE], "n-2".into(), 2_000).unwrap();
        handshake.receive_confirm_response(peer.confirm(&confirm, &session)).unwrap();
        handshake.finish().unwrap();

        let visited: Vec<_> = handshake.take_transitions().into_iter().map(|t| t.to).collect();
        assert_eq!(visited, vec![
            HandshakeState::LoadingIdentity,
            HandshakeState::Initiating,
            HandshakeState::Deriving,
            HandshakeState::Confirming,
            HandshakeState::UnwrappingGroupKey,
            HandshakeState::Done,
            HandshakeState::Idle,
        ]);
        assert!(handshake.take_transitions().is_empty());
    }

    #[test]
    fn missing_handshake_id_is_reported() {
        let peer = Peer::new();
        let identity = identity();
        let mut handshake = Handshake::new(HandshakeMode::Secure);

        let request = initiated(&mut handshake, &identity);
        let (mut response, _) = peer.answer(&request);
        response.handshake_id = None;

        let err = handshake.receive_initiate_response(response).unwrap_err();
        assert_eq!(err, HandshakeError::MissingField { field: "handshakeId" });

        handshake.fail();
        assert_eq!(handshake.state(), HandshakeState::Idle);
    }

    #[test]
    fn missing_group_iv_is_reported() {
        let peer = Peer::new();
        let identity = identity();
        let mut handshake = Handshake::new(HandshakeMode::Secure);

        let request = initiated(&mut handshake, &identity);
        let (response, session) = peer.answer(&request);
        handshake.receive_initiate_response(response).unwrap();
        let confirm = handshake.confirmation([1u8; IV_SIZE], "n-2".into(), 2_000).unwrap();
        let mut reply = peer.confirm(&confirm, &session);
        reply.group_iv = None;

        let err = handshake.receive_confirm_response(reply).unwrap_err();
        assert_eq!(err, HandshakeError::MissingField { field: "groupIv" });
    }

    #[test]
    fn group_key_under_wrong_session_key_fails() {
        let peer = Peer::new();
        let identity = identity();
        let mut handshake = Handshake::new(HandshakeMode::Secure);

        let request = initiated(&mut handshake, &identity);
        let (response, _) = peer.answer(&request);
        handshake.receive_initiate_response(response).unwrap();
        let confirm = handshake.confirmation([1u8; IV_SIZE], "n-2".into(), 2_000).unwrap();

        let wrong = SessionKey::from_bytes([3u8; 32]);
        let iv = [9u8; IV_SIZE];
        let reply = ConfirmResponse {
            encrypted_group_key: Some(encrypt(wrong.key(), &iv, &[7u8; 32])),
            group_iv: Some(iv.to_vec()),
        };
        // The confirmation itself was valid for the real session key
        assert!(!confirm.confirmation_tag.is_empty());

        let err = handshake.receive_confirm_response(reply).unwrap_err();
        assert!(matches!(err, HandshakeError::Crypto(_)));
        assert_eq!(handshake.state(), HandshakeState::UnwrappingGroupKey);

        handshake.fail();
        assert_eq!(handshake.state(), HandshakeState::Idle);
        assert!(matches!(handshake.finish(), Err(HandshakeError::InvalidState { .. })));
    }

    #[test]
    fn pinned_responder_signature_is_enforced() {
        let peer = Peer::new();
        let identity = identity();
        let mut handshake = Handshake::new(HandshakeMode::Secure)
            .with_responder_identity(peer.identity.public_key().clone());

        let request = initiated(&mut handshake, &identity);
        let (mut response, _) = peer.answer(&request);
        response.server_ephemeral_key = Some(EphemeralKeyPair::generate(&mut OsRng).public_key_bytes());

        let err = handshake.receive_initiate_response(response).unwrap_err();
        assert_eq!(err, HandshakeError::ResponderSignatureInvalid);
    }

    #[test]
    fn pinned_responder_requires_signature() {
        let peer = Peer::new();
        let identity = identity();
        let mut handshake = Handshake::new(HandshakeMode::Secure)
            .with_responder_identity(peer.identity.public_key().clone());

        let request = initiated(&mut handshake, &identity);
        let (mut response, _) = peer.answer(&request);
        response.server_signature = None;

        let err = handshake.receive_initiate_response(response).unwrap_err();
        assert_eq!(err, HandshakeError::MissingField { field: "serverSignature" });
    }

    #[test]
    fn signature_covers_raw_ephemeral_key() {
        let identity = identity();
        let mut handshake = Handshake::new(HandshakeMode::Secure);

        let request = initiated(&mut handshake, &identity);

        assert_eq!(request.client_ephemeral_key.len(), 65);
        assert!(verify(identity.public_key(), &request.client_ephemeral_key, &request.signature));
        assert_eq!(request.client_identity_key, identity.public_key().to_jwk());
    }

    #[test]
    fn operations_out_of_order_are_rejected() {
        let identity = identity();
        let mut handshake = Handshake::new(HandshakeMode::Secure);

        let err = handshake
            .initiate(&identity, EphemeralKeyPair::generate(&mut OsRng), "n".into(), 0, &mut OsRng)
            .unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidState { state: HandshakeState::Idle, .. }));

        handshake.begin().unwrap();
        assert!(matches!(handshake.begin(), Err(HandshakeError::InvalidState { .. })));
        assert!(matches!(
            handshake.receive_confirm_response(ConfirmResponse::default()),
            Err(HandshakeError::InvalidState { .. })
        ));
    }

    #[test]
    fn vulnerable_sessions_cannot_be_confirmed() {
        let handshake = Handshake::new(HandshakeMode::Vulnerable);

        let err = handshake.confirmation([0u8; IV_SIZE], "n".into(), 0).unwrap_err();
        assert_eq!(err, HandshakeError::NotConfirmable);
    }

    #[test]
    fn secure_initiate_refused_in_vulnerable_mode() {
        let identity = identity();
        let mut handshake = Handshake::new(HandshakeMode::Vulnerable);
        handshake.begin().unwrap();

        let err = handshake
            .initiate(&identity, EphemeralKeyPair::generate(&mut OsRng), "n".into(), 0, &mut OsRng)
            .unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidState { .. }));
    }

    #[cfg(feature = "insecure-demo")]
    #[test]
    fn vulnerable_handshake_skips_confirmation() {
        let mut handshake = Handshake::new(HandshakeMode::Vulnerable);
        handshake.begin().unwrap();
        let request = handshake.initiate_vulnerable(EphemeralKeyPair::generate(&mut OsRng)).unwrap();

        let server = EphemeralKeyPair::generate(&mut OsRng);
        let server_key = server.public_key_bytes();
        let server_session =
            derive_session_key(&server.agree(&request.client_ephemeral_key).unwrap());

        handshake
            .receive_vulnerable_response(VulnerableInitiateResponse {
                server_ephemeral_key: Some(server_key),
            })
            .unwrap();
        assert_eq!(handshake.state(), HandshakeState::Done);

        let session = handshake.finish().unwrap();
        assert_eq!(session.security(), SessionSecurity::Unauthenticated);
        assert_eq!(session.handshake_id(), None);
        assert!(session.group_key().is_none());
        assert_eq!(session.session_key(), &server_session);
    }
}
