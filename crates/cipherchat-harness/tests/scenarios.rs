//! End-to-end scenarios over loopback
//!
//! A real responder, real coordinators and chat sessions, a seeded
//! environment, and an attacker where the scenario calls for one.

use std::{sync::Arc, time::Duration};

use cipherchat_client::{
    ChatError, HandshakeConfig, HandshakeCoordinator, HandshakeError, HandshakeMode,
    MessageTransport as _, SessionSecurity,
};
use cipherchat_core::{
    Admission, Environment as _, MemoryStore, Opened, ReplayGuard, ReplayGuardConfig,
    ReplayRejectedError,
};
use cipherchat_crypto::IdentityAlgorithm;
use cipherchat_harness::{
    Interception, LoopbackTransport, MitmTransport, SIM_EPOCH_MS, SimEnv, World,
};
use cipherchat_server::{AuditStatus, ResponderConfig};

fn world(seed: u64) -> World<SimEnv> {
    World::new(SimEnv::with_seed(seed), ResponderConfig::default()).unwrap()
}

fn vulnerable_world(seed: u64) -> World<SimEnv> {
    let config = ResponderConfig { allow_vulnerable: true, ..Default::default() };
    World::new(SimEnv::with_seed(seed), config).unwrap()
}

type Attacker = MitmTransport<LoopbackTransport<SimEnv>, SimEnv>;

fn attacked(
    world: &World<SimEnv>,
    interception: Interception,
    config: HandshakeConfig,
) -> (Arc<Attacker>, HandshakeCoordinator<MemoryStore, SimEnv, Attacker>) {
    let attacker = Arc::new(MitmTransport::new(
        Arc::clone(world.transport()),
        world.env().clone(),
        interception,
    ));
    let coordinator = HandshakeCoordinator::new(
        world.env().clone(),
        MemoryStore::new(),
        Arc::clone(&attacker),
        config,
    );
    (attacker, coordinator)
}

#[tokio::test]
async fn participants_receive_the_responder_group_key() {
    let world = world(1);
    let coordinator = world.coordinator(MemoryStore::new(), HandshakeConfig::default());

    let alice = coordinator.establish("alice").await.unwrap();
    let bob = coordinator.establish("bob").await.unwrap();

    assert_eq!(alice.security(), SessionSecurity::Authenticated);
    assert_eq!(alice.group_key(), Some(world.responder().group_key()));
    assert_eq!(bob.group_key(), Some(world.responder().group_key()));
    assert_ne!(alice.session_key(), bob.session_key());
    assert_eq!(world.responder().pending_count(), 0);
    assert_eq!(world.responder().security_log().count(AuditStatus::Ok), 4);
}

#[tokio::test]
async fn rsa_identities_complete_the_handshake() {
    let world = world(2);
    let config =
        HandshakeConfig { identity_algorithm: IdentityAlgorithm::RsaPss, ..Default::default() };
    let coordinator = world.coordinator(MemoryStore::new(), config);

    let session = coordinator.establish("carol").await.unwrap();

    assert_eq!(session.security(), SessionSecurity::Authenticated);
}

#[tokio::test]
async fn hello_reaches_the_other_participant() {
    let world = world(3);
    let coordinator = world.coordinator(MemoryStore::new(), HandshakeConfig::default());
    let alice =
        world.join(coordinator.establish("u1").await.unwrap(), "u1", "alice").await.unwrap();
    let mut bob =
        world.join(coordinator.establish("u2").await.unwrap(), "u2", "bob").await.unwrap();

    alice.send_text("Hello!").await.unwrap();

    match bob.next().await.unwrap() {
        Opened::Text { sender_id, sender, text } => {
            assert_eq!(sender_id, "u1");
            assert_eq!(sender, "alice");
            assert_eq!(text, "Hello!");
        },
        other => panic!("expected text, got {other:?}"),
    }
}

#[test]
fn replay_guard_sequence() {
    let guard = ReplayGuard::new(ReplayGuardConfig::default());
    let t = SIM_EPOCH_MS;

    assert_eq!(guard.admit("abc", t, t + 1_000), Admission::Accepted);
    assert_eq!(guard.admit("abc", t, t + 2_000), Admission::Duplicate);
    assert_eq!(guard.admit("xyz", t, t + 25_000), Admission::Stale);
}

#[tokio::test]
async fn replayed_and_backdated_envelopes_are_rejected() {
    let world = world(4);
    let coordinator = world.coordinator(MemoryStore::new(), HandshakeConfig::default());
    let alice =
        world.join(coordinator.establish("u1").await.unwrap(), "u1", "alice").await.unwrap();
    let mut bob =
        world.join(coordinator.establish("u2").await.unwrap(), "u2", "bob").await.unwrap();

    let captured = alice.send_text("transfer").await.unwrap();
    assert!(matches!(bob.next().await.unwrap(), Opened::Text { .. }));

    world.hub().publish(captured.clone()).await.unwrap();
    match bob.next().await.unwrap() {
        Opened::Rejected { error, .. } => {
            assert_eq!(error, ReplayRejectedError::Duplicate { nonce: captured.nonce.clone() });
        },
        other => panic!("expected rejection, got {other:?}"),
    }

    world.env().advance(Duration::from_secs(25));
    let mut backdated = captured;
    backdated.nonce = "fresh-nonce".into();
    world.hub().publish(backdated).await.unwrap();
    match bob.next().await.unwrap() {
        Opened::Rejected { error, .. } => {
            assert_eq!(error, ReplayRejectedError::Stale { nonce: "fresh-nonce".into() });
        },
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn renonced_capture_with_current_timestamp_is_not_displayed() {
    let world = world(12);
    let coordinator = world.coordinator(MemoryStore::new(), HandshakeConfig::default());
    let alice =
        world.join(coordinator.establish("u1").await.unwrap(), "u1", "alice").await.unwrap();
    let mut bob =
        world.join(coordinator.establish("u2").await.unwrap(), "u2", "bob").await.unwrap();

    let captured = alice.send_text("transfer 100").await.unwrap();
    assert!(matches!(bob.next().await.unwrap(), Opened::Text { .. }));

    world.env().advance(Duration::from_secs(600));
    let mut replay = captured;
    replay.nonce = "attacker-nonce".into();
    replay.timestamp = world.env().wall_clock_millis();
    world.hub().publish(replay).await.unwrap();

    assert!(matches!(bob.next().await.unwrap(), Opened::Undecryptable { .. }));
}

#[tokio::test]
async fn unauthenticated_sessions_cannot_join_the_chat() {
    let world = vulnerable_world(5);
    let config = HandshakeConfig { mode: HandshakeMode::Vulnerable, ..Default::default() };
    let coordinator = world.coordinator(MemoryStore::new(), config);

    let session = coordinator.establish("u1").await.unwrap();
    assert_eq!(session.security(), SessionSecurity::Unauthenticated);

    let result = world.join(session, "u1", "alice").await;
    assert!(matches!(result, Err(ChatError::NoGroupKey)));
}

#[tokio::test]
async fn passive_relay_leaves_the_unauthenticated_exchange_intact() {
    let world = vulnerable_world(6);
    let config = HandshakeConfig { mode: HandshakeMode::Vulnerable, ..Default::default() };
    let (attacker, coordinator) = attacked(&world, Interception::Passive, config);

    let session = coordinator.establish("u1").await.unwrap();

    assert_eq!(
        world.responder().last_unauthenticated_session().as_ref(),
        Some(session.session_key())
    );
    assert_eq!(attacker.intercepted().substitutions, 0);
}

#[tokio::test]
async fn key_substitution_compromises_the_unauthenticated_exchange() {
    let world = vulnerable_world(7);
    let config = HandshakeConfig { mode: HandshakeMode::Vulnerable, ..Default::default() };
    let (attacker, coordinator) = attacked(&world, Interception::Both, config);

    let session = coordinator.establish("u1").await.unwrap();
    let stolen = attacker.intercepted();
    let server_key = world.responder().last_unauthenticated_session();

    assert_eq!(session.security(), SessionSecurity::Unauthenticated);
    assert_eq!(stolen.substitutions, 2);
    assert_eq!(stolen.client_session.as_ref(), Some(session.session_key()));
    assert_eq!(stolen.server_session, server_key);
    assert_ne!(server_key.as_ref(), Some(session.session_key()));
}

#[tokio::test]
async fn substituted_client_key_is_rejected_by_the_responder() {
    let world = world(8);
    let (_, coordinator) = attacked(&world, Interception::ClientKey, HandshakeConfig::default());

    let result = coordinator.establish("u1").await;

    assert!(
        matches!(result, Err(HandshakeError::Rejected { ref status, .. }) if status == "failed")
    );
    assert_eq!(world.responder().security_log().count(AuditStatus::Failed), 1);
    assert_eq!(world.responder().pending_count(), 0);
}

#[tokio::test]
async fn substituted_server_key_fails_pinned_signature_check() {
    let world = world(9);
    let config = HandshakeConfig {
        responder_identity: Some(world.responder().identity().clone()),
        ..Default::default()
    };
    let (attacker, coordinator) = attacked(&world, Interception::ServerKey, config);

    let result = coordinator.establish("u1").await;

    assert_eq!(result.unwrap_err(), HandshakeError::ResponderSignatureInvalid);
    assert!(attacker.intercepted().client_session.is_some());
    assert!(!coordinator.is_in_progress("u1"));
}

#[tokio::test]
async fn substituted_server_key_without_pinning_fails_confirmation() {
    let world = world(10);
    let (_, coordinator) = attacked(&world, Interception::ServerKey, HandshakeConfig::default());

    let result = coordinator.establish("u1").await;

    let Err(HandshakeError::Rejected { status, .. }) = result else {
        panic!("expected rejection, got {result:?}");
    };
    assert_eq!(status, "decrypt_failed");
    assert_eq!(world.responder().security_log().count(AuditStatus::DecryptFailed), 1);
}

#[tokio::test]
async fn unreachable_responder_is_retryable() {
    let world = world(11);
    let coordinator = world.coordinator(MemoryStore::new(), HandshakeConfig::default());
    world.transport().set_offline(true);

    let error = coordinator.establish("u1").await.unwrap_err();
    assert!(matches!(error, HandshakeError::Transport(_)));
    assert!(error.is_retryable());

    world.transport().set_offline(false);
    assert!(coordinator.establish("u1").await.is_ok());
}

#[test]
fn same_seed_same_responder_identity() {
    assert_eq!(world(42).responder().identity(), world(42).responder().identity());
    assert_ne!(world(42).responder().identity(), world(43).responder().identity());
}
