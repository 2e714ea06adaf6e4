//! cipherchat demonstration binary.
//!
//! Runs a responder and clients in one process and narrates the result
//! through the log.
//!
//! # Usage
//!
//! ```bash
//! # Authenticated handshake, then one chat message
//! cipherchat handshake
//!
//! # Keep identities across runs, RSA-PSS identities
//! cipherchat --store keys.redb --algorithm rsa handshake
//!
//! # Key substitution against both handshake variants
//! cipherchat mitm
//!
//! # Duplicate, backdated and re-nonced chat envelopes
//! cipherchat replay
//! ```

use std::{sync::Arc, time::Duration};

use cipherchat_client::{
    HandshakeConfig, HandshakeCoordinator, HandshakeMode, MessageTransport as _, SessionSecurity,
};
use cipherchat_core::{Environment, KeyValueStore, MemoryStore, Opened};
use cipherchat_crypto::IdentityAlgorithm;
use cipherchat_harness::{Interception, MitmTransport, World};
use cipherchat_server::{AuditStatus, RedbStore, ResponderConfig, SystemEnv};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Authenticated key exchange demonstration
#[derive(Parser, Debug)]
#[command(name = "cipherchat")]
#[command(about = "Authenticated ECDH key exchange and encrypted chat demonstration")]
#[command(version)]
struct Args {
    /// User id of the first participant
    #[arg(short, long, default_value = "alice")]
    user: String,

    /// User id of the second participant
    #[arg(short, long, default_value = "bob")]
    peer: String,

    /// Identity key algorithm for new identities
    #[arg(short, long, value_enum, default_value = "ec")]
    algorithm: Algorithm,

    /// Persist identity keys in this redb file instead of memory
    #[arg(short, long)]
    store: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Authenticated handshake for both participants, then exchange a message
    Handshake,
    /// Run a key-substituting attacker against both handshake variants
    Mitm,
    /// Replay a captured envelope, then resend it backdated and re-nonced
    Replay,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Algorithm {
    /// ECDSA P-256
    Ec,
    /// RSA-PSS 2048
    Rsa,
}

impl From<Algorithm> for IdentityAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Ec => Self::EcdsaP256,
            Algorithm::Rsa => Self::RsaPss,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match &args.store {
        Some(path) => {
            info!(%path, "using persistent identity store");
            run(RedbStore::open(path)?, &args).await
        },
        None => run(MemoryStore::new(), &args).await,
    }
}

async fn run<S: KeyValueStore>(store: S, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        HandshakeConfig { identity_algorithm: args.algorithm.into(), ..Default::default() };
    match args.command {
        Command::Handshake => handshake(store, config, args).await,
        Command::Mitm => mitm(store, config, args).await,
        Command::Replay => replay(store, config, args).await,
    }
}

async fn handshake<S: KeyValueStore>(
    store: S,
    config: HandshakeConfig,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let world = World::new(SystemEnv::new(), ResponderConfig::default())?;
    let coordinator = world.coordinator(store, config);

    let first = coordinator.establish(&args.user).await?;
    let second = coordinator.establish(&args.peer).await?;
    info!(handshake_id = first.handshake_id(), user = %args.user, "session established");
    info!(handshake_id = second.handshake_id(), user = %args.peer, "session established");

    let sender = world.join(first, &args.user, &args.user).await?;
    let mut receiver = world.join(second, &args.peer, &args.peer).await?;

    sender.send_text("Hello!").await?;
    if let Some(message) = receiver.next().await {
        info!(user = %args.peer, text = %message.display_text(), "received");
    }

    info!(log = %world.responder().security_log().to_json()?, "responder security log");
    Ok(())
}

async fn mitm<S: KeyValueStore>(
    store: S,
    config: HandshakeConfig,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = SystemEnv::new();
    let world =
        World::new(env.clone(), ResponderConfig { allow_vulnerable: true, ..Default::default() })?;

    let attacker = Arc::new(MitmTransport::new(
        Arc::clone(world.transport()),
        env.clone(),
        Interception::Both,
    ));
    let vulnerable = HandshakeCoordinator::new(
        env.clone(),
        store.clone(),
        Arc::clone(&attacker),
        HandshakeConfig { mode: HandshakeMode::Vulnerable, ..config.clone() },
    );

    let session = vulnerable.establish(&args.user).await?;
    let (client_key, _) = session.into_keys();
    let stolen = attacker.intercepted();
    let server_key = world.responder().last_unauthenticated_session();

    warn!(
        client_shares_key_with_attacker = stolen.client_session.as_ref() == Some(&client_key),
        responder_shares_key_with_attacker = stolen.server_session == server_key,
        client_and_responder_agree = server_key.as_ref() == Some(&client_key),
        "unauthenticated handshake completed"
    );

    let secure = HandshakeCoordinator::new(env, store, Arc::clone(&attacker), config);
    match secure.establish(&args.user).await {
        Err(e) => info!(error = %e, "authenticated handshake aborted under attack"),
        Ok(session) if session.security() == SessionSecurity::Authenticated => {
            warn!("authenticated handshake completed under attack");
        },
        Ok(_) => warn!("unexpected session"),
    }
    info!(
        failed = world.responder().security_log().count(AuditStatus::Failed),
        "responder rejections"
    );
    Ok(())
}

async fn replay<S: KeyValueStore>(
    store: S,
    config: HandshakeConfig,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = SystemEnv::new();
    let world = World::new(env.clone(), ResponderConfig::default())?;
    let coordinator = world.coordinator(store, config);

    let sender =
        world.join(coordinator.establish(&args.user).await?, &args.user, &args.user).await?;
    let mut receiver =
        world.join(coordinator.establish(&args.peer).await?, &args.peer, &args.peer).await?;

    let captured = sender.send_text("transfer 100 coins").await?;
    report(receiver.next().await, "original");

    world.hub().publish(captured.clone()).await?;
    report(receiver.next().await, "replayed");

    let mut backdated = captured.clone();
    backdated.nonce = env.random_uuid();
    backdated.timestamp = env.wall_clock_millis().saturating_sub(millis(Duration::from_secs(25)));
    world.hub().publish(backdated).await?;
    report(receiver.next().await, "backdated");

    let mut renonced = captured;
    renonced.nonce = env.random_uuid();
    renonced.timestamp = env.wall_clock_millis();
    world.hub().publish(renonced).await?;
    report(receiver.next().await, "re-nonced");

    Ok(())
}

fn report(message: Option<Opened>, label: &str) {
    match message {
        Some(Opened::Rejected { error, .. }) => warn!(label, %error, "envelope rejected"),
        Some(Opened::Undecryptable { error, .. }) => {
            warn!(label, %error, "envelope failed authentication");
        },
        Some(message) => info!(label, text = %message.display_text(), "envelope accepted"),
        None => warn!(label, "hub closed"),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
