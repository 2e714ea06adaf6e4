//! Property tests for chat delivery

use cipherchat_client::HandshakeConfig;
use cipherchat_core::{MemoryStore, Opened};
use cipherchat_harness::{SimEnv, World};
use cipherchat_server::ResponderConfig;
use proptest::prelude::*;

fn deliver(seed: u64, texts: &[String]) -> Vec<String> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    runtime.block_on(async {
        let world = World::new(SimEnv::with_seed(seed), ResponderConfig::default()).unwrap();
        let coordinator = world.coordinator(MemoryStore::new(), HandshakeConfig::default());
        let alice =
            world.join(coordinator.establish("u1").await.unwrap(), "u1", "alice").await.unwrap();
        let mut bob =
            world.join(coordinator.establish("u2").await.unwrap(), "u2", "bob").await.unwrap();

        let mut received = Vec::new();
        for text in texts {
            alice.send_text(text).await.unwrap();
            match bob.next().await.unwrap() {
                Opened::Text { text, .. } => received.push(text),
                other => panic!("expected text, got {other:?}"),
            }
        }
        received
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn every_message_arrives_once_and_intact(
        seed in any::<u64>(),
        texts in prop::collection::vec(".{0,64}", 1..8),
    ) {
        prop_assert_eq!(deliver(seed, &texts), texts);
    }
}
