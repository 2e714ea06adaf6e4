//! Property tests for wire decoding
//!
//! Bodies arrive from an untrusted network; decoding must reject garbage
//! with an error and never panic.

use cipherchat_proto::{
    ChatBody, ChatEnvelope, ConfirmResponse, InitiateResponse, ProtocolError, decode, encode,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode::<ChatEnvelope>(&bytes);
        let _ = decode::<InitiateResponse>(&bytes);
        let _ = decode::<ConfirmResponse>(&bytes);
    }

    #[test]
    fn unknown_body_types_are_rejected(tag in "[a-z]{1,12}") {
        prop_assume!(tag != "text" && tag != "file");
        let json = format!(
            r#"{{"senderId":"u1","sender":"a","nonce":"n","timestamp":1,"type":"{tag}","iv":"AA==","ciphertext":"AA=="}}"#
        );

        let result = decode::<ChatEnvelope>(json.as_bytes());
        prop_assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn file_metadata_travels_in_the_clear(
        file_name in "[^\"\\\\]{1,40}",
        mime_type in "[a-z]{1,10}/[a-z]{1,10}",
        size in any::<u64>(),
    ) {
        let envelope = ChatEnvelope {
            sender_id: "u1".into(),
            sender: "alice".into(),
            nonce: "n".into(),
            timestamp: 1,
            body: ChatBody::File {
                file_name: file_name.clone(),
                mime_type: mime_type.clone(),
                size,
                iv: vec![0; 12],
                ciphertext: vec![1; 32],
            },
        };

        let json: serde_json::Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();

        prop_assert_eq!(json["type"].as_str(), Some("file"));
        prop_assert_eq!(json["fileName"].as_str(), Some(file_name.as_str()));
        prop_assert_eq!(json["mimeType"].as_str(), Some(mime_type.as_str()));
        prop_assert_eq!(json["size"].as_u64(), Some(size));
    }
}
