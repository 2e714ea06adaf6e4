//! Message channel
//!
//! Per-message AES-256-GCM under the group key, plus replay filtering of
//! inbound envelopes. Each message is independent: a fresh random IV per
//! message, and a message that fails the replay guard or fails to decrypt is
//! reported as its own [`Opened`] item without affecting the next one.
//!
//! Sender, nonce, timestamp, and file name/MIME type/size travel in the
//! clear next to the ciphertext but are bound to it as associated data.
//! Altering any of them makes the envelope undecryptable, so a captured
//! message cannot be re-nonced past the replay guard or relabelled.

use std::sync::Arc;

use cipherchat_crypto::{
    GroupKey, IV_SIZE, decrypt, decrypt_with_aad, encrypt, encrypt_with_aad,
};
use cipherchat_proto::{ChatBody, ChatEnvelope};
use thiserror::Error;
use tracing::warn;

use crate::{
    env::Environment,
    replay::{ReplayGuard, ReplayRejectedError},
};

/// Text shown in place of a message that could not be decrypted.
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "**Decryption Failed**";

/// Prefix of every envelope's associated data
const ENVELOPE_AAD_LABEL: &[u8] = b"cipherchat envelope v1";

/// A single message could not be decrypted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("message undecryptable: {reason}")]
pub struct DecryptionFailedError {
    /// Underlying AEAD failure
    pub reason: String,
}

/// Output of [`MessageChannel::encrypt_message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Fresh random IV
    pub iv: [u8; IV_SIZE],
    /// Ciphertext with appended tag
    pub ciphertext: Vec<u8>,
}

/// Output of [`MessageChannel::decrypt_message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    /// Authenticated plaintext
    Plaintext(Vec<u8>),
    /// Sentinel for a message that failed authentication
    Undecryptable,
}

/// File to send over the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    /// Original file name
    pub file_name: String,
    /// MIME type
    pub mime_type: String,
    /// Raw contents
    pub bytes: Vec<u8>,
}

/// One inbound envelope, ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opened {
    /// Decrypted text message
    Text {
        /// Sender user id
        sender_id: String,
        /// Sender display name
        sender: String,
        /// Message text
        text: String,
    },
    /// Decrypted file
    File {
        /// Sender user id
        sender_id: String,
        /// Sender display name
        sender: String,
        /// Attached file
        attachment: FileAttachment,
    },
    /// Fresh, but failed to authenticate. Its nonce is not recorded.
    Undecryptable {
        /// Sender user id
        sender_id: String,
        /// Sender display name
        sender: String,
        /// AEAD failure
        error: DecryptionFailedError,
    },
    /// Stale or duplicate envelope; never displayed
    Rejected {
        /// Claimed sender user id
        sender_id: String,
        /// Replay guard verdict
        error: ReplayRejectedError,
    },
}

impl Opened {
    /// Text to render for this item.
    pub fn display_text(&self) -> String {
        match self {
            Self::Text { text, .. } => text.clone(),
            Self::File { attachment, .. } => format!(
                "[file {} ({}, {} bytes)]",
                attachment.file_name,
                attachment.mime_type,
                attachment.bytes.len()
            ),
            Self::Undecryptable { .. } => UNDECRYPTABLE_PLACEHOLDER.to_owned(),
            Self::Rejected { error, .. } => format!("[rejected: {error}]"),
        }
    }
}

/// Encrypts and opens chat messages under one group key.
pub struct MessageChannel<E: Environment> {
    env: E,
    group_key: GroupKey,
    replay: Arc<ReplayGuard>,
}

impl<E: Environment> MessageChannel<E> {
    /// Create a channel. `replay` may be shared with other channels of the
    /// same receiver.
    pub fn new(env: E, group_key: GroupKey, replay: Arc<ReplayGuard>) -> Self {
        Self { env, group_key, replay }
    }

    /// Encrypt `plaintext` with a fresh IV.
    pub fn encrypt_message(&self, plaintext: &[u8]) -> Sealed {
        let mut iv = [0u8; IV_SIZE];
        self.env.random_bytes(&mut iv);
        let ciphertext = encrypt(self.group_key.key(), &iv, plaintext);
        Sealed { iv, ciphertext }
    }

    /// Decrypt, mapping any failure to [`Decrypted::Undecryptable`].
    pub fn decrypt_message(&self, iv: &[u8], ciphertext: &[u8]) -> Decrypted {
        match self.try_decrypt_message(iv, ciphertext) {
            Ok(plaintext) => Decrypted::Plaintext(plaintext),
            Err(_) => Decrypted::Undecryptable,
        }
    }

    /// Decrypt, reporting the failure reason.
    ///
    /// # Errors
    ///
    /// `DecryptionFailedError` on a bad IV, wrong key or tampered ciphertext.
    pub fn try_decrypt_message(
        &self,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, DecryptionFailedError> {
        decrypt(self.group_key.key(), iv, ciphertext)
            .map_err(|e| DecryptionFailedError { reason: e.to_string() })
    }

    /// Encrypt a text message into an envelope with a fresh nonce and the
    /// current timestamp.
    pub fn seal_text(&self, sender_id: &str, sender: &str, text: &str) -> ChatEnvelope {
        let body = ChatBody::Text { iv: Vec::new(), ciphertext: Vec::new() };
        self.seal(sender_id, sender, body, text.as_bytes())
    }

    /// Encrypt a file into an envelope. Only the contents are encrypted.
    pub fn seal_file(&self, sender_id: &str, sender: &str, file: &FileAttachment) -> ChatEnvelope {
        let body = ChatBody::File {
            file_name: file.file_name.clone(),
            mime_type: file.mime_type.clone(),
            size: u64::try_from(file.bytes.len()).unwrap_or(u64::MAX),
            iv: Vec::new(),
            ciphertext: Vec::new(),
        };
        self.seal(sender_id, sender, body, &file.bytes)
    }

    /// Authenticate, replay-check and decrypt an inbound envelope.
    ///
    /// Stale envelopes are rejected up front. The nonce is recorded only
    /// once the envelope authenticates, so a forgery cannot use up the nonce
    /// of a genuine message.
    pub fn open(&self, envelope: &ChatEnvelope, now_ms: u64) -> Opened {
        let ChatEnvelope { sender_id, sender, nonce, timestamp, body } = envelope;

        if self.replay.is_stale(*timestamp, now_ms) {
            return rejected(sender_id, ReplayRejectedError::Stale { nonce: nonce.clone() });
        }

        let aad = associated_data(envelope);
        let key = self.group_key.key();
        let plaintext = match decrypt_with_aad(key, body.iv(), body.ciphertext(), &aad) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                let error = DecryptionFailedError { reason: e.to_string() };
                warn!(%sender_id, %nonce, reason = %error.reason, "message undecryptable");
                return Opened::Undecryptable {
                    sender_id: sender_id.clone(),
                    sender: sender.clone(),
                    error,
                };
            },
        };

        if let Err(error) = self.replay.admit(nonce, *timestamp, now_ms).into_result(nonce) {
            return rejected(sender_id, error);
        }

        match body {
            ChatBody::Text { .. } => Opened::Text {
                sender_id: sender_id.clone(),
                sender: sender.clone(),
                text: String::from_utf8_lossy(&plaintext).into_owned(),
            },
            ChatBody::File { file_name, mime_type, .. } => Opened::File {
                sender_id: sender_id.clone(),
                sender: sender.clone(),
                attachment: FileAttachment {
                    file_name: file_name.clone(),
                    mime_type: mime_type.clone(),
                    bytes: plaintext,
                },
            },
        }
    }

    /// Fill `body`'s IV and ciphertext, authenticating the rest of the
    /// envelope.
    fn seal(
        &self,
        sender_id: &str,
        sender: &str,
        body: ChatBody,
        plaintext: &[u8],
    ) -> ChatEnvelope {
        let mut envelope = ChatEnvelope {
            sender_id: sender_id.to_owned(),
            sender: sender.to_owned(),
            nonce: self.env.random_uuid(),
            timestamp: self.env.wall_clock_millis(),
            body,
        };

        let mut iv = [0u8; IV_SIZE];
        self.env.random_bytes(&mut iv);
        let aad = associated_data(&envelope);
        let sealed = encrypt_with_aad(self.group_key.key(), &iv, plaintext, &aad);

        match &mut envelope.body {
            ChatBody::Text { iv: slot, ciphertext }
            | ChatBody::File { iv: slot, ciphertext, .. } => {
                *slot = iv.to_vec();
                *ciphertext = sealed;
            },
        }
        envelope
    }
}

fn rejected(sender_id: &str, error: ReplayRejectedError) -> Opened {
    warn!(%sender_id, reason = %error, "rejected inbound message");
    Opened::Rejected { sender_id: sender_id.to_owned(), error }
}

/// Everything in the envelope except IV and ciphertext. Fields are
/// length-prefixed so distinct envelopes never share an encoding.
fn associated_data(envelope: &ChatEnvelope) -> Vec<u8> {
    let mut aad = Vec::with_capacity(128);
    aad.extend_from_slice(ENVELOPE_AAD_LABEL);
    push_field(&mut aad, envelope.sender_id.as_bytes());
    push_field(&mut aad, envelope.sender.as_bytes());
    push_field(&mut aad, envelope.nonce.as_bytes());
    aad.extend_from_slice(&envelope.timestamp.to_be_bytes());

    match &envelope.body {
        ChatBody::Text { .. } => push_field(&mut aad, b"text"),
        ChatBody::File { file_name, mime_type, size, .. } => {
            push_field(&mut aad, b"file");
            push_field(&mut aad, file_name.as_bytes());
            push_field(&mut aad, mime_type.as_bytes());
            aad.extend_from_slice(&size.to_be_bytes());
        },
    }
    aad
}

fn push_field(aad: &mut Vec<u8>, bytes: &[u8]) {
    let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    aad.extend_from_slice(&len.to_be_bytes());
    aad.extend_from_slice(bytes);
}
