//! Chat transport payloads.
//!
//! Every envelope carries the sender, a freshness nonce and timestamp, and a
//! [`ChatBody`] selected by the `type` field. File metadata (name, mime type,
//! size) travels in the clear next to the ciphertext.

use serde::{Deserialize, Serialize};

use crate::b64;

/// A chat message in transit, outgoing or incoming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEnvelope {
    /// Stable sender id
    pub sender_id: String,
    /// Sender display name
    pub sender: String,
    /// Random uuid-v4 nonce for replay detection
    pub nonce: String,
    /// Epoch milliseconds at send time
    pub timestamp: u64,
    /// Encrypted payload
    #[serde(flatten)]
    pub body: ChatBody,
}

/// Encrypted payload, dispatched on `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatBody {
    /// UTF-8 text encrypted under the group key
    Text {
        /// AES-GCM IV
        #[serde(with = "b64")]
        iv: Vec<u8>,
        /// Ciphertext with tag
        #[serde(with = "b64")]
        ciphertext: Vec<u8>,
    },
    /// File bytes encrypted under the group key
    File {
        /// Original file name (unencrypted)
        #[serde(rename = "fileName")]
        file_name: String,
        /// MIME type (unencrypted)
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// Plaintext size in bytes (unencrypted)
        size: u64,
        /// AES-GCM IV
        #[serde(with = "b64")]
        iv: Vec<u8>,
        /// Ciphertext with tag
        #[serde(with = "b64")]
        ciphertext: Vec<u8>,
    },
}

impl ChatBody {
    /// IV of either variant.
    pub fn iv(&self) -> &[u8] {
        match self {
            Self::Text { iv, .. } | Self::File { iv, .. } => iv,
        }
    }

    /// Ciphertext of either variant.
    pub fn ciphertext(&self) -> &[u8] {
        match self {
            Self::Text { ciphertext, .. } | Self::File { ciphertext, .. } => ciphertext,
        }
    }
}
