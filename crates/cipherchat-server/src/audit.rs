//! Security audit log
//!
//! Every responder decision is recorded as a [`SecurityEvent`] and mirrored
//! to `tracing`. The log is bounded: once full, the oldest entry is dropped.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Mutex, PoisonError},
};

use serde::Serialize;
use tracing::{info, warn};

/// Default number of retained events
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

/// Outcome of a responder decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Request accepted
    Ok,
    /// Signature or key material rejected
    Failed,
    /// Confirmation tag did not decrypt to the expected payload
    DecryptFailed,
    /// Timestamp outside the freshness window
    TimestampExpired,
    /// Nonce already used
    DuplicateNonce,
    /// Confirm for an unknown or expired handshake id
    UnknownHandshake,
    /// Endpoint disabled by configuration
    Disabled,
}

impl AuditStatus {
    /// Wire label, as used in remote rejections.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::DecryptFailed => "decrypt_failed",
            Self::TimestampExpired => "timestamp_expired",
            Self::DuplicateNonce => "duplicate_nonce",
            Self::UnknownHandshake => "unknown_handshake",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityEvent {
    /// Epoch milliseconds
    pub timestamp: u64,
    /// Endpoint or step name (`initiate`, `confirm`, ...)
    pub event: String,
    /// Outcome
    pub status: AuditStatus,
    /// Free-form context (handshake id, reason, algorithm)
    pub details: serde_json::Value,
}

/// Bounded, shared audit log.
#[derive(Debug)]
pub struct SecurityLog {
    capacity: usize,
    entries: Mutex<VecDeque<SecurityEvent>>,
}

impl SecurityLog {
    /// Create a log retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Mutex::new(VecDeque::new()) }
    }

    /// Append an event.
    pub fn record(&self, event: SecurityEvent) {
        if event.status == AuditStatus::Ok {
            info!(event = %event.event, status = %event.status, details = %event.details, "security event");
        } else {
            warn!(event = %event.event, status = %event.status, details = %event.details, "security event");
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    /// All retained events, newest first.
    pub fn entries(&self) -> Vec<SecurityEvent> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().cloned().collect()
    }

    /// Number of retained events with `status`.
    pub fn count(&self, status: AuditStatus) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().filter(|e| e.status == status).count()
    }

    /// Retained events as a JSON array, newest first.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if an event cannot be encoded.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.entries())
    }
}

impl Default for SecurityLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
