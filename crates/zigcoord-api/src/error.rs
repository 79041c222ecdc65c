use thiserror::Error;

use crate::types::{AttributeKey, NodeAddress};

/// Failure modes of a radio transport.
///
/// The coordinator core maps these into `CoreError` for callers; the
/// lifecycle controller treats every variant as retryable.
#[derive(Debug, Error)]
pub enum TransportError {
    // ── Hardware ────────────────────────────────────────────────────
    /// The radio could not be opened (unplugged, busy, wrong port).
    #[error("Radio hardware unavailable: {reason}")]
    HardwareUnavailable { reason: String },

    /// An operation needed an open network but the transport is closed.
    #[error("Transport is not open")]
    NotOpen,

    /// The radio did not answer in time.
    #[error("Radio timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The radio or the remote node refused the request.
    #[error("Request rejected: {reason}")]
    Rejected { reason: String },

    // ── Lookup ──────────────────────────────────────────────────────
    #[error("Unknown device: {address}")]
    UnknownDevice { address: NodeAddress },

    #[error("Unknown attribute: {key}")]
    UnknownAttribute { key: AttributeKey },

    // ── Lifecycle ───────────────────────────────────────────────────
    /// The transport has been shut down.
    #[error("Transport closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether a later attempt at the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::HardwareUnavailable { .. } | Self::Timeout { .. } | Self::NotOpen | Self::Io(_)
        )
    }
}
