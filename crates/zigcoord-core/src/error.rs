// ── Core error types ──
//
// Errors callers of the coordinator can observe. Radio failures during
// bring-up never surface here; the lifecycle controller absorbs them and
// retries. The `From<TransportError>` impl covers command and subscription
// paths where a transport failure is the caller's business.

use thiserror::Error;
use zigcoord_api::{AttributeKey, TransportError};

use crate::model::NetworkState;

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Invalid coordinator configuration: {message}")]
    Config { message: String },

    #[error("Coordinator is already running")]
    AlreadyRunning,

    #[error("Network not ready (currently {state})")]
    NetworkNotReady { state: NetworkState },

    #[error("Coordinator stopped")]
    Disconnected,

    #[error("Timed out after {timeout_secs}s waiting for the network")]
    Timeout { timeout_secs: u64 },

    // ── Lookup errors ────────────────────────────────────────────────
    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Cannot subscribe to {key}: {reason}")]
    Subscription { key: AttributeKey, reason: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn not_found(entity: &'static str, identifier: impl ToString) -> Self {
        Self::NotFound {
            entity,
            identifier: identifier.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<TransportError> for CoreError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::UnknownDevice { address } => Self::not_found("Device", address),
            TransportError::UnknownAttribute { key } => Self::not_found("Attribute", key),
            TransportError::Closed => Self::Disconnected,
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}
