use serde::{Deserialize, Serialize};

/// Where the coordinator is in bringing its network up.
///
/// Moves forward within one bring-up attempt; `Failed` falls back to
/// `Initializing` on the next retry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum NetworkState {
    #[default]
    Disconnected,
    Initializing,
    /// The radio holds a different network and will be erased.
    ResetPending,
    Discovering,
    Ready,
    Failed {
        reason: String,
    },
}

impl NetworkState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Short human label, with the failure reason when there is one.
    pub fn describe(&self) -> String {
        match self {
            Self::Failed { reason } => format!("failed ({reason})"),
            other => other.to_string(),
        }
    }
}
