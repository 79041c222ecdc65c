// ── Upstream event types ──

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use zigcoord_api::{AttributeKey, AttributeValue};

use super::device::Device;
use super::network::NetworkState;

/// A single attribute update, as handed to report listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeReport {
    pub key: AttributeKey,
    pub value: AttributeValue,
    pub received_at: DateTime<Utc>,
}

impl AttributeReport {
    pub fn new(key: AttributeKey, value: AttributeValue) -> Self {
        Self {
            key,
            value,
            received_at: Utc::now(),
        }
    }
}

/// Everything the coordinator broadcasts on its event bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    NetworkStatus {
        state: NetworkState,
    },
    DeviceAdded {
        device: Arc<Device>,
        description: Option<String>,
    },
    DeviceUpdated {
        device: Arc<Device>,
    },
    DeviceRemoved {
        device: Arc<Device>,
    },
    AttributeReport(AttributeReport),
}

impl CoordinatorEvent {
    /// The device this event concerns, if any.
    pub fn device(&self) -> Option<&Arc<Device>> {
        match self {
            Self::DeviceAdded { device, .. }
            | Self::DeviceUpdated { device }
            | Self::DeviceRemoved { device } => Some(device),
            Self::NetworkStatus { .. } | Self::AttributeReport(_) => None,
        }
    }
}
