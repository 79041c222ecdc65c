// ── Device domain types ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zigcoord_api::{ClusterId, ClusterInfo, DeviceInfo, NodeAddress};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Online,
    /// Known, but the network is not up.
    Unreachable,
    /// Left the network. Kept so earlier snapshots stay meaningful.
    Removed,
}

/// Registry key for a device and its handler registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(NodeAddress);

impl DeviceKey {
    pub fn address(&self) -> &NodeAddress {
        &self.0
    }
}

impl From<NodeAddress> for DeviceKey {
    fn from(address: NodeAddress) -> Self {
        Self(address)
    }
}

impl From<&NodeAddress> for DeviceKey {
    fn from(address: &NodeAddress) -> Self {
        Self(address.clone())
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Identity ─────────────────────────────────────────────────────────

/// Manufacturer and model as read from the Basic cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl DeviceIdentity {
    /// Trims both fields; blank strings count as absent, and a model without
    /// a manufacturer is dropped.
    pub fn new(manufacturer: Option<&str>, model: Option<&str>) -> Self {
        let manufacturer = non_blank(manufacturer);
        let model = manufacturer.as_ref().and(non_blank(model));
        Self {
            manufacturer,
            model,
        }
    }

    /// `manufacturer:model`, or just the manufacturer.
    pub fn description(&self) -> Option<String> {
        match (&self.manufacturer, &self.model) {
            (Some(manufacturer), Some(model)) => Some(format!("{manufacturer}:{model}")),
            (Some(manufacturer), None) => Some(manufacturer.clone()),
            (None, _) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        self.manufacturer.is_some()
    }
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

// ── Device ───────────────────────────────────────────────────────────

/// A device as the registry tracks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub address: NodeAddress,
    pub profile_id: u16,
    pub device_type: u16,
    pub clusters: Vec<ClusterInfo>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub description: Option<String>,
    pub state: DeviceState,
    pub first_seen: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub(crate) fn discovered(info: &DeviceInfo, identity: &DeviceIdentity) -> Self {
        let now = Utc::now();
        Self {
            address: info.address.clone(),
            profile_id: info.profile_id,
            device_type: info.device_type,
            clusters: info.clusters.clone(),
            manufacturer: identity.manufacturer.clone(),
            model: identity.model.clone(),
            description: identity.description(),
            state: DeviceState::Online,
            first_seen: now,
            updated_at: now,
        }
    }

    /// Fold a fresh enumeration into this record. Identity already learned
    /// is kept when the new reads came back empty.
    pub(crate) fn merged(&self, info: &DeviceInfo, identity: &DeviceIdentity) -> Self {
        let identity = if identity.is_known() {
            identity.clone()
        } else {
            self.identity()
        };
        Self {
            first_seen: self.first_seen,
            ..Self::discovered(info, &identity)
        }
    }

    pub(crate) fn with_state(&self, state: DeviceState) -> Self {
        Self {
            state,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn key(&self) -> DeviceKey {
        DeviceKey::from(&self.address)
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.state != DeviceState::Removed
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&ClusterInfo> {
        self.clusters.iter().find(|c| c.id == id)
    }

    /// Equal apart from timestamps.
    pub(crate) fn same_shape(&self, other: &Self) -> bool {
        self.profile_id == other.profile_id
            && self.device_type == other.device_type
            && self.clusters == other.clusters
            && self.description == other.description
            && self.state == other.state
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn info() -> DeviceInfo {
        DeviceInfo {
            address: NodeAddress::new("0011223344556677"),
            profile_id: 0x0104,
            device_type: 0x0100,
            clusters: vec![ClusterInfo::basic()],
        }
    }

    #[test]
    fn description_joins_manufacturer_and_model() {
        let identity = DeviceIdentity::new(Some(" IKEA "), Some("TRADFRI bulb "));
        assert_eq!(identity.description().unwrap(), "IKEA:TRADFRI bulb");
    }

    #[test]
    fn description_falls_back_to_manufacturer() {
        let identity = DeviceIdentity::new(Some("Philips"), Some("   "));
        assert_eq!(identity.description().unwrap(), "Philips");
    }

    #[test]
    fn blank_manufacturer_means_unknown() {
        let identity = DeviceIdentity::new(Some(""), Some("lamp"));
        assert_eq!(identity, DeviceIdentity::default());
        assert!(identity.description().is_none());
    }

    #[test]
    fn merge_keeps_first_seen_and_known_identity() {
        let first = Device::discovered(&info(), &DeviceIdentity::new(Some("IKEA"), None));
        let merged = first.merged(&info(), &DeviceIdentity::default());
        assert_eq!(merged.first_seen, first.first_seen);
        assert_eq!(merged.description.as_deref(), Some("IKEA"));
        assert!(merged.same_shape(&first));
    }

    #[test]
    fn device_state_parses_case_insensitively() {
        assert_eq!(DeviceState::from_str("Online").unwrap(), DeviceState::Online);
        assert_eq!(DeviceState::Unreachable.to_string(), "unreachable");
    }
}
