// ── Wire-level identity and value types ──
//
// Everything the transport hands across the boundary: node addresses,
// cluster/attribute keys, decoded attribute values, and the static shape
// of a device as the radio enumerated it.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ── NodeAddress ─────────────────────────────────────────────────────

/// 64-bit IEEE node address, normalized to lowercase colon-separated hex
/// (`00:15:8d:00:01:02:03:04`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Accepts colon-separated, dash-separated, `0x`-prefixed or bare hex.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        let trimmed = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let lowered = trimmed.to_lowercase().replace('-', ":");

        if !lowered.contains(':')
            && lowered.len() == 16
            && lowered.chars().all(|c| c.is_ascii_hexdigit())
        {
            let pairs: Vec<&str> = (0..8).filter_map(|i| lowered.get(i * 2..i * 2 + 2)).collect();
            return Self(pairs.join(":"));
        }
        Self(lowered)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<String> for NodeAddress {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for NodeAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<NodeAddress> for String {
    fn from(a: NodeAddress) -> Self {
        a.0
    }
}

// ── ClusterId ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub u16);

impl ClusterId {
    /// Basic cluster: manufacturer name and model identifier live here.
    pub const BASIC: Self = Self(0x0000);
    pub const ON_OFF: Self = Self(0x0006);
    pub const LEVEL_CONTROL: Self = Self(0x0008);
    pub const TEMPERATURE_MEASUREMENT: Self = Self(0x0402);
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl FromStr for ClusterId {
    type Err = ParseIntError;

    /// Parses `0x0402` style hex or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u16::from_str_radix(hex, 16).map(Self),
            None => s.parse().map(Self),
        }
    }
}

impl From<u16> for ClusterId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

// ── AttributeKey ────────────────────────────────────────────────────

/// Composite key for a single attribute: node, cluster, and the attribute's
/// position in the cluster's attribute list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeKey {
    pub address: NodeAddress,
    pub cluster: ClusterId,
    pub index: u16,
}

impl AttributeKey {
    pub fn new(address: NodeAddress, cluster: ClusterId, index: u16) -> Self {
        Self {
            address,
            cluster,
            index,
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.address, self.cluster, self.index)
    }
}

// ── AttributeValue ──────────────────────────────────────────────────

/// A decoded attribute value. The codec resolves the wire type once; nothing
/// above the transport inspects raw frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view, used for reportable-change comparisons.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Unsigned(v) => Some(*v as f64),
            Self::Signed(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        Self::Unsigned(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

// ── Device shape ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub id: u16,
    pub name: String,
}

impl AttributeDescriptor {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A cluster and its attributes; an attribute's index is its position in
/// `attributes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub id: ClusterId,
    pub attributes: Vec<AttributeDescriptor>,
}

impl ClusterInfo {
    pub fn new(id: ClusterId, attributes: Vec<AttributeDescriptor>) -> Self {
        Self { id, attributes }
    }

    /// The Basic cluster with its standard leading attributes, so that
    /// manufacturer sits at index 4 and model at index 5.
    pub fn basic() -> Self {
        Self::new(
            ClusterId::BASIC,
            vec![
                AttributeDescriptor::new(0x0000, "zcl_version"),
                AttributeDescriptor::new(0x0001, "application_version"),
                AttributeDescriptor::new(0x0002, "stack_version"),
                AttributeDescriptor::new(0x0003, "hw_version"),
                AttributeDescriptor::new(0x0004, "manufacturer_name"),
                AttributeDescriptor::new(0x0005, "model_identifier"),
            ],
        )
    }

    pub fn attribute(&self, index: u16) -> Option<&AttributeDescriptor> {
        self.attributes.get(usize::from(index))
    }
}

/// A device as the transport enumerated it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub address: NodeAddress,
    pub profile_id: u16,
    pub device_type: u16,
    pub clusters: Vec<ClusterInfo>,
}

impl DeviceInfo {
    pub fn cluster(&self, id: ClusterId) -> Option<&ClusterInfo> {
        self.clusters.iter().find(|c| c.id == id)
    }
}

/// Device lifecycle notifications published by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Added(DeviceInfo),
    Updated(DeviceInfo),
    Removed(DeviceInfo),
}

impl DeviceEvent {
    pub fn device(&self) -> &DeviceInfo {
        match self {
            Self::Added(d) | Self::Updated(d) | Self::Removed(d) => d,
        }
    }
}

// ── Network ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkParameters {
    pub pan_id: u16,
    pub channel: u8,
}

impl fmt::Display for NetworkParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pan {:#06x} channel {}", self.pan_id, self.channel)
    }
}

/// An opaque cluster command; encoding is the codec's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCommand {
    pub cluster: ClusterId,
    pub command: u8,
    pub payload: Bytes,
}

impl ClusterCommand {
    pub fn new(cluster: ClusterId, command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            cluster,
            command,
            payload: payload.into(),
        }
    }
}

// ── Reporting ───────────────────────────────────────────────────────

/// Hardware reporting parameters for one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub reportable_change: f64,
    /// Push this configuration even when the reporter is already active.
    pub overwrite: bool,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(300),
            reportable_change: 1.0,
            overwrite: false,
        }
    }
}

/// Process-unique identity of a report listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One ingestion of attribute updates; a batch may span several attributes
/// of the same node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportBatch {
    entries: Vec<(AttributeKey, AttributeValue)>,
}

impl ReportBatch {
    pub fn new(entries: Vec<(AttributeKey, AttributeValue)>) -> Self {
        Self { entries }
    }

    pub fn single(key: AttributeKey, value: AttributeValue) -> Self {
        Self {
            entries: vec![(key, value)],
        }
    }

    pub fn get(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(AttributeKey, AttributeValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn node_address_normalizes_common_formats() {
        let expected = "00:15:8d:00:01:02:03:04";
        assert_eq!(NodeAddress::new("00:15:8D:00:01:02:03:04").as_str(), expected);
        assert_eq!(NodeAddress::new("00-15-8d-00-01-02-03-04").as_str(), expected);
        assert_eq!(NodeAddress::new("00158D0001020304").as_str(), expected);
        assert_eq!(NodeAddress::new("0x00158d0001020304").as_str(), expected);
    }

    #[test]
    fn node_address_serde_normalizes() {
        let addr: NodeAddress = serde_json::from_str("\"00158D0001020304\"").unwrap();
        assert_eq!(addr.as_str(), "00:15:8d:00:01:02:03:04");
        assert_eq!(
            serde_json::to_string(&addr).unwrap(),
            "\"00:15:8d:00:01:02:03:04\""
        );
    }

    #[test]
    fn cluster_id_parses_hex_and_decimal() {
        assert_eq!("0x0402".parse::<ClusterId>().unwrap(), ClusterId(0x0402));
        assert_eq!("6".parse::<ClusterId>().unwrap(), ClusterId::ON_OFF);
        assert!("zz".parse::<ClusterId>().is_err());
        assert_eq!(ClusterId::LEVEL_CONTROL.to_string(), "0x0008");
    }

    #[test]
    fn basic_cluster_places_identity_attributes() {
        let basic = ClusterInfo::basic();
        assert_eq!(basic.attribute(4).unwrap().name, "manufacturer_name");
        assert_eq!(basic.attribute(5).unwrap().name, "model_identifier");
        assert!(basic.attribute(6).is_none());
    }

    #[test]
    fn attribute_value_untagged_deserialization() {
        let values: Vec<AttributeValue> =
            serde_json::from_str(r#"[true, 42, -3, 21.5, "IKEA"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                AttributeValue::Bool(true),
                AttributeValue::Unsigned(42),
                AttributeValue::Signed(-3),
                AttributeValue::Float(21.5),
                AttributeValue::Text("IKEA".into()),
            ]
        );
    }

    #[test]
    fn report_batch_lookup() {
        let key = AttributeKey::new(NodeAddress::new("0011223344556677"), ClusterId::ON_OFF, 0);
        let batch = ReportBatch::single(key.clone(), AttributeValue::Bool(true));
        assert_eq!(batch.get(&key), Some(&AttributeValue::Bool(true)));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn listener_ids_are_unique() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert_ne!(a, b);
    }
}
