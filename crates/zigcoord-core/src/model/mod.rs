// ── Coordinator domain model ──
//
// Registry-side views of devices, the network state machine, and the events
// the coordinator publishes upstream. Wire-level identity types come from
// `zigcoord-api` and are re-exported here for flat access.

pub mod device;
pub mod event;
pub mod network;

pub use device::{Device, DeviceIdentity, DeviceKey, DeviceState};
pub use event::{AttributeReport, CoordinatorEvent};
pub use network::NetworkState;

pub use zigcoord_api::{
    AttributeKey, AttributeValue, ClusterCommand, ClusterId, ClusterInfo, DeviceInfo, ListenerId,
    NodeAddress, ReportingConfig,
};
