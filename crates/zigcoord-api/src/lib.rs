// zigcoord-api: Transport boundary for ZigBee-class mesh coordinators

pub mod error;
pub mod transport;
pub mod types;
pub mod virtual_radio;

pub use error::TransportError;
pub use transport::{ReportSink, Reporter, Transport};
pub use types::{
    AttributeDescriptor, AttributeKey, AttributeValue, ClusterCommand, ClusterId, ClusterInfo,
    DeviceEvent, DeviceInfo, ListenerId, NetworkParameters, NodeAddress, ReportBatch,
    ReportingConfig,
};
pub use virtual_radio::{VirtualDevice, VirtualRadio};
