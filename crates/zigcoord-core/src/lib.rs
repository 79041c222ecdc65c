// zigcoord-core: Coordinator lifecycle, discovery, registry and report multiplexing.

pub mod command;
pub mod config;
pub mod coordinator;
mod discovery;
pub mod error;
pub mod model;
pub mod proxy;
pub mod registry;
pub mod reporting;
mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult};
pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use error::CoreError;
pub use proxy::{AttributeHandle, AttributeProxy, ClusterHandle};
pub use registry::{DeviceHandler, DeviceRegistry, RegistryChange};
pub use reporting::{ReportListener, ReportingHub};
pub use stream::{DeviceSnapshot, DeviceStream};

pub use model::{
    AttributeKey, AttributeReport, AttributeValue, ClusterCommand, ClusterId, ClusterInfo,
    CoordinatorEvent, Device, DeviceIdentity, DeviceInfo, DeviceKey, DeviceState, ListenerId,
    NetworkState, NodeAddress, ReportingConfig,
};
