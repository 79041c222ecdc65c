// ── Transport traits ──
//
// The radio side of the coordinator. A `Transport` owns the hardware, the
// device enumeration, and one `Reporter` per reportable attribute.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::types::{
    AttributeKey, AttributeValue, ClusterCommand, DeviceEvent, DeviceInfo, ListenerId,
    NetworkParameters, NodeAddress, ReportBatch, ReportingConfig,
};

/// Receives attribute update batches from a reporter.
///
/// Called on the transport's ingestion path; implementations must not block.
pub trait ReportSink: Send + Sync {
    fn received_report(&self, batch: &ReportBatch);
}

/// Hardware reporting for a single attribute.
///
/// The transport owns reporters and hands out shared references. The first
/// registered listener activates the hardware report path; `clear` tears it
/// down and restores the default configuration.
#[async_trait]
pub trait Reporter: Send + Sync {
    fn key(&self) -> &AttributeKey;

    fn is_active(&self) -> bool;

    fn listener_count(&self) -> usize;

    fn configuration(&self) -> ReportingConfig;

    /// Push reporting parameters to the node.
    async fn configure(&self, config: &ReportingConfig) -> Result<(), TransportError>;

    async fn add_listener(
        &self,
        id: ListenerId,
        sink: Arc<dyn ReportSink>,
    ) -> Result<(), TransportError>;

    /// Returns `false` if `id` was not registered.
    async fn remove_listener(&self, id: ListenerId) -> bool;

    async fn clear(&self) -> Result<(), TransportError>;
}

/// A coordinator radio.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open_hardware(&self) -> Result<(), TransportError>;

    /// PAN id and channel the radio currently holds.
    async fn network_parameters(&self) -> Result<NetworkParameters, TransportError>;

    /// Bring the network up on `params`. With `reset` set the radio erases
    /// its stored network first and adopts `params`. `Ok(false)` means the
    /// radio declined to start.
    async fn initialize_network(
        &self,
        params: NetworkParameters,
        reset: bool,
    ) -> Result<bool, TransportError>;

    fn is_initial_browsing_complete(&self) -> bool;

    fn devices(&self) -> Vec<DeviceInfo>;

    fn device(&self, address: &NodeAddress) -> Option<DeviceInfo>;

    /// Fetch a value from the node. `Ok(None)` when the node has no value.
    async fn read_attribute(
        &self,
        key: &AttributeKey,
    ) -> Result<Option<AttributeValue>, TransportError>;

    async fn write_attribute(
        &self,
        key: &AttributeKey,
        value: AttributeValue,
    ) -> Result<(), TransportError>;

    fn reporter(&self, key: &AttributeKey) -> Option<Arc<dyn Reporter>>;

    async fn send_command(
        &self,
        address: &NodeAddress,
        command: ClusterCommand,
    ) -> Result<(), TransportError>;

    async fn permit_join(&self, duration: Duration) -> Result<(), TransportError>;

    /// Device add/update/remove notifications. Dropping the receiver
    /// unsubscribes.
    fn subscribe_devices(&self) -> broadcast::Receiver<DeviceEvent>;

    async fn shutdown(&self);
}
