// ── Attribute proxy ──
//
// Address -> cluster -> attribute resolution against the transport's view
// of the network, reads that prefer a live reported value, and opening or
// closing attribute subscriptions through the reporting hub.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use zigcoord_api::{AttributeDescriptor, ClusterInfo, Transport};

use crate::error::CoreError;
use crate::model::{AttributeKey, AttributeValue, ClusterId, ListenerId, NodeAddress, ReportingConfig};
use crate::registry::DeviceRegistry;
use crate::reporting::{ReportListener, ReportingHub};

/// An attribute resolved on a live device, possibly with a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeHandle {
    pub key: AttributeKey,
    pub descriptor: AttributeDescriptor,
    /// Present when the handle was opened with a report listener.
    pub listener: Option<ListenerId>,
}

/// A cluster resolved on a live device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterHandle {
    pub address: NodeAddress,
    pub cluster: ClusterInfo,
}

impl ClusterHandle {
    pub fn id(&self) -> ClusterId {
        self.cluster.id
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.cluster.attributes
    }

    pub fn key(&self, index: u16) -> Option<AttributeKey> {
        self.cluster
            .attribute(index)
            .map(|_| AttributeKey::new(self.address.clone(), self.cluster.id, index))
    }
}

pub struct AttributeProxy {
    transport: Arc<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    hub: ReportingHub,
}

impl AttributeProxy {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<DeviceRegistry>,
        hub: ReportingHub,
    ) -> Self {
        Self {
            transport,
            registry,
            hub,
        }
    }

    /// Read an attribute. The live reported value wins when one exists;
    /// otherwise the node is asked. Lookup misses and transport failures
    /// both come back as `None`.
    pub async fn read_attribute(
        &self,
        address: &NodeAddress,
        cluster: ClusterId,
        index: u16,
    ) -> Option<AttributeValue> {
        let (key, _) = match self.resolve(address, cluster, index) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(address = %address, cluster = %cluster, index, error = %e, "attribute lookup failed");
                return None;
            }
        };
        self.read_key(&key).await
    }

    pub(crate) async fn read_key(&self, key: &AttributeKey) -> Option<AttributeValue> {
        if let Some(value) = self.hub.live_value(key) {
            return Some(value);
        }
        match self.transport.read_attribute(key).await {
            Ok(value) => value,
            Err(e) => {
                debug!(key = %key, error = %e, "attribute read failed");
                None
            }
        }
    }

    /// Resolve an attribute, subscribing `listener` when one is given.
    pub async fn open_attribute(
        &self,
        address: &NodeAddress,
        cluster: ClusterId,
        index: u16,
        subscription: Option<(ReportingConfig, Arc<dyn ReportListener>)>,
    ) -> Result<AttributeHandle, CoreError> {
        let (key, descriptor) = self.resolve(address, cluster, index)?;

        let listener = match subscription {
            Some((config, listener)) => {
                let reporter = self
                    .transport
                    .reporter(&key)
                    .ok_or_else(|| CoreError::not_found("Reporter", &key))?;
                Some(self.hub.subscribe(reporter, &config, listener).await?)
            }
            None => None,
        };

        Ok(AttributeHandle {
            key,
            descriptor,
            listener,
        })
    }

    /// Undo `open_attribute`. Returns whether a subscription was dropped.
    pub async fn close_attribute(&self, handle: &AttributeHandle) -> bool {
        match handle.listener {
            Some(id) => self.hub.unsubscribe(&handle.key, id).await,
            None => false,
        }
    }

    pub fn open_cluster(&self, address: &NodeAddress, cluster: ClusterId) -> Option<ClusterHandle> {
        match self.resolve_cluster(address, cluster) {
            Ok(info) => Some(ClusterHandle {
                address: address.clone(),
                cluster: info,
            }),
            Err(e) => {
                debug!(address = %address, cluster = %cluster, error = %e, "cluster lookup failed");
                None
            }
        }
    }

    // ── Resolution ───────────────────────────────────────────────────

    fn resolve_cluster(
        &self,
        address: &NodeAddress,
        cluster: ClusterId,
    ) -> Result<ClusterInfo, CoreError> {
        if self.registry.is_removed(address) {
            return Err(CoreError::not_found("Device", address));
        }
        let device = self
            .transport
            .device(address)
            .ok_or_else(|| CoreError::not_found("Device", address))?;
        device
            .cluster(cluster)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Cluster", format!("{address}/{cluster}")))
    }

    fn resolve(
        &self,
        address: &NodeAddress,
        cluster: ClusterId,
        index: u16,
    ) -> Result<(AttributeKey, AttributeDescriptor), CoreError> {
        let info = self.resolve_cluster(address, cluster)?;
        let key = AttributeKey::new(address.clone(), cluster, index);
        let descriptor = info
            .attribute(index)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Attribute", &key))?;
        Ok((key, descriptor))
    }
}
