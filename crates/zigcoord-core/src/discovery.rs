// ── Discovery orchestrator ──
//
// Waits for the radio's initial enumeration, registers every device it
// found with whatever identity the Basic cluster yields, declares the
// network ready, then follows device churn until cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zigcoord_api::{DeviceEvent, DeviceInfo, Transport};

use crate::model::{AttributeValue, ClusterId, DeviceIdentity, NodeAddress};
use crate::proxy::AttributeProxy;
use crate::registry::{DeviceRegistry, RegistryChange};
use crate::reporting::ReportingHub;

/// Basic cluster attribute positions.
const MANUFACTURER_INDEX: u16 = 4;
const MODEL_INDEX: u16 = 5;

pub(crate) struct Discovery {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Arc<DeviceRegistry>,
    pub(crate) proxy: Arc<AttributeProxy>,
    pub(crate) hub: ReportingHub,
    pub(crate) poll_interval: Duration,
}

impl Discovery {
    /// One full discovery run. `on_ready` fires once, after the initial
    /// sweep; nothing fires if cancelled first.
    pub(crate) async fn run(self, cancel: CancellationToken, on_ready: impl FnOnce() + Send) {
        // Subscribe before the sweep so joins during it are not lost.
        let mut events = self.transport.subscribe_devices();

        if !self.wait_for_browsing(&cancel).await {
            debug!("discovery cancelled before browsing completed");
            return;
        }

        let devices = self.transport.devices();
        info!(devices = devices.len(), "initial device browsing complete");
        // Devices that left while we were not listening, or were erased by a
        // reset, must not survive into the new run.
        self.forget_departed(&devices);
        for device in &devices {
            if cancel.is_cancelled() {
                return;
            }
            self.announce(device).await;
        }
        on_ready();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(DeviceEvent::Added(device)) => self.announce(&device).await,
                    Ok(DeviceEvent::Updated(device)) => self.refresh(&device).await,
                    Ok(DeviceEvent::Removed(device)) => self.forget(&device.address),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "device events lagged, resynchronizing");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        debug!("transport closed its device event stream");
                        break;
                    }
                },
            }
        }
        debug!("discovery stopped");
    }

    /// Re-announce everything the transport currently knows. Returns how
    /// many devices were announced.
    pub(crate) async fn announce_all(&self) -> usize {
        let devices = self.transport.devices();
        for device in &devices {
            self.announce(device).await;
        }
        devices.len()
    }

    async fn wait_for_browsing(&self, cancel: &CancellationToken) -> bool {
        loop {
            if self.transport.is_initial_browsing_complete() {
                return true;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// A device was seen: identify it if it is new to us, then record it.
    async fn announce(&self, device: &DeviceInfo) {
        if self.registry.get(&device.address).is_some() {
            self.refresh(device).await;
            return;
        }
        let identity = self.identify(&device.address).await;
        self.record(device, &identity);
    }

    /// A known device changed. Identification is retried only while the
    /// device still has no description.
    async fn refresh(&self, device: &DeviceInfo) {
        let identity = match self.registry.get(&device.address) {
            Some(existing) if existing.description.is_some() => existing.identity(),
            _ => self.identify(&device.address).await,
        };
        self.record(device, &identity);
    }

    fn forget(&self, address: &NodeAddress) {
        self.registry.remove(address);
        self.hub.forget_device(address);
    }

    /// Remove every live registry entry missing from `devices`.
    fn forget_departed(&self, devices: &[DeviceInfo]) {
        for known in self.registry.list() {
            if !devices.iter().any(|d| d.address == known.address) {
                debug!(address = %known.address, "device no longer on the network");
                self.forget(&known.address);
            }
        }
    }

    async fn resync(&self) {
        let devices = self.transport.devices();
        self.forget_departed(&devices);
        for device in &devices {
            self.announce(device).await;
        }
    }

    fn record(&self, device: &DeviceInfo, identity: &DeviceIdentity) {
        match self.registry.add_or_update(device, identity) {
            RegistryChange::Added(d) => {
                info!(address = %d.address, description = d.description.as_deref().unwrap_or("-"), "device discovered");
            }
            RegistryChange::Updated(d) => debug!(address = %d.address, "device refreshed"),
            RegistryChange::Unchanged => {}
        }
    }

    /// Best-effort manufacturer and model lookup.
    async fn identify(&self, address: &NodeAddress) -> DeviceIdentity {
        let manufacturer = self.read_text(address, MANUFACTURER_INDEX).await;
        let model = if manufacturer.as_deref().is_some_and(|m| !m.trim().is_empty()) {
            self.read_text(address, MODEL_INDEX).await
        } else {
            None
        };
        let identity = DeviceIdentity::new(manufacturer.as_deref(), model.as_deref());
        debug!(address = %address, description = ?identity.description(), "identification finished");
        identity
    }

    async fn read_text(&self, address: &NodeAddress, index: u16) -> Option<String> {
        match self.proxy.read_attribute(address, ClusterId::BASIC, index).await? {
            AttributeValue::Text(text) => Some(text),
            other => {
                debug!(address = %address, index, value = %other, "identity attribute is not text");
                None
            }
        }
    }
}
