// ── Device registry ──
//
// Every device the coordinator has seen, keyed by node address. Devices are
// created on first discovery, merged on later sightings, and tombstoned on
// removal. Per-device handlers get lifecycle callbacks; every change is also
// published on the coordinator event bus.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;
use zigcoord_api::{DeviceInfo, NodeAddress};

use crate::model::{CoordinatorEvent, Device, DeviceIdentity, DeviceKey, DeviceState, NetworkState};
use crate::store::EntityCollection;
use crate::stream::{DeviceSnapshot, DeviceStream};

/// Per-device callbacks, registered by whatever owns the device upstream.
///
/// Callbacks run on coordinator tasks; keep them short.
pub trait DeviceHandler: Send + Sync {
    /// The device appeared. Returning `false` declines it and suppresses
    /// the follow-up `on_state_change`.
    fn open_device(&self, device: &Device) -> bool;

    fn on_state_change(&self, device: &Device);

    fn close_device(&self, device: &Device);

    fn on_network_status(&self, _state: &NetworkState) {}
}

/// Outcome of [`DeviceRegistry::add_or_update`].
#[derive(Debug, Clone)]
pub enum RegistryChange {
    /// First sighting, or a removed device came back.
    Added(Arc<Device>),
    Updated(Arc<Device>),
    /// The sighting matched what was already recorded.
    Unchanged,
}

enum Change {
    Added,
    Updated,
}

pub struct DeviceRegistry {
    devices: EntityCollection<NodeAddress, Device>,
    handlers: DashMap<DeviceKey, Arc<dyn DeviceHandler>>,
    event_tx: broadcast::Sender<Arc<CoordinatorEvent>>,
}

impl DeviceRegistry {
    pub(crate) fn new(event_tx: broadcast::Sender<Arc<CoordinatorEvent>>) -> Self {
        Self {
            devices: EntityCollection::new(),
            handlers: DashMap::new(),
            event_tx,
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Record a sighting of `info` with whatever identity discovery could
    /// read. Idempotent: an identical sighting is `Unchanged` and publishes
    /// nothing.
    pub fn add_or_update(&self, info: &DeviceInfo, identity: &DeviceIdentity) -> RegistryChange {
        let outcome = self
            .devices
            .update(info.address.clone(), |existing| match existing {
                Some(current) if current.is_live() => {
                    let next = current.merged(info, identity);
                    (!next.same_shape(current)).then_some((next, Change::Updated))
                }
                Some(_) | None => Some((Device::discovered(info, identity), Change::Added)),
            });

        match outcome {
            Some((device, Change::Added)) => {
                debug!(address = %device.address, description = ?device.description, "device added");
                if let Some(handler) = self.handler(&device.key()) {
                    if handler.open_device(&device) {
                        handler.on_state_change(&device);
                    }
                }
                self.publish(CoordinatorEvent::DeviceAdded {
                    description: device.description.clone(),
                    device: Arc::clone(&device),
                });
                RegistryChange::Added(device)
            }
            Some((device, Change::Updated)) => {
                debug!(address = %device.address, "device updated");
                if let Some(handler) = self.handler(&device.key()) {
                    handler.on_state_change(&device);
                }
                self.publish(CoordinatorEvent::DeviceUpdated {
                    device: Arc::clone(&device),
                });
                RegistryChange::Updated(device)
            }
            None => RegistryChange::Unchanged,
        }
    }

    /// Mark a device removed. The record stays so existing snapshots and
    /// `Arc<Device>` references remain meaningful.
    pub fn remove(&self, address: &NodeAddress) -> Option<Arc<Device>> {
        let (device, ()) = self.devices.update(address.clone(), |existing| {
            existing
                .filter(|d| d.is_live())
                .map(|d| (d.with_state(DeviceState::Removed), ()))
        })?;

        debug!(address = %address, "device removed");
        if let Some(handler) = self.handler(&device.key()) {
            handler.close_device(&device);
        }
        self.publish(CoordinatorEvent::DeviceRemoved {
            device: Arc::clone(&device),
        });
        Some(device)
    }

    /// Reflect the network state on every live device and tell every
    /// handler about it.
    pub(crate) fn apply_network_state(&self, state: &NetworkState) {
        let target = if state.is_ready() {
            DeviceState::Online
        } else {
            DeviceState::Unreachable
        };

        for device in self.devices.snapshot().iter() {
            if !device.is_live() || device.state == target {
                continue;
            }
            self.devices.update(device.address.clone(), |existing| {
                existing
                    .filter(|d| d.is_live() && d.state != target)
                    .map(|d| (d.with_state(target), ()))
            });
        }

        let handlers: Vec<Arc<dyn DeviceHandler>> = self
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for handler in handlers {
            handler.on_network_status(state);
        }
    }

    // ── Handlers ─────────────────────────────────────────────────────

    /// Attach a handler to a device, replacing any previous one. If the
    /// device is already live the handler is opened right away.
    pub fn register_handler(
        &self,
        key: DeviceKey,
        handler: Arc<dyn DeviceHandler>,
    ) -> Option<Arc<dyn DeviceHandler>> {
        let previous = self.handlers.insert(key.clone(), Arc::clone(&handler));
        if let Some(device) = self.get(key.address()) {
            if handler.open_device(&device) {
                handler.on_state_change(&device);
            }
        }
        previous
    }

    pub fn unregister_handler(&self, key: &DeviceKey) -> bool {
        self.handlers.remove(key).is_some()
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// A live device by address.
    pub fn get(&self, address: &NodeAddress) -> Option<Arc<Device>> {
        self.devices.get(address).filter(|d| d.is_live())
    }

    /// Live devices, ordered by address.
    pub fn list(&self) -> Vec<Arc<Device>> {
        self.devices
            .snapshot()
            .iter()
            .filter(|d| d.is_live())
            .cloned()
            .collect()
    }

    /// Every device ever seen, removed ones included.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.devices.snapshot()
    }

    pub fn subscribe(&self) -> DeviceStream {
        DeviceStream::new(self.devices.subscribe())
    }

    pub fn is_removed(&self, address: &NodeAddress) -> bool {
        self.devices
            .get(address)
            .is_some_and(|d| d.state == DeviceState::Removed)
    }

    /// Number of devices ever seen.
    pub fn known_count(&self) -> usize {
        self.devices.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn handler(&self, key: &DeviceKey) -> Option<Arc<dyn DeviceHandler>> {
        self.handlers.get(key).map(|h| Arc::clone(h.value()))
    }

    fn publish(&self, event: CoordinatorEvent) {
        let _ = self.event_tx.send(Arc::new(event));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use zigcoord_api::{ClusterId, ClusterInfo};

    fn info(address: &str) -> DeviceInfo {
        DeviceInfo {
            address: NodeAddress::new(address),
            profile_id: 0x0104,
            device_type: 0x0100,
            clusters: vec![ClusterInfo::basic()],
        }
    }

    fn registry() -> (DeviceRegistry, broadcast::Receiver<Arc<CoordinatorEvent>>) {
        let (tx, rx) = broadcast::channel(16);
        (DeviceRegistry::new(tx), rx)
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        accept: bool,
    }

    impl DeviceHandler for Recorder {
        fn open_device(&self, device: &Device) -> bool {
            self.calls.lock().unwrap().push(format!("open {}", device.address));
            self.accept
        }

        fn on_state_change(&self, device: &Device) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("state {} {}", device.address, device.state));
        }

        fn close_device(&self, device: &Device) {
            self.calls.lock().unwrap().push(format!("close {}", device.address));
        }

        fn on_network_status(&self, state: &NetworkState) {
            self.calls.lock().unwrap().push(format!("network {state}"));
        }
    }

    #[test]
    fn first_sighting_is_added_once() {
        let (registry, mut rx) = registry();
        let identity = DeviceIdentity::new(Some("IKEA"), Some("bulb"));

        assert!(matches!(
            registry.add_or_update(&info("01"), &identity),
            RegistryChange::Added(_)
        ));
        assert!(matches!(
            registry.add_or_update(&info("01"), &identity),
            RegistryChange::Unchanged
        ));

        let event = rx.try_recv().unwrap();
        match event.as_ref() {
            CoordinatorEvent::DeviceAdded { description, .. } => {
                assert_eq!(description.as_deref(), Some("IKEA:bulb"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn changed_clusters_are_updates() {
        let (registry, _rx) = registry();
        registry.add_or_update(&info("01"), &DeviceIdentity::default());

        let mut grown = info("01");
        grown
            .clusters
            .push(ClusterInfo::new(ClusterId::ON_OFF, Vec::new()));
        match registry.add_or_update(&grown, &DeviceIdentity::default()) {
            RegistryChange::Updated(device) => assert_eq!(device.clusters.len(), 2),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn removed_devices_are_hidden_but_kept() {
        let (registry, _rx) = registry();
        let RegistryChange::Added(original) =
            registry.add_or_update(&info("01"), &DeviceIdentity::default())
        else {
            panic!("expected add");
        };

        let removed = registry.remove(&original.address).unwrap();
        assert_eq!(removed.state, DeviceState::Removed);
        assert!(registry.get(&original.address).is_none());
        assert!(registry.list().is_empty());
        assert!(registry.is_removed(&original.address));
        assert_eq!(registry.known_count(), 1);
        assert_eq!(original.state, DeviceState::Online);

        assert!(registry.remove(&original.address).is_none());
    }

    #[test]
    fn returning_device_counts_as_added() {
        let (registry, _rx) = registry();
        let identity = DeviceIdentity::default();
        registry.add_or_update(&info("01"), &identity);
        registry.remove(&NodeAddress::new("01"));
        assert!(matches!(
            registry.add_or_update(&info("01"), &identity),
            RegistryChange::Added(_)
        ));
    }

    #[test]
    fn handler_lifecycle() {
        let (registry, _rx) = registry();
        let handler = Arc::new(Recorder {
            accept: true,
            ..Recorder::default()
        });
        registry.register_handler(DeviceKey::from(NodeAddress::new("01")), handler.clone());

        registry.add_or_update(&info("01"), &DeviceIdentity::default());
        registry.apply_network_state(&NetworkState::Initializing);
        registry.remove(&NodeAddress::new("01"));

        let calls = handler.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "open 01".to_owned(),
                "state 01 online".to_owned(),
                "network initializing".to_owned(),
                "close 01".to_owned(),
            ]
        );
    }

    #[test]
    fn declining_handler_skips_state_change() {
        let (registry, _rx) = registry();
        let handler = Arc::new(Recorder::default());
        registry.register_handler(DeviceKey::from(NodeAddress::new("01")), handler.clone());
        registry.add_or_update(&info("01"), &DeviceIdentity::default());
        assert_eq!(handler.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn network_state_flips_reachability() {
        let (registry, _rx) = registry();
        registry.add_or_update(&info("01"), &DeviceIdentity::default());

        registry.apply_network_state(&NetworkState::Failed {
            reason: "radio gone".into(),
        });
        let address = NodeAddress::new("01");
        assert_eq!(
            registry.get(&address).unwrap().state,
            DeviceState::Unreachable
        );

        registry.apply_network_state(&NetworkState::Ready);
        assert_eq!(registry.get(&address).unwrap().state, DeviceState::Online);
    }
}
