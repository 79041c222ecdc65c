#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use zigcoord_api::virtual_radio::{VirtualDevice, VirtualRadio};
use zigcoord_api::{AttributeDescriptor, NetworkParameters};
use zigcoord_core::{
    AttributeKey, ClusterId, ClusterInfo, Coordinator, CoordinatorConfig, CoordinatorEvent,
    NetworkState, NodeAddress,
};

pub const HOME: NetworkParameters = NetworkParameters {
    pan_id: 0x1a62,
    channel: 15,
};

pub const READY_TIMEOUT: Duration = Duration::from_secs(600);

pub const LAMP: &str = "00:15:8d:00:00:00:00:01";
pub const SENSOR: &str = "00:15:8d:00:00:00:00:02";
pub const PLUG: &str = "00:15:8d:00:00:00:00:03";

pub fn config() -> CoordinatorConfig {
    CoordinatorConfig::new(HOME.pan_id, HOME.channel)
}

pub fn addr(raw: &str) -> NodeAddress {
    NodeAddress::new(raw)
}

/// A dimmable lamp with identity and a level attribute.
pub fn lamp() -> VirtualDevice {
    VirtualDevice::new(LAMP)
        .with_device_type(0x0101)
        .with_manufacturer("IKEA of Sweden")
        .with_model("TRADFRI bulb E27")
        .with_cluster(ClusterInfo::new(
            ClusterId::ON_OFF,
            vec![AttributeDescriptor::new(0x0000, "on_off")],
        ))
        .with_cluster(ClusterInfo::new(
            ClusterId::LEVEL_CONTROL,
            vec![AttributeDescriptor::new(0x0000, "current_level")],
        ))
}

pub fn level_key() -> AttributeKey {
    AttributeKey::new(addr(LAMP), ClusterId::LEVEL_CONTROL, 0)
}

pub fn radio() -> VirtualRadio {
    VirtualRadio::new(HOME)
}

pub fn coordinator(radio: &VirtualRadio) -> Coordinator {
    Coordinator::new(Arc::new(radio.clone()))
}

pub async fn ready(radio: &VirtualRadio) -> Coordinator {
    let coordinator = coordinator(radio);
    coordinator.start(config()).await.unwrap();
    coordinator.wait_for_ready(READY_TIMEOUT).await.unwrap();
    coordinator
}

/// Network states published so far, in order.
pub fn drain_states(rx: &mut broadcast::Receiver<Arc<CoordinatorEvent>>) -> Vec<NetworkState> {
    drain(rx)
        .into_iter()
        .filter_map(|event| match event.as_ref() {
            CoordinatorEvent::NetworkStatus { state } => Some(state.clone()),
            _ => None,
        })
        .collect()
}

pub fn drain(rx: &mut broadcast::Receiver<Arc<CoordinatorEvent>>) -> Vec<Arc<CoordinatorEvent>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
