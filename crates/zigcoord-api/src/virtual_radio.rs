//! In-process radio.
//!
//! `VirtualRadio` implements [`Transport`] entirely in memory: a configurable
//! device list, attribute values, per-attribute reporters, and injectable
//! failures. The CLI uses it for demo runs; the core crate's tests drive the
//! coordinator through it and inspect the [`Journal`] and [`ReporterStats`]
//! it records.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{ReportSink, Reporter, Transport};
use crate::types::{
    AttributeKey, AttributeValue, ClusterCommand, ClusterId, ClusterInfo, DeviceEvent, DeviceInfo,
    ListenerId, NetworkParameters, NodeAddress, ReportBatch, ReportingConfig,
};

const DEVICE_EVENT_CAPACITY: usize = 64;
const HOME_AUTOMATION_PROFILE: u16 = 0x0104;
const MANUFACTURER_INDEX: u16 = 4;
const MODEL_INDEX: u16 = 5;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── VirtualDevice ───────────────────────────────────────────────────

/// A simulated node: its enumerated shape plus initial attribute values.
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    info: DeviceInfo,
    values: Vec<(ClusterId, u16, AttributeValue)>,
}

impl VirtualDevice {
    /// A home-automation node exposing only the Basic cluster.
    pub fn new(address: impl Into<NodeAddress>) -> Self {
        Self {
            info: DeviceInfo {
                address: address.into(),
                profile_id: HOME_AUTOMATION_PROFILE,
                device_type: 0,
                clusters: vec![ClusterInfo::basic()],
            },
            values: Vec::new(),
        }
    }

    pub fn with_device_type(mut self, device_type: u16) -> Self {
        self.info.device_type = device_type;
        self
    }

    pub fn with_profile(mut self, profile_id: u16) -> Self {
        self.info.profile_id = profile_id;
        self
    }

    pub fn with_cluster(mut self, cluster: ClusterInfo) -> Self {
        self.info.clusters.retain(|c| c.id != cluster.id);
        self.info.clusters.push(cluster);
        self
    }

    pub fn with_value(mut self, cluster: ClusterId, index: u16, value: AttributeValue) -> Self {
        self.values.retain(|(c, i, _)| !(*c == cluster && *i == index));
        self.values.push((cluster, index, value));
        self
    }

    pub fn with_manufacturer(self, manufacturer: &str) -> Self {
        self.with_value(ClusterId::BASIC, MANUFACTURER_INDEX, manufacturer.into())
    }

    pub fn with_model(self, model: &str) -> Self {
        self.with_value(ClusterId::BASIC, MODEL_INDEX, model.into())
    }

    pub fn address(&self) -> &NodeAddress {
        &self.info.address
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }
}

// ── Journal ─────────────────────────────────────────────────────────

/// One `initialize_network` call as the radio saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitCall {
    pub params: NetworkParameters,
    pub reset: bool,
    pub at: Instant,
}

/// Everything the coordinator asked of the radio.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub opens: usize,
    pub initializations: Vec<InitCall>,
    pub shutdowns: usize,
    pub reads: Vec<AttributeKey>,
    pub writes: Vec<(AttributeKey, AttributeValue)>,
    pub commands: Vec<(NodeAddress, ClusterCommand)>,
    pub permit_joins: Vec<Duration>,
}

/// Point-in-time view of one reporter's hardware activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ReporterStats {
    pub active: bool,
    pub listeners: usize,
    pub configuration: ReportingConfig,
    /// Every configuration pushed, in order.
    pub configured: Vec<ReportingConfig>,
    pub activations: usize,
    pub clears: usize,
    /// Highest number of simultaneously live hardware subscriptions.
    pub peak_hardware_subscriptions: usize,
}

// ── VirtualReporter ─────────────────────────────────────────────────

struct ReporterState {
    active: bool,
    configuration: ReportingConfig,
    configured: Vec<ReportingConfig>,
    listeners: Vec<(ListenerId, Arc<dyn ReportSink>)>,
    activations: usize,
    clears: usize,
}

struct VirtualReporter {
    key: AttributeKey,
    state: Mutex<ReporterState>,
    fail_activation: AtomicBool,
    hardware_subscriptions: AtomicUsize,
    peak_hardware_subscriptions: AtomicUsize,
}

impl VirtualReporter {
    fn new(key: AttributeKey) -> Self {
        Self {
            key,
            state: Mutex::new(ReporterState {
                active: false,
                configuration: ReportingConfig::default(),
                configured: Vec::new(),
                listeners: Vec::new(),
                activations: 0,
                clears: 0,
            }),
            fail_activation: AtomicBool::new(false),
            hardware_subscriptions: AtomicUsize::new(0),
            peak_hardware_subscriptions: AtomicUsize::new(0),
        }
    }

    fn active_sinks(&self) -> Vec<(ListenerId, Arc<dyn ReportSink>)> {
        let state = lock(&self.state);
        if state.active {
            state.listeners.clone()
        } else {
            Vec::new()
        }
    }

    fn stats(&self) -> ReporterStats {
        let state = lock(&self.state);
        ReporterStats {
            active: state.active,
            listeners: state.listeners.len(),
            configuration: state.configuration.clone(),
            configured: state.configured.clone(),
            activations: state.activations,
            clears: state.clears,
            peak_hardware_subscriptions: self.peak_hardware_subscriptions.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl Reporter for VirtualReporter {
    fn key(&self) -> &AttributeKey {
        &self.key
    }

    fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    fn configuration(&self) -> ReportingConfig {
        lock(&self.state).configuration.clone()
    }

    async fn configure(&self, config: &ReportingConfig) -> Result<(), TransportError> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        state.configuration = config.clone();
        state.configured.push(config.clone());
        Ok(())
    }

    async fn add_listener(
        &self,
        id: ListenerId,
        sink: Arc<dyn ReportSink>,
    ) -> Result<(), TransportError> {
        let activate = {
            let state = lock(&self.state);
            state.listeners.is_empty() && !state.active
        };

        if activate {
            if self.fail_activation.load(Ordering::SeqCst) {
                return Err(TransportError::Rejected {
                    reason: format!("node refused reporting for {}", self.key),
                });
            }
            // Binding round trip to the node.
            tokio::task::yield_now().await;
        }

        let mut state = lock(&self.state);
        if activate {
            // Counted without re-checking: overlapping first subscribers
            // would each bind on real hardware too.
            let live = self.hardware_subscriptions.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_hardware_subscriptions
                .fetch_max(live, Ordering::SeqCst);
            state.active = true;
            state.activations += 1;
            debug!(key = %self.key, "virtual reporter activated");
        }
        state.listeners.push((id, sink));
        Ok(())
    }

    async fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = lock(&self.state);
        let before = state.listeners.len();
        state.listeners.retain(|(existing, _)| *existing != id);
        state.listeners.len() != before
    }

    async fn clear(&self) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.listeners.clear();
        if state.active {
            self.hardware_subscriptions.fetch_sub(1, Ordering::SeqCst);
        }
        state.active = false;
        state.configuration = ReportingConfig::default();
        state.clears += 1;
        debug!(key = %self.key, "virtual reporter cleared");
        Ok(())
    }
}

// ── VirtualRadio ────────────────────────────────────────────────────

struct RadioInner {
    network: Mutex<NetworkParameters>,
    open: AtomicBool,
    initialized: AtomicBool,
    devices: DashMap<NodeAddress, DeviceInfo>,
    values: DashMap<AttributeKey, AttributeValue>,
    reporters: DashMap<AttributeKey, Arc<VirtualReporter>>,
    failing_reads: DashSet<AttributeKey>,
    open_failures: AtomicU32,
    init_failures: AtomicU32,
    init_declines: AtomicU32,
    browse_polls: AtomicU32,
    browse_polls_remaining: AtomicU32,
    journal: Mutex<Journal>,
    device_tx: broadcast::Sender<DeviceEvent>,
}

/// In-memory [`Transport`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct VirtualRadio {
    inner: Arc<RadioInner>,
}

impl VirtualRadio {
    /// A radio currently holding `network`.
    pub fn new(network: NetworkParameters) -> Self {
        let (device_tx, _) = broadcast::channel(DEVICE_EVENT_CAPACITY);
        Self {
            inner: Arc::new(RadioInner {
                network: Mutex::new(network),
                open: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                devices: DashMap::new(),
                values: DashMap::new(),
                reporters: DashMap::new(),
                failing_reads: DashSet::new(),
                open_failures: AtomicU32::new(0),
                init_failures: AtomicU32::new(0),
                init_declines: AtomicU32::new(0),
                browse_polls: AtomicU32::new(0),
                browse_polls_remaining: AtomicU32::new(0),
                journal: Mutex::new(Journal::default()),
                device_tx,
            }),
        }
    }

    pub fn with_device(self, device: VirtualDevice) -> Self {
        self.install(device);
        self
    }

    /// Number of `is_initial_browsing_complete` polls answered `false` after
    /// each successful initialization.
    pub fn with_browse_polls(self, polls: u32) -> Self {
        self.inner.browse_polls.store(polls, Ordering::SeqCst);
        self
    }

    // ── Fault injection ─────────────────────────────────────────────

    pub fn fail_next_opens(&self, count: u32) {
        self.inner.open_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_initializations(&self, count: u32) {
        self.inner.init_failures.store(count, Ordering::SeqCst);
    }

    /// The next `count` initializations answer `Ok(false)`.
    pub fn decline_next_initializations(&self, count: u32) {
        self.inner.init_declines.store(count, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, key: AttributeKey) {
        self.inner.failing_reads.insert(key);
    }

    pub fn fail_activation(&self, key: &AttributeKey, fail: bool) {
        if let Some(reporter) = self.reporter_for(key) {
            reporter.fail_activation.store(fail, Ordering::SeqCst);
        }
    }

    // ── Device churn ────────────────────────────────────────────────

    /// Add a node; announced to subscribers once the network is up.
    pub fn add_device(&self, device: VirtualDevice) {
        let info = self.install(device);
        self.announce(DeviceEvent::Added(info));
    }

    pub fn update_device(&self, device: VirtualDevice) {
        let info = self.install(device);
        self.announce(DeviceEvent::Updated(info));
    }

    pub fn remove_device(&self, address: &NodeAddress) -> bool {
        let Some((_, info)) = self.inner.devices.remove(address) else {
            return false;
        };
        self.inner.values.retain(|key, _| key.address != *address);
        self.announce(DeviceEvent::Removed(info));
        true
    }

    pub fn set_value(&self, key: AttributeKey, value: AttributeValue) {
        self.inner.values.insert(key, value);
    }

    // ── Report ingestion ────────────────────────────────────────────

    pub fn emit_report(&self, key: AttributeKey, value: AttributeValue) {
        self.emit_batch(&ReportBatch::single(key, value));
    }

    /// Store every value, then hand the batch once to each distinct sink
    /// registered on an active reporter for one of its attributes. Entries
    /// for nodes the radio no longer hosts are ignored.
    pub fn emit_batch(&self, batch: &ReportBatch) {
        let mut seen = HashSet::new();
        let mut sinks = Vec::new();
        for (key, value) in batch.iter() {
            if !self.inner.devices.contains_key(&key.address) {
                continue;
            }
            self.inner.values.insert(key.clone(), value.clone());
            let Some(reporter) = self.reporter_for(key) else {
                continue;
            };
            for (id, sink) in reporter.active_sinks() {
                if seen.insert(id) {
                    sinks.push(sink);
                }
            }
        }
        for sink in sinks {
            sink.received_report(batch);
        }
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn journal(&self) -> Journal {
        lock(&self.inner.journal).clone()
    }

    pub fn current_network(&self) -> NetworkParameters {
        *lock(&self.inner.network)
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn reporter_stats(&self, key: &AttributeKey) -> Option<ReporterStats> {
        self.inner.reporters.get(key).map(|r| r.stats())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn install(&self, device: VirtualDevice) -> DeviceInfo {
        let VirtualDevice { info, values } = device;
        for (cluster, index, value) in values {
            self.inner
                .values
                .insert(AttributeKey::new(info.address.clone(), cluster, index), value);
        }
        self.inner.devices.insert(info.address.clone(), info.clone());
        info
    }

    fn announce(&self, event: DeviceEvent) {
        if self.initialized() {
            let _ = self.inner.device_tx.send(event);
        }
    }

    fn initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    fn require_network(&self) -> Result<(), TransportError> {
        if self.initialized() {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }

    fn resolve(&self, key: &AttributeKey) -> Result<(), TransportError> {
        let device = self
            .inner
            .devices
            .get(&key.address)
            .ok_or_else(|| TransportError::UnknownDevice {
                address: key.address.clone(),
            })?;
        device
            .cluster(key.cluster)
            .and_then(|c| c.attribute(key.index))
            .map(|_| ())
            .ok_or_else(|| TransportError::UnknownAttribute { key: key.clone() })
    }

    fn reporter_for(&self, key: &AttributeKey) -> Option<Arc<VirtualReporter>> {
        if let Some(existing) = self.inner.reporters.get(key) {
            return Some(Arc::clone(existing.value()));
        }
        self.resolve(key).ok()?;
        let reporter = self
            .inner
            .reporters
            .entry(key.clone())
            .or_insert_with(|| Arc::new(VirtualReporter::new(key.clone())));
        Some(Arc::clone(reporter.value()))
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for VirtualRadio {
    async fn open_hardware(&self) -> Result<(), TransportError> {
        lock(&self.inner.journal).opens += 1;
        if Self::take_one(&self.inner.open_failures) {
            return Err(TransportError::HardwareUnavailable {
                reason: "virtual radio unplugged".into(),
            });
        }
        self.inner.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn network_parameters(&self) -> Result<NetworkParameters, TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        Ok(self.current_network())
    }

    async fn initialize_network(
        &self,
        params: NetworkParameters,
        reset: bool,
    ) -> Result<bool, TransportError> {
        lock(&self.inner.journal).initializations.push(InitCall {
            params,
            reset,
            at: Instant::now(),
        });
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        if Self::take_one(&self.inner.init_failures) {
            return Err(TransportError::Timeout { timeout_ms: 5_000 });
        }
        if Self::take_one(&self.inner.init_declines) {
            return Ok(false);
        }
        if reset {
            *lock(&self.inner.network) = params;
        }
        self.inner.browse_polls_remaining.store(
            self.inner.browse_polls.load(Ordering::SeqCst),
            Ordering::SeqCst,
        );
        self.inner.initialized.store(true, Ordering::SeqCst);
        debug!(reset, network = %self.current_network(), "virtual network up");
        Ok(true)
    }

    fn is_initial_browsing_complete(&self) -> bool {
        self.initialized() && !Self::take_one(&self.inner.browse_polls_remaining)
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        if !self.initialized() {
            return Vec::new();
        }
        let mut devices: Vec<DeviceInfo> = self
            .inner
            .devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        devices.sort_by(|a, b| a.address.cmp(&b.address));
        devices
    }

    fn device(&self, address: &NodeAddress) -> Option<DeviceInfo> {
        if !self.initialized() {
            return None;
        }
        self.inner.devices.get(address).map(|d| d.value().clone())
    }

    async fn read_attribute(
        &self,
        key: &AttributeKey,
    ) -> Result<Option<AttributeValue>, TransportError> {
        self.require_network()?;
        lock(&self.inner.journal).reads.push(key.clone());
        self.resolve(key)?;
        if self.inner.failing_reads.contains(key) {
            return Err(TransportError::Timeout { timeout_ms: 1_000 });
        }
        Ok(self.inner.values.get(key).map(|v| v.value().clone()))
    }

    async fn write_attribute(
        &self,
        key: &AttributeKey,
        value: AttributeValue,
    ) -> Result<(), TransportError> {
        self.require_network()?;
        self.resolve(key)?;
        self.inner.values.insert(key.clone(), value.clone());
        lock(&self.inner.journal).writes.push((key.clone(), value));
        Ok(())
    }

    fn reporter(&self, key: &AttributeKey) -> Option<Arc<dyn Reporter>> {
        self.reporter_for(key)
            .map(|reporter| reporter as Arc<dyn Reporter>)
    }

    async fn send_command(
        &self,
        address: &NodeAddress,
        command: ClusterCommand,
    ) -> Result<(), TransportError> {
        self.require_network()?;
        if !self.inner.devices.contains_key(address) {
            return Err(TransportError::UnknownDevice {
                address: address.clone(),
            });
        }
        lock(&self.inner.journal)
            .commands
            .push((address.clone(), command));
        Ok(())
    }

    async fn permit_join(&self, duration: Duration) -> Result<(), TransportError> {
        self.require_network()?;
        lock(&self.inner.journal).permit_joins.push(duration);
        Ok(())
    }

    fn subscribe_devices(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.device_tx.subscribe()
    }

    async fn shutdown(&self) {
        self.inner.open.store(false, Ordering::SeqCst);
        self.inner.initialized.store(false, Ordering::SeqCst);
        lock(&self.inner.journal).shutdowns += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const HOME: NetworkParameters = NetworkParameters {
        pan_id: 0x1a62,
        channel: 15,
    };

    struct Collect(Mutex<Vec<ReportBatch>>);

    impl ReportSink for Collect {
        fn received_report(&self, batch: &ReportBatch) {
            lock(&self.0).push(batch.clone());
        }
    }

    fn lamp() -> VirtualDevice {
        VirtualDevice::new("0011223344556677")
            .with_manufacturer("IKEA of Sweden")
            .with_model("TRADFRI bulb")
            .with_cluster(ClusterInfo::new(
                ClusterId::ON_OFF,
                vec![crate::types::AttributeDescriptor::new(0, "on_off")],
            ))
    }

    async fn online(radio: &VirtualRadio) {
        radio.open_hardware().await.unwrap();
        assert!(radio.initialize_network(HOME, false).await.unwrap());
    }

    #[tokio::test]
    async fn devices_hidden_until_network_up() {
        let radio = VirtualRadio::new(HOME).with_device(lamp());
        assert!(radio.devices().is_empty());
        online(&radio).await;
        assert_eq!(radio.devices().len(), 1);
    }

    #[tokio::test]
    async fn reset_adopts_requested_parameters() {
        let radio = VirtualRadio::new(HOME);
        radio.open_hardware().await.unwrap();
        let wanted = NetworkParameters {
            pan_id: 0x2222,
            channel: 20,
        };
        assert!(radio.initialize_network(wanted, true).await.unwrap());
        assert_eq!(radio.current_network(), wanted);
        assert!(radio.journal().initializations[0].reset);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let radio = VirtualRadio::new(HOME);
        radio.fail_next_opens(1);
        radio.fail_next_initializations(1);
        assert!(radio.open_hardware().await.is_err());
        radio.open_hardware().await.unwrap();
        assert!(radio.initialize_network(HOME, false).await.is_err());
        assert!(radio.initialize_network(HOME, false).await.unwrap());
        assert_eq!(radio.journal().opens, 2);
    }

    #[tokio::test]
    async fn browsing_completes_after_configured_polls() {
        let radio = VirtualRadio::new(HOME).with_browse_polls(2);
        online(&radio).await;
        assert!(!radio.is_initial_browsing_complete());
        assert!(!radio.is_initial_browsing_complete());
        assert!(radio.is_initial_browsing_complete());
    }

    #[tokio::test]
    async fn read_resolves_identity_attributes() {
        let radio = VirtualRadio::new(HOME).with_device(lamp());
        online(&radio).await;
        let key = AttributeKey::new(NodeAddress::new("0011223344556677"), ClusterId::BASIC, 4);
        let value = radio.read_attribute(&key).await.unwrap();
        assert_eq!(value, Some(AttributeValue::Text("IKEA of Sweden".into())));

        let missing = AttributeKey::new(key.address.clone(), ClusterId::BASIC, 9);
        assert!(matches!(
            radio.read_attribute(&missing).await,
            Err(TransportError::UnknownAttribute { .. })
        ));
    }

    #[tokio::test]
    async fn reporter_activates_on_first_listener_and_clears() {
        let radio = VirtualRadio::new(HOME).with_device(lamp());
        online(&radio).await;
        let key = AttributeKey::new(NodeAddress::new("0011223344556677"), ClusterId::ON_OFF, 0);
        let reporter = radio.reporter(&key).unwrap();
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));

        reporter
            .add_listener(ListenerId::next(), sink.clone())
            .await
            .unwrap();
        assert!(reporter.is_active());

        radio.emit_report(key.clone(), AttributeValue::Bool(true));
        assert_eq!(lock(&sink.0).len(), 1);

        reporter.clear().await.unwrap();
        radio.emit_report(key.clone(), AttributeValue::Bool(false));
        assert_eq!(lock(&sink.0).len(), 1);

        let stats = radio.reporter_stats(&key).unwrap();
        assert!(!stats.active);
        assert_eq!(stats.activations, 1);
        assert_eq!(stats.clears, 1);
    }

    #[tokio::test]
    async fn device_events_only_after_initialization() {
        let radio = VirtualRadio::new(HOME);
        let mut rx = radio.subscribe_devices();
        radio.add_device(lamp());
        assert!(rx.try_recv().is_err());

        online(&radio).await;
        radio.remove_device(&NodeAddress::new("0011223344556677"));
        assert!(matches!(rx.try_recv(), Ok(DeviceEvent::Removed(_))));
    }
}
