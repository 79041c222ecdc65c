// ── Network lifecycle controller ──
//
// Owns one radio transport and everything layered on it: bring-up with
// unbounded retries, the discovery run, the device registry, the reporting
// hub, and the command processor. `Coordinator` is the handle consumers
// hold; clones share the same network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zigcoord_api::{NetworkParameters, Transport, TransportError};

use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::CoordinatorConfig;
use crate::discovery::Discovery;
use crate::error::CoreError;
use crate::model::{
    AttributeKey, AttributeValue, ClusterCommand, ClusterId, CoordinatorEvent, Device, DeviceKey,
    NetworkState, NodeAddress, ReportingConfig,
};
use crate::proxy::{AttributeHandle, AttributeProxy, ClusterHandle};
use crate::registry::{DeviceHandler, DeviceRegistry};
use crate::reporting::{ReportListener, ReportingHub};
use crate::stream::DeviceStream;

const COMMAND_CHANNEL_SIZE: usize = 64;
const EVENT_CHANNEL_SIZE: usize = 256;

struct DiscoveryRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// ── Coordinator ──────────────────────────────────────────────────────

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`. `start` returns at once;
/// observe progress through [`state_changes`](Self::state_changes) or
/// [`wait_for_ready`](Self::wait_for_ready).
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    transport: Arc<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    hub: ReportingHub,
    proxy: Arc<AttributeProxy>,
    config: ArcSwapOption<CoordinatorConfig>,
    state: watch::Sender<NetworkState>,
    event_tx: broadcast::Sender<Arc<CoordinatorEvent>>,
    command_tx: Mutex<mpsc::Sender<CommandEnvelope>>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    running: AtomicBool,
    cancel: CancellationToken,
    /// Child of `cancel` for the current run; replaced on every `stop`.
    cancel_child: Mutex<CancellationToken>,
    discovery: Mutex<Option<DiscoveryRun>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Wrap a transport. Nothing touches the radio until [`start`](Self::start).
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(NetworkState::Disconnected);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        let registry = Arc::new(DeviceRegistry::new(event_tx.clone()));
        let hub = ReportingHub::new(event_tx.clone());
        let proxy = Arc::new(AttributeProxy::new(
            Arc::clone(&transport),
            Arc::clone(&registry),
            hub.clone(),
        ));

        Self {
            inner: Arc::new(CoordinatorInner {
                transport,
                registry,
                hub,
                proxy,
                config: ArcSwapOption::empty(),
                state,
                event_tx,
                command_tx: Mutex::new(command_tx),
                command_rx: Mutex::new(Some(command_rx)),
                running: AtomicBool::new(false),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                discovery: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Validate `config` and begin bringing the network up in the
    /// background.
    pub async fn start(&self, config: CoordinatorConfig) -> Result<(), CoreError> {
        let target = config.validate()?;
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyRunning);
        }

        let config = Arc::new(config);
        self.inner.config.store(Some(Arc::clone(&config)));
        let cancel = self.inner.cancel_child.lock().await.clone();

        let mut handles = self.inner.task_handles.lock().await;
        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            handles.push(tokio::spawn(command_processor_task(
                self.clone(),
                rx,
                cancel.clone(),
            )));
        }
        handles.push(tokio::spawn(lifecycle_task(
            self.clone(),
            config,
            target,
            cancel,
        )));

        info!(network = %target, "coordinator starting");
        Ok(())
    }

    /// Tear everything down and return to `Disconnected`. `start` may be
    /// called again afterwards.
    pub async fn stop(&self) {
        let was_running = self.inner.running.swap(false, Ordering::SeqCst);
        self.inner.cancel_child.lock().await.cancel();

        for handle in self.inner.task_handles.lock().await.drain(..) {
            let _ = handle.await;
        }
        if let Some(run) = self.inner.discovery.lock().await.take() {
            run.cancel.cancel();
            let _ = run.handle.await;
        }

        if was_running {
            self.inner.hub.deactivate_all().await;
            self.inner.transport.shutdown().await;
        }

        // Re-arm for the next start.
        *self.inner.cancel_child.lock().await = self.inner.cancel.child_token();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        *self.inner.command_tx.lock().await = command_tx;
        *self.inner.command_rx.lock().await = Some(command_rx);

        self.publish_state(NetworkState::Disconnected);
        if was_running {
            info!("coordinator stopped");
        }
    }

    /// Resolve once the network is `Ready`.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut rx = self.inner.state.subscribe();
        let outcome = tokio::time::timeout(timeout, rx.wait_for(NetworkState::is_ready))
            .await
            .map(|waited| waited.map(|_| ()));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(CoreError::Disconnected),
            Err(_) => Err(CoreError::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    /// Re-announce every device the radio knows and open the network for
    /// joining. Returns how many devices were announced.
    pub async fn start_device_discovery(&self) -> Result<usize, CoreError> {
        self.require_ready()?;
        let announced = self.discovery_context().announce_all().await;
        let duration = self.permit_join_duration();
        self.execute(Command::PermitJoin { duration }).await?;
        info!(announced, window = ?duration, "device discovery started");
        Ok(announced)
    }

    // ── State observation ────────────────────────────────────────────

    pub fn current_state(&self) -> NetworkState {
        self.inner.state.borrow().clone()
    }

    pub fn state_changes(&self) -> watch::Receiver<NetworkState> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<Arc<CoordinatorEvent>> {
        self.inner.event_tx.subscribe()
    }

    pub fn config(&self) -> Option<Arc<CoordinatorConfig>> {
        self.inner.config.load_full()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // ── Registry ─────────────────────────────────────────────────────

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    /// Live devices, ordered by address.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.inner.registry.list()
    }

    pub fn device(&self, address: &NodeAddress) -> Option<Arc<Device>> {
        self.inner.registry.get(address)
    }

    pub fn subscribe_devices(&self) -> DeviceStream {
        self.inner.registry.subscribe()
    }

    pub fn register_handler(
        &self,
        key: DeviceKey,
        handler: Arc<dyn DeviceHandler>,
    ) -> Option<Arc<dyn DeviceHandler>> {
        self.inner.registry.register_handler(key, handler)
    }

    pub fn unregister_handler(&self, key: &DeviceKey) -> bool {
        self.inner.registry.unregister_handler(key)
    }

    // ── Attributes ───────────────────────────────────────────────────

    pub fn reporting(&self) -> &ReportingHub {
        &self.inner.hub
    }

    pub async fn read_attribute(
        &self,
        address: &NodeAddress,
        cluster: ClusterId,
        index: u16,
    ) -> Option<AttributeValue> {
        self.inner.proxy.read_attribute(address, cluster, index).await
    }

    pub async fn open_attribute(
        &self,
        address: &NodeAddress,
        cluster: ClusterId,
        index: u16,
        subscription: Option<(ReportingConfig, Arc<dyn ReportListener>)>,
    ) -> Result<AttributeHandle, CoreError> {
        self.inner
            .proxy
            .open_attribute(address, cluster, index, subscription)
            .await
    }

    pub async fn close_attribute(&self, handle: &AttributeHandle) -> bool {
        self.inner.proxy.close_attribute(handle).await
    }

    pub fn open_cluster(&self, address: &NodeAddress, cluster: ClusterId) -> Option<ClusterHandle> {
        self.inner.proxy.open_cluster(address, cluster)
    }

    // ── Command execution ────────────────────────────────────────────

    /// Send a cluster command to a live device.
    pub async fn write_command(
        &self,
        address: &NodeAddress,
        command: ClusterCommand,
    ) -> Result<CommandResult, CoreError> {
        self.execute(Command::SendCluster {
            address: address.clone(),
            command,
        })
        .await
    }

    pub async fn write_attribute(
        &self,
        key: AttributeKey,
        value: AttributeValue,
    ) -> Result<CommandResult, CoreError> {
        self.execute(Command::WriteAttribute { key, value }).await
    }

    /// Queue a command for the command processor and await its result.
    /// Requires a `Ready` network.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        self.require_ready()?;

        let (tx, rx) = oneshot::channel();
        let command_tx = self.inner.command_tx.lock().await.clone();
        command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::Disconnected)?;

        rx.await.map_err(|_| CoreError::Disconnected)?
    }

    // ── Internals ────────────────────────────────────────────────────

    fn require_ready(&self) -> Result<(), CoreError> {
        let state = self.current_state();
        if state.is_ready() {
            Ok(())
        } else {
            Err(CoreError::NetworkNotReady { state })
        }
    }

    fn permit_join_duration(&self) -> Duration {
        self.config().map_or_else(
            || CoordinatorConfig::default().permit_join_duration,
            |c| c.permit_join_duration,
        )
    }

    fn discovery_context(&self) -> Discovery {
        let poll_interval = self.config().map_or_else(
            || CoordinatorConfig::default().browse_poll_interval,
            |c| c.browse_poll_interval,
        );
        Discovery {
            transport: Arc::clone(&self.inner.transport),
            registry: Arc::clone(&self.inner.registry),
            proxy: Arc::clone(&self.inner.proxy),
            hub: self.inner.hub.clone(),
            poll_interval,
        }
    }

    /// Publish a state if it differs from the current one, then fan it out
    /// to the registry, device handlers and the event bus.
    fn publish_state(&self, next: NetworkState) {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        if !changed {
            return;
        }

        info!(state = %next.describe(), "network state changed");
        self.inner.registry.apply_network_state(&next);
        let _ = self
            .inner
            .event_tx
            .send(Arc::new(CoordinatorEvent::NetworkStatus { state: next }));
    }

    /// One bring-up attempt: open, compare parameters, initialize.
    async fn bring_up(&self, target: NetworkParameters) -> Result<(), TransportError> {
        let transport = &self.inner.transport;
        transport.open_hardware().await?;

        let current = transport.network_parameters().await?;
        let reset = current != target;
        if reset {
            info!(
                current = %current,
                target = %target,
                "radio holds a different network, resetting"
            );
            self.publish_state(NetworkState::ResetPending);
        }

        if transport.initialize_network(target, reset).await? {
            Ok(())
        } else {
            Err(TransportError::Rejected {
                reason: "radio declined to start the network".into(),
            })
        }
    }

    /// Start a discovery run, cancelling and awaiting any previous one.
    async fn begin_discovery(&self, parent: &CancellationToken) {
        let mut slot = self.inner.discovery.lock().await;
        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
            let _ = previous.handle.await;
        }

        let cancel = parent.child_token();
        let discovery = self.discovery_context();
        let coordinator = self.clone();
        let handle = tokio::spawn(discovery.run(cancel.clone(), move || {
            coordinator.publish_state(NetworkState::Ready);
        }));
        *slot = Some(DiscoveryRun { cancel, handle });
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

/// Let the transport settle, then bring the network up, retrying forever
/// until it works or we are cancelled, then hand over to discovery.
async fn lifecycle_task(
    coordinator: Coordinator,
    config: Arc<CoordinatorConfig>,
    target: NetworkParameters,
    cancel: CancellationToken,
) {
    if !sleep_or_cancel(config.startup_delay, &cancel).await {
        return;
    }

    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        coordinator.publish_state(NetworkState::Initializing);
        debug!(attempt, "network bring-up attempt");

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            outcome = coordinator.bring_up(target) => outcome,
        };

        match outcome {
            Ok(()) => {
                info!(attempt, network = %target, "network up, discovering devices");
                coordinator.publish_state(NetworkState::Discovering);
                coordinator.begin_discovery(&cancel).await;
                return;
            }
            Err(e) => {
                warn!(
                    attempt,
                    error = %e,
                    retry_in = ?config.retry_delay,
                    "network bring-up failed"
                );
                coordinator.inner.transport.shutdown().await;
                coordinator.publish_state(NetworkState::Failed {
                    reason: e.to_string(),
                });
                if !sleep_or_cancel(config.retry_delay, &cancel).await {
                    return;
                }
            }
        }
    }
}

/// Serve queued commands until cancelled.
async fn command_processor_task(
    coordinator: Coordinator,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&coordinator, envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────────

async fn route_command(
    coordinator: &Coordinator,
    command: Command,
) -> Result<CommandResult, CoreError> {
    let transport = &coordinator.inner.transport;
    match command {
        Command::SendCluster { address, command } => {
            if coordinator.inner.registry.get(&address).is_none() {
                return Err(CoreError::not_found("Device", &address));
            }
            debug!(address = %address, cluster = %command.cluster, command = command.command, "sending cluster command");
            transport.send_command(&address, command).await?;
            Ok(CommandResult::Ok)
        }
        Command::WriteAttribute { key, value } => {
            debug!(key = %key, value = %value, "writing attribute");
            transport.write_attribute(&key, value).await?;
            Ok(CommandResult::Ok)
        }
        Command::PermitJoin { duration } => {
            transport.permit_join(duration).await?;
            Ok(CommandResult::JoinWindow(duration))
        }
    }
}
