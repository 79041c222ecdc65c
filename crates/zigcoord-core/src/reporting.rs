// ── Reporting subscription multiplexer ──
//
// Many upstream listeners per attribute, exactly one hardware subscription.
// Each attribute gets its own channel: an async gate that serializes the
// 0->1 and 1->0 listener transitions against the reporter, and an `ArcSwap`
// listener snapshot that delivery reads without taking the gate.

use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, warn};
use zigcoord_api::{
    AttributeKey, AttributeValue, ListenerId, ReportBatch, ReportSink, Reporter, ReportingConfig,
};

use crate::error::CoreError;
use crate::model::{AttributeReport, CoordinatorEvent, NodeAddress};

/// Receives attribute reports for one subscription.
///
/// Invoked on the transport's ingestion path without any hub lock held.
pub trait ReportListener: Send + Sync {
    fn on_report(&self, report: &AttributeReport);
}

impl ReportListener for mpsc::UnboundedSender<AttributeReport> {
    fn on_report(&self, report: &AttributeReport) {
        let _ = self.send(report.clone());
    }
}

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    listener: Arc<dyn ReportListener>,
}

/// Reporter the channel activated, if any. Only touched under the gate.
#[derive(Default)]
struct Activation {
    reporter: Option<Arc<dyn Reporter>>,
}

struct AttributeChannel {
    gate: Mutex<Activation>,
    listeners: ArcSwap<Vec<Registration>>,
}

impl AttributeChannel {
    fn new() -> Self {
        Self {
            gate: Mutex::new(Activation::default()),
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

struct HubInner {
    /// Identity under which the hub registers itself on reporters.
    sink_id: ListenerId,
    channels: DashMap<AttributeKey, Arc<AttributeChannel>>,
    live_values: DashMap<AttributeKey, AttributeValue>,
    event_tx: broadcast::Sender<Arc<CoordinatorEvent>>,
}

impl HubInner {
    fn deliver(&self, batch: &ReportBatch) {
        for (key, value) in batch.iter() {
            self.live_values.insert(key.clone(), value.clone());

            let Some(channel) = self.channels.get(key).map(|c| Arc::clone(c.value())) else {
                continue;
            };
            let listeners = channel.listeners.load_full();
            if listeners.is_empty() {
                continue;
            }

            let report = AttributeReport::new(key.clone(), value.clone());
            let _ = self
                .event_tx
                .send(Arc::new(CoordinatorEvent::AttributeReport(report.clone())));

            for registration in listeners.iter() {
                registration.listener.on_report(&report);
            }
        }
    }
}

/// The sink the hub hands to reporters. Weak so a reporter outliving the
/// coordinator does not keep it alive.
struct HubSink {
    hub: Weak<HubInner>,
}

impl ReportSink for HubSink {
    fn received_report(&self, batch: &ReportBatch) {
        if let Some(hub) = self.hub.upgrade() {
            hub.deliver(batch);
        }
    }
}

// ── ReportingHub ─────────────────────────────────────────────────────

/// Per-attribute fan-out of hardware reports. Cheap to clone.
#[derive(Clone)]
pub struct ReportingHub {
    inner: Arc<HubInner>,
}

impl ReportingHub {
    pub(crate) fn new(event_tx: broadcast::Sender<Arc<CoordinatorEvent>>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sink_id: ListenerId::next(),
                channels: DashMap::new(),
                live_values: DashMap::new(),
                event_tx,
            }),
        }
    }

    /// Add `listener` to the reporter's attribute.
    ///
    /// The first listener configures the reporter (only when `overwrite` is
    /// set or nobody else has it active) and activates hardware reporting.
    /// If that fails nothing is registered.
    pub async fn subscribe(
        &self,
        reporter: Arc<dyn Reporter>,
        config: &ReportingConfig,
        listener: Arc<dyn ReportListener>,
    ) -> Result<ListenerId, CoreError> {
        let key = reporter.key().clone();
        let channel = self.channel(&key);
        let mut activation = channel.gate.lock().await;

        let current = channel.listeners.load_full();
        if current.is_empty() {
            if config.overwrite || !reporter.is_active() {
                reporter
                    .configure(config)
                    .await
                    .map_err(|e| subscription_error(&key, &e))?;
            }
            reporter
                .add_listener(self.inner.sink_id, self.sink())
                .await
                .map_err(|e| subscription_error(&key, &e))?;
            activation.reporter = Some(reporter);
            debug!(key = %key, "hardware reporting activated");
        }

        let id = ListenerId::next();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Registration { id, listener });
        channel.listeners.store(Arc::new(next));

        debug!(key = %key, listener = %id, listeners = current.len() + 1, "report listener added");
        Ok(id)
    }

    /// Remove a listener. The last one out releases the reporter, clearing
    /// it unless someone else still listens on it. Returns `false` if `id`
    /// was not subscribed to `key`.
    pub async fn unsubscribe(&self, key: &AttributeKey, id: ListenerId) -> bool {
        let Some(channel) = self.inner.channels.get(key).map(|c| Arc::clone(c.value())) else {
            return false;
        };
        let mut activation = channel.gate.lock().await;

        let current = channel.listeners.load_full();
        if !current.iter().any(|r| r.id == id) {
            return false;
        }
        let remaining: Vec<Registration> =
            current.iter().filter(|r| r.id != id).cloned().collect();
        let now_empty = remaining.is_empty();
        channel.listeners.store(Arc::new(remaining));
        debug!(key = %key, listener = %id, "report listener removed");

        if now_empty {
            self.inner.live_values.remove(key);
            if let Some(reporter) = activation.reporter.take() {
                self.release(&reporter).await;
            }
        }
        true
    }

    /// Record every value in a batch as its attribute's last known value,
    /// then route it to that attribute's listeners.
    pub fn deliver(&self, batch: &ReportBatch) {
        self.inner.deliver(batch);
    }

    /// Drop every listener and release every reporter the hub activated.
    pub async fn deactivate_all(&self) {
        let channels: Vec<(AttributeKey, Arc<AttributeChannel>)> = self
            .inner
            .channels
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (key, channel) in channels {
            let mut activation = channel.gate.lock().await;
            channel.listeners.store(Arc::new(Vec::new()));
            self.inner.live_values.remove(&key);
            if let Some(reporter) = activation.reporter.take() {
                self.release(&reporter).await;
            }
        }
    }

    /// Drop cached values for a departed device. Its registrations stay in
    /// place; a node that has left sends nothing more, so they stay quiet
    /// until it rejoins or they are closed.
    pub(crate) fn forget_device(&self, address: &NodeAddress) {
        self.inner
            .live_values
            .retain(|key, _| key.address != *address);
    }

    /// Last value delivered for an attribute. Cleared when its last
    /// listener leaves or its device departs.
    pub fn live_value(&self, key: &AttributeKey) -> Option<AttributeValue> {
        self.inner.live_values.get(key).map(|v| v.value().clone())
    }

    pub fn listener_count(&self, key: &AttributeKey) -> usize {
        self.inner
            .channels
            .get(key)
            .map_or(0, |c| c.listeners.load().len())
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn channel(&self, key: &AttributeKey) -> Arc<AttributeChannel> {
        Arc::clone(
            self.inner
                .channels
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AttributeChannel::new()))
                .value(),
        )
    }

    fn sink(&self) -> Arc<dyn ReportSink> {
        Arc::new(HubSink {
            hub: Arc::downgrade(&self.inner),
        })
    }

    async fn release(&self, reporter: &Arc<dyn Reporter>) {
        let key = reporter.key();
        reporter.remove_listener(self.inner.sink_id).await;
        if reporter.listener_count() == 0 {
            match reporter.clear().await {
                Ok(()) => debug!(key = %key, "hardware reporting cleared"),
                Err(e) => warn!(key = %key, error = %e, "failed to clear reporter"),
            }
        } else {
            debug!(key = %key, "reporter still in use elsewhere, left active");
        }
    }
}

fn subscription_error(key: &AttributeKey, err: &zigcoord_api::TransportError) -> CoreError {
    CoreError::Subscription {
        key: key.clone(),
        reason: err.to_string(),
    }
}
