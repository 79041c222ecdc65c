// ── Reactive device streams ──
//
// Subscription handle over the registry's snapshots.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Device;

/// Every device the registry knows, ordered by address.
pub type DeviceSnapshot = Arc<Vec<Arc<Device>>>;

/// A subscription to the device registry.
///
/// Snapshots include removed devices so historical references resolve;
/// use [`live`](Self::live) for the devices currently on the network.
pub struct DeviceStream {
    current: DeviceSnapshot,
    receiver: watch::Receiver<DeviceSnapshot>,
}

impl DeviceStream {
    pub(crate) fn new(receiver: watch::Receiver<DeviceSnapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or by the last `changed()`.
    pub fn current(&self) -> &DeviceSnapshot {
        &self.current
    }

    /// Devices in the current snapshot that have not been removed.
    pub fn live(&self) -> Vec<Arc<Device>> {
        self.current
            .iter()
            .filter(|d| d.is_live())
            .cloned()
            .collect()
    }

    /// Wait for the next registry change. `None` once the registry is gone.
    pub async fn changed(&mut self) -> Option<DeviceSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> DeviceWatchStream {
        DeviceWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` of registry snapshots, one per change (starting with the
/// current one).
pub struct DeviceWatchStream {
    inner: WatchStream<DeviceSnapshot>,
}

impl Stream for DeviceWatchStream {
    type Item = DeviceSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
