//! `run`: bring the network up and print what happens on it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use zigcoord_core::{
    AttributeHandle, AttributeReport, ClusterId, Coordinator, CoordinatorEvent, NetworkState,
    ReportListener, ReportingConfig,
};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output;

use super::util::Session;

/// Counts reports across every watched attribute.
#[derive(Default)]
struct ReportTally {
    received: AtomicUsize,
}

impl ReportListener for ReportTally {
    fn on_report(&self, _report: &AttributeReport) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }
}

struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn event(&self, event: &CoordinatorEvent) -> Result<(), CliError> {
        let line = match self.format {
            OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(event, true)?,
            OutputFormat::Table | OutputFormat::Plain => format!(
                "{} {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                self.describe(event)
            ),
        };
        output::print_output(&line, self.quiet);
        Ok(())
    }

    fn describe(&self, event: &CoordinatorEvent) -> String {
        match event {
            CoordinatorEvent::NetworkStatus { state } => {
                format!("network {}", output::paint_state(state, self.color))
            }
            CoordinatorEvent::DeviceAdded {
                device,
                description,
            } => format!(
                "device added   {} {}",
                device.address,
                description.as_deref().unwrap_or("-")
            ),
            CoordinatorEvent::DeviceUpdated { device } => {
                format!("device updated {} ({})", device.address, device.state)
            }
            CoordinatorEvent::DeviceRemoved { device } => {
                format!("device removed {}", device.address)
            }
            CoordinatorEvent::AttributeReport(report) => {
                format!("report {} = {}", report.key, report.value)
            }
        }
    }
}

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let session = Session::new(global)?;
    let coordinator = session.coordinator.clone();
    let printer = Printer {
        format: session.output,
        color: output::should_color(global.color),
        quiet: global.quiet,
    };
    let tally = Arc::new(ReportTally::default());

    // Subscribe before starting so no state change is missed.
    let mut events = coordinator.events();
    session.start().await?;

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut watched = Vec::new();
    let mut armed = false;
    let outcome = loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::from),
            () = &mut deadline => break Ok(()),
            event = events.recv() => match event {
                Ok(event) => {
                    if let Err(e) = printer.event(&event) {
                        break Err(e);
                    }
                    let ready = matches!(
                        event.as_ref(),
                        CoordinatorEvent::NetworkStatus { state: NetworkState::Ready }
                    );
                    if ready && !armed {
                        armed = true;
                        if args.watch {
                            watched = watch_all(&coordinator, &tally).await;
                        }
                        if args.permit_join {
                            if let Err(e) = coordinator.start_device_discovery().await {
                                break Err(e.into());
                            }
                        }
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "event output fell behind"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    for handle in &watched {
        coordinator.close_attribute(handle).await;
    }
    session.stop().await;

    if args.watch && !global.quiet {
        eprintln!(
            "{} attributes watched, {} reports received",
            watched.len(),
            tally.received.load(Ordering::Relaxed)
        );
    }
    outcome
}

/// Subscribe to every non-Basic attribute of every live device.
async fn watch_all(coordinator: &Coordinator, tally: &Arc<ReportTally>) -> Vec<AttributeHandle> {
    let mut handles = Vec::new();
    for device in coordinator.devices() {
        for cluster in device.clusters.iter().filter(|c| c.id != ClusterId::BASIC) {
            for index in 0..cluster.attributes.len() {
                let Ok(index) = u16::try_from(index) else {
                    break;
                };
                let listener: Arc<dyn ReportListener> = tally.clone();
                match coordinator
                    .open_attribute(
                        &device.address,
                        cluster.id,
                        index,
                        Some((ReportingConfig::default(), listener)),
                    )
                    .await
                {
                    Ok(handle) => handles.push(handle),
                    Err(e) => warn!(
                        address = %device.address,
                        cluster = %cluster.id,
                        index,
                        error = %e,
                        "could not watch attribute"
                    ),
                }
            }
        }
    }
    handles
}
