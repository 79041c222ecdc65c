//! `devices`: bring the network up and list what discovery found.

use std::sync::Arc;

use tabled::Tabled;
use zigcoord_core::Device;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util::Session;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "Clusters")]
    clusters: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<&Arc<Device>> for DeviceRow {
    fn from(d: &Arc<Device>) -> Self {
        Self {
            address: d.address.to_string(),
            description: d.description.clone().unwrap_or_else(|| "-".into()),
            device_type: format!("{:#06x}", d.device_type),
            clusters: d
                .clusters
                .iter()
                .map(|c| c.id.to_string())
                .collect::<Vec<_>>()
                .join(" "),
            state: d.state.to_string(),
        }
    }
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let session = Session::ready(global).await?;
    let devices = session.coordinator.devices();

    let rendered = output::render_list(
        session.output,
        &devices,
        |d| DeviceRow::from(d),
        |d| d.address.to_string(),
    );
    session.stop().await;

    output::print_output(&rendered?, global.quiet);
    Ok(())
}
