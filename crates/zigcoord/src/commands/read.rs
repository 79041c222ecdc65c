//! `read`: bring the network up and read one attribute.

use serde::Serialize;
use zigcoord_core::{AttributeKey, AttributeValue, ClusterId, NodeAddress};

use crate::cli::{GlobalOpts, ReadArgs};
use crate::error::CliError;
use crate::output;

use super::util::Session;

#[derive(Serialize)]
struct Reading {
    address: NodeAddress,
    cluster: ClusterId,
    index: u16,
    name: String,
    value: AttributeValue,
}

fn detail(r: &Reading) -> String {
    [
        format!("Address:   {}", r.address),
        format!("Cluster:   {}", r.cluster),
        format!("Attribute: {} ({})", r.index, r.name),
        format!("Value:     {}", r.value),
    ]
    .join("\n")
}

pub async fn handle(args: ReadArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let address = NodeAddress::new(&args.address);
    let cluster: ClusterId = args.cluster.parse().map_err(|_| CliError::Validation {
        field: "cluster".into(),
        reason: format!("'{}' is not a cluster id", args.cluster),
    })?;

    let session = Session::ready(global).await?;
    let format = session.output;
    let reading = read(&session, address, cluster, args.index).await;
    session.stop().await;

    let reading = reading?;
    let rendered = output::render_single(format, &reading, detail, |r| r.value.to_string())?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

async fn read(
    session: &Session,
    address: NodeAddress,
    cluster: ClusterId,
    index: u16,
) -> Result<Reading, CliError> {
    let coordinator = &session.coordinator;
    let not_found = |key: &AttributeKey| CliError::NotFound {
        resource_type: "attribute".into(),
        identifier: key.to_string(),
        list_command: "devices".into(),
    };
    let key = AttributeKey::new(address.clone(), cluster, index);

    // Resolution first, so a bad address or index reports as such rather
    // than as an empty read.
    let handle = coordinator
        .open_attribute(&address, cluster, index, None)
        .await?;
    let value = coordinator
        .read_attribute(&address, cluster, index)
        .await
        .ok_or_else(|| not_found(&key))?;

    Ok(Reading {
        address,
        cluster,
        index,
        name: handle.descriptor.name,
        value,
    })
}
