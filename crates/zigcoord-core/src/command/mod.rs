// ── Command API ──
//
// Writes to the network flow through a single `Command` enum, queued to the
// coordinator's command processor and answered over a oneshot channel.

use std::time::Duration;

use crate::error::CoreError;
use crate::model::{AttributeKey, AttributeValue, ClusterCommand, NodeAddress};

/// A command and the channel its result goes back on.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send an opaque cluster command to a node.
    SendCluster {
        address: NodeAddress,
        command: ClusterCommand,
    },
    WriteAttribute {
        key: AttributeKey,
        value: AttributeValue,
    },
    /// Open the network for joining.
    PermitJoin { duration: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Ok,
    /// The network accepts joins for this long.
    JoinWindow(Duration),
}
