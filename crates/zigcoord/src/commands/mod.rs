//! Command dispatch: bridges CLI args to coordinator sessions and output.

pub mod config_cmd;
pub mod devices;
pub mod read;
pub mod run;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        // Config commands never touch the radio
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Run(args) => run::handle(args, global).await,
        Command::Devices => devices::handle(global).await,
        Command::Read(args) => read::handle(args, global).await,
    }
}
