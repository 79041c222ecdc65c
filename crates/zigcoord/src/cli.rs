//! Clap derive structures for the `zigcoord` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// zigcoord -- run and inspect a ZigBee-class network coordinator
#[derive(Debug, Parser)]
#[command(
    name = "zigcoord",
    version,
    about = "Run and inspect a ZigBee-class network coordinator",
    long_about = "Brings up a coordinator on the radio a profile describes, discovers\n\
        its devices and exposes their attributes.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Coordinator profile to use
    #[arg(long, short = 'p', env = "ZIGCOORD_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "ZIGCOORD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// PAN id override, hex (0x1a62) or decimal
    #[arg(long, value_parser = parse_pan_id, global = true)]
    pub pan_id: Option<u16>,

    /// Radio channel override (11-26)
    #[arg(long, global = true)]
    pub channel: Option<u8>,

    /// Output format (defaults to the config file's choice)
    #[arg(long, short = 'o', env = "ZIGCOORD_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Seconds to wait for the network to become ready
    #[arg(long, env = "ZIGCOORD_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

fn parse_pan_id(raw: &str) -> Result<u16, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| format!("invalid PAN id '{raw}': {e}"))
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bring the network up and follow it until interrupted
    Run(RunArgs),

    /// List discovered devices
    #[command(alias = "dev", alias = "d")]
    Devices,

    /// Read one attribute from a device
    Read(ReadArgs),

    /// Inspect or create the configuration file
    Config(ConfigArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, short = 'd')]
    pub duration: Option<u64>,

    /// Subscribe to reports for every attribute once the network is ready
    #[arg(long, short = 'w')]
    pub watch: bool,

    /// Open the network for joining once it is ready
    #[arg(long)]
    pub permit_join: bool,
}

// ── Read ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Node address (00:15:8d:00:01:02:03:04, dashes or bare hex)
    pub address: String,

    /// Cluster id, hex (0x0008) or decimal
    pub cluster: String,

    /// Attribute index within the cluster
    pub index: u16,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with the demo profile
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pan_id_accepts_hex_and_decimal() {
        assert_eq!(parse_pan_id("0x1a62").unwrap(), 0x1a62);
        assert_eq!(parse_pan_id("6754").unwrap(), 6754);
        assert!(parse_pan_id("0xfffff").is_err());
        assert!(parse_pan_id("pan").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
