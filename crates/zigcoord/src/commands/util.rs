//! Shared helpers for command handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use zigcoord_config::{self as config, Config};
use zigcoord_core::{Coordinator, CoordinatorConfig};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Config file in effect: `--config` if given, else the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(config::load_config_from(&config_file(global))?)
}

/// `--output`, falling back to the config file's default.
pub fn output_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global.output.unwrap_or_else(|| {
        <OutputFormat as clap::ValueEnum>::from_str(&cfg.defaults.output, true)
            .unwrap_or(OutputFormat::Table)
    })
}

/// A coordinator on the profile's radio.
pub struct Session {
    pub coordinator: Coordinator,
    pub profile: String,
    pub output: OutputFormat,
    pub timeout: Duration,
    config: CoordinatorConfig,
}

impl Session {
    /// Resolve the profile and apply flag overrides. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(global: &GlobalOpts) -> Result<Self, CliError> {
        let cfg = load(global)?;
        let (name, profile) = cfg.profile(global.profile.as_deref())?;

        // The radio keeps the profile's network; overrides only change what
        // the coordinator asks for.
        let radio = config::build_virtual_radio(profile)?;
        let mut wanted = profile.clone();
        if let Some(pan_id) = global.pan_id {
            wanted.pan_id = Some(pan_id);
        }
        if let Some(channel) = global.channel {
            wanted.channel = Some(channel);
        }

        Ok(Self {
            coordinator: Coordinator::new(Arc::new(radio)),
            config: config::profile_to_coordinator_config(&wanted)?,
            output: output_format(global, &cfg),
            timeout: Duration::from_secs(global.timeout.unwrap_or(cfg.defaults.timeout)),
            profile: name,
        })
    }

    pub async fn start(&self) -> Result<(), CliError> {
        debug!(profile = %self.profile, "starting coordinator");
        self.coordinator.start(self.config.clone()).await?;
        Ok(())
    }

    /// Start and wait for `Ready`.
    pub async fn ready(global: &GlobalOpts) -> Result<Self, CliError> {
        let session = Self::new(global)?;
        session.start().await?;
        if let Err(e) = session.coordinator.wait_for_ready(session.timeout).await {
            session.coordinator.stop().await;
            return Err(e.into());
        }
        Ok(session)
    }

    pub async fn stop(self) {
        self.coordinator.stop().await;
    }
}
