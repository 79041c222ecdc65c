//! Shared configuration for zigcoord.
//!
//! TOML profiles layered with `ZIGCOORD_` environment variables, and their
//! translation into a `zigcoord_core::CoordinatorConfig` plus the virtual
//! radio a profile describes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use zigcoord_api::{
    AttributeDescriptor, AttributeValue, ClusterId, ClusterInfo, NetworkParameters, VirtualDevice,
    VirtualRadio,
};
use zigcoord_core::CoordinatorConfig;

pub const DEFAULT_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named coordinator profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(DEFAULT_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::from([(DEFAULT_PROFILE.to_owned(), Profile::demo())]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Seconds to wait for the network to become ready.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    60
}

/// A named coordinator profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// PAN id of the network to form or join.
    pub pan_id: Option<u16>,

    /// Radio channel, 11 through 26.
    pub channel: Option<u8>,

    pub startup_delay_ms: Option<u64>,
    pub retry_delay_secs: Option<u64>,
    pub browse_poll_ms: Option<u64>,
    pub permit_join_secs: Option<u64>,

    /// The in-memory radio the coordinator drives.
    #[serde(default)]
    pub virtual_radio: VirtualRadioProfile,
}

impl Profile {
    /// The profile written by `config init`: a small demo network.
    pub fn demo() -> Self {
        Self {
            pan_id: Some(0x1a62),
            channel: Some(11),
            virtual_radio: VirtualRadioProfile {
                pan_id: None,
                channel: None,
                devices: vec![
                    VirtualDeviceProfile {
                        address: "00:15:8d:00:01:a2:b3:01".into(),
                        profile_id: default_profile_id(),
                        device_type: 0x0101,
                        manufacturer: Some("IKEA of Sweden".into()),
                        model: Some("TRADFRI bulb E27".into()),
                        clusters: vec![
                            ClusterProfile {
                                id: ClusterId::ON_OFF.0,
                                attributes: vec![AttributeProfile {
                                    id: 0x0000,
                                    name: "on_off".into(),
                                    value: Some(AttributeValue::Bool(true)),
                                }],
                            },
                            ClusterProfile {
                                id: ClusterId::LEVEL_CONTROL.0,
                                attributes: vec![AttributeProfile {
                                    id: 0x0000,
                                    name: "current_level".into(),
                                    value: Some(AttributeValue::Unsigned(180)),
                                }],
                            },
                        ],
                    },
                    VirtualDeviceProfile {
                        address: "00:15:8d:00:01:a2:b3:02".into(),
                        profile_id: default_profile_id(),
                        device_type: 0x0302,
                        manufacturer: Some("LUMI".into()),
                        model: Some("lumi.weather".into()),
                        clusters: vec![ClusterProfile {
                            id: ClusterId::TEMPERATURE_MEASUREMENT.0,
                            attributes: vec![AttributeProfile {
                                id: 0x0000,
                                name: "measured_value".into(),
                                value: Some(AttributeValue::Float(21.5)),
                            }],
                        }],
                    },
                ],
            },
            ..Self::default()
        }
    }
}

/// Network state the virtual radio boots with, and the nodes it hosts.
/// Unset network fields follow the profile, so no reset is needed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VirtualRadioProfile {
    pub pan_id: Option<u16>,
    pub channel: Option<u8>,
    #[serde(default)]
    pub devices: Vec<VirtualDeviceProfile>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VirtualDeviceProfile {
    pub address: String,
    #[serde(default = "default_profile_id")]
    pub profile_id: u16,
    #[serde(default)]
    pub device_type: u16,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub clusters: Vec<ClusterProfile>,
}

/// Home Automation.
fn default_profile_id() -> u16 {
    0x0104
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClusterProfile {
    pub id: u16,
    /// Attributes in index order.
    #[serde(default)]
    pub attributes: Vec<AttributeProfile>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AttributeProfile {
    #[serde(default)]
    pub id: u16,
    pub name: String,
    pub value: Option<AttributeValue>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "zigcoord", "zigcoord").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("zigcoord");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ZIGCOORD_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

impl Config {
    /// The named profile, or the configured default.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(ToOwned::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| DEFAULT_PROFILE.into());
        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::ProfileNotFound {
                name,
                available: self.profiles.keys().cloned().collect(),
            }),
        }
    }
}

/// Build a `CoordinatorConfig` from a profile, validating the network
/// parameters it names.
pub fn profile_to_coordinator_config(profile: &Profile) -> Result<CoordinatorConfig, ConfigError> {
    let defaults = CoordinatorConfig::default();
    let config = CoordinatorConfig {
        pan_id: profile.pan_id,
        channel: profile.channel,
        startup_delay: profile
            .startup_delay_ms
            .map_or(defaults.startup_delay, Duration::from_millis),
        retry_delay: profile
            .retry_delay_secs
            .map_or(defaults.retry_delay, Duration::from_secs),
        browse_poll_interval: profile
            .browse_poll_ms
            .map_or(defaults.browse_poll_interval, Duration::from_millis),
        permit_join_duration: profile
            .permit_join_secs
            .map_or(defaults.permit_join_duration, Duration::from_secs),
    };

    config.validate().map_err(|e| ConfigError::Validation {
        field: "profile".into(),
        reason: e.to_string(),
    })?;
    Ok(config)
}

/// Build the virtual radio a profile describes.
pub fn build_virtual_radio(profile: &Profile) -> Result<VirtualRadio, ConfigError> {
    let radio_profile = &profile.virtual_radio;
    let network = NetworkParameters {
        pan_id: radio_profile.pan_id.or(profile.pan_id).unwrap_or_default(),
        channel: radio_profile
            .channel
            .or(profile.channel)
            .unwrap_or(*zigcoord_core::config::CHANNEL_RANGE.start()),
    };

    let mut radio = VirtualRadio::new(network);
    for device in &radio_profile.devices {
        radio = radio.with_device(virtual_device(device)?);
    }
    Ok(radio)
}

fn virtual_device(profile: &VirtualDeviceProfile) -> Result<VirtualDevice, ConfigError> {
    if profile.address.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "virtual_radio.devices.address".into(),
            reason: "address must not be empty".into(),
        });
    }

    let mut device = VirtualDevice::new(profile.address.as_str())
        .with_profile(profile.profile_id)
        .with_device_type(profile.device_type);
    if let Some(ref manufacturer) = profile.manufacturer {
        device = device.with_manufacturer(manufacturer);
    }
    if let Some(ref model) = profile.model {
        device = device.with_model(model);
    }

    for cluster in &profile.clusters {
        let id = ClusterId(cluster.id);
        if id == ClusterId::BASIC {
            return Err(ConfigError::Validation {
                field: format!("{}.clusters", profile.address),
                reason: "the Basic cluster is implicit".into(),
            });
        }
        let descriptors = cluster
            .attributes
            .iter()
            .map(|a| AttributeDescriptor::new(a.id, a.name.clone()))
            .collect();
        device = device.with_cluster(ClusterInfo::new(id, descriptors));

        for (index, attribute) in cluster.attributes.iter().enumerate() {
            let (Some(value), Ok(index)) = (&attribute.value, u16::try_from(index)) else {
                continue;
            };
            device = device.with_value(id, index, value.clone());
        }
    }
    Ok(device)
}
