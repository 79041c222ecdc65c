// ── Runtime coordinator configuration ──
//
// What network to bring up and how patiently. Never touches disk; the CLI
// builds a `CoordinatorConfig` from a profile and hands it to `start`.

use std::time::Duration;

use zigcoord_api::NetworkParameters;

use crate::error::CoreError;

/// Channels available to 2.4 GHz 802.15.4 radios.
pub const CHANNEL_RANGE: std::ops::RangeInclusive<u8> = 11..=26;

/// The broadcast PAN id; never valid for a network we own.
pub const BROADCAST_PAN_ID: u16 = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub pan_id: Option<u16>,
    pub channel: Option<u8>,
    /// Delay between `start` and the first bring-up attempt.
    pub startup_delay: Duration,
    /// Delay before re-attempting a failed bring-up.
    pub retry_delay: Duration,
    /// How often discovery checks whether initial enumeration finished.
    pub browse_poll_interval: Duration,
    /// How long `start_device_discovery` keeps the network open for joins.
    pub permit_join_duration: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            pan_id: None,
            channel: None,
            startup_delay: Duration::from_secs(1),
            retry_delay: Duration::from_secs(15),
            browse_poll_interval: Duration::from_millis(250),
            permit_join_duration: Duration::from_secs(180),
        }
    }
}

impl CoordinatorConfig {
    pub fn new(pan_id: u16, channel: u8) -> Self {
        Self {
            pan_id: Some(pan_id),
            channel: Some(channel),
            ..Self::default()
        }
    }

    /// Check the configuration and return the network it targets.
    pub fn validate(&self) -> Result<NetworkParameters, CoreError> {
        let pan_id = self.pan_id.ok_or_else(|| invalid("pan id is not set"))?;
        let channel = self.channel.ok_or_else(|| invalid("channel is not set"))?;

        if pan_id == BROADCAST_PAN_ID {
            return Err(invalid("pan id 0xffff is reserved for broadcast"));
        }
        if !CHANNEL_RANGE.contains(&channel) {
            return Err(invalid(format!(
                "channel {channel} outside {}..={}",
                CHANNEL_RANGE.start(),
                CHANNEL_RANGE.end()
            )));
        }
        if self.retry_delay.is_zero() {
            return Err(invalid("retry delay must be positive"));
        }
        if self.browse_poll_interval.is_zero() {
            return Err(invalid("browse poll interval must be positive"));
        }

        Ok(NetworkParameters { pan_id, channel })
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bring_up_timing() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.startup_delay, Duration::from_secs(1));
        assert_eq!(config.retry_delay, Duration::from_secs(15));
        assert_eq!(config.browse_poll_interval, Duration::from_millis(250));
        assert_eq!(config.permit_join_duration, Duration::from_secs(180));
    }

    #[test]
    fn validate_returns_target_network() {
        let params = CoordinatorConfig::new(0x1a62, 15).validate().unwrap();
        assert_eq!(params.pan_id, 0x1a62);
        assert_eq!(params.channel, 15);
    }

    #[test]
    fn missing_pan_id_rejected() {
        let config = CoordinatorConfig {
            channel: Some(11),
            ..CoordinatorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pan id is not set"));
    }

    #[test]
    fn missing_channel_rejected() {
        let config = CoordinatorConfig {
            pan_id: Some(1),
            ..CoordinatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));
    }

    #[test]
    fn broadcast_pan_and_bad_channels_rejected() {
        assert!(CoordinatorConfig::new(0xFFFF, 11).validate().is_err());
        assert!(CoordinatorConfig::new(1, 10).validate().is_err());
        assert!(CoordinatorConfig::new(1, 27).validate().is_err());
        assert!(CoordinatorConfig::new(1, 26).validate().is_ok());
    }
}
