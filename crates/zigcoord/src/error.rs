//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use zigcoord_config::ConfigError;
use zigcoord_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const NETWORK: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Network ──────────────────────────────────────────────────────
    #[error("Network is not ready (currently {state})")]
    #[diagnostic(
        code(zigcoord::network_not_ready),
        help("Run with -v to follow the bring-up, or increase --timeout.")
    )]
    NetworkNotReady { state: String },

    #[error("Network did not become ready within {seconds}s")]
    #[diagnostic(
        code(zigcoord::timeout),
        help("Increase the wait with --timeout or check the profile's pan_id and channel.")
    )]
    Timeout { seconds: u64 },

    #[error("Coordinator is already running")]
    #[diagnostic(code(zigcoord::already_running))]
    AlreadyRunning,

    #[error("Coordinator error: {message}")]
    #[diagnostic(code(zigcoord::coordinator))]
    Coordinator { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(zigcoord::not_found),
        help("Run: zigcoord {list_command} to see what the network offers")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(zigcoord::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(zigcoord::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: zigcoord config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(zigcoord::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(zigcoord::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(zigcoord::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::AlreadyRunning => exit_code::CONFLICT,
            Self::NetworkNotReady { .. } => exit_code::NETWORK,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config { message } => CliError::Validation {
                field: "profile".into(),
                reason: message,
            },

            CoreError::AlreadyRunning => CliError::AlreadyRunning,

            CoreError::NetworkNotReady { state } => CliError::NetworkNotReady {
                state: state.describe(),
            },

            CoreError::Disconnected => CliError::NetworkNotReady {
                state: "disconnected".into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::NotFound { entity, identifier } => CliError::NotFound {
                resource_type: entity.to_lowercase(),
                identifier,
                list_command: "devices".into(),
            },

            CoreError::Subscription { key, reason } => CliError::Coordinator {
                message: format!("subscription to {key} failed: {reason}"),
            },

            CoreError::Transport { message } | CoreError::Internal(message) => {
                CliError::Coordinator { message }
            }
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name, available } => CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(Box::new(other)),
        }
    }
}
