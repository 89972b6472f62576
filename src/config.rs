//! Configuration surface consumed by the core (spec §6.4).
//!
//! Populating this struct — reading a profile file, prompting an interactive
//! login, merging CLI flags — is an external concern. The core only ever
//! sees the resolved [`ProxyConfig`].

use serde::{Deserialize, Serialize};

/// A server-side binding of a source to a CLI destination (spec §3).
///
/// The core only uses `id` (to subscribe) and `cli_path` + `destination_name`
/// (for display and path composition); the remaining fields are carried
/// through for the renderer's header and are otherwise opaque.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub id: String,
    pub source_id: String,
    pub destination_name: String,
    pub cli_path: String,
    pub source_name: String,
    pub source_url: String,
}

/// Output rendering mode (spec §4.F / §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Quiet,
    Compact,
    #[default]
    Interactive,
}

/// Fully resolved configuration the core accepts. Nothing else is read.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub device_name: String,
    pub api_key: String,
    pub project_id: Option<String>,
    pub project_mode: bool,
    pub api_base: String,
    pub dashboard_base: String,
    pub console_base: String,
    pub ws_base: String,
    pub target_url: String,
    pub insecure_tls: bool,
    pub no_tls: bool,
    pub output_mode: OutputMode,
    pub max_connections: u32,
    pub connections: Vec<Connection>,
}

/// Default value for `max_connections` when the caller does not override it
/// (spec §4.D).
pub const DEFAULT_MAX_CONNECTIONS: u32 = 50;

impl ProxyConfig {
    /// The connection-ids to subscribe to when creating a session (spec §4.B).
    #[must_use]
    pub fn connection_ids(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.id.clone()).collect()
    }

    /// Maximum connect attempts before giving up pre-first-connect (spec §4.H).
    #[must_use]
    pub fn max_pre_connect_attempts(&self) -> u32 {
        match self.output_mode {
            OutputMode::Interactive => 10,
            OutputMode::Quiet | OutputMode::Compact => 3,
        }
    }
}
