//! Command-line front end (spec §1 "Out of scope (external collaborators)").
//!
//! The spec treats flag parsing, the config store, and the interactive
//! login/list flow as collaborators outside the core's scope — it only
//! specifies the `ProxyConfig` shape they must produce (spec §6.4). This
//! module is the thin adapter: it defines the flags a real front end would
//! expose, and resolves them into the core's [`crate::config::ProxyConfig`].
//! There is no profile-file reading or login flow here; flags and
//! environment variables are the whole story, in the teacher's
//! `clap(derive)` idiom.

use clap::Parser;

use crate::config::{Connection, OutputMode, ProxyConfig};

#[derive(Parser)]
#[command(
    name = "hookforward",
    version,
    about = "Relays webhook deliveries from a hosted ingest service to a local HTTP endpoint",
    term_width = 100
)]
pub struct Cli {
    /// API key used to authenticate both the session-create call and the
    /// streaming transport (spec §6.4 `api_key`).
    #[arg(long, env = "HOOKFORWARD_API_KEY")]
    pub api_key: String,

    /// Project/team id, carried alongside the API key when set (spec §6.4
    /// `project_id`).
    #[arg(long, env = "HOOKFORWARD_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Local device name surfaced to the control plane (spec §6.4
    /// `device_name`).
    #[arg(long, env = "HOOKFORWARD_DEVICE_NAME", default_value = "local")]
    pub device_name: String,

    /// Base URL for the control-plane HTTP API (spec §6.2).
    #[arg(
        long,
        env = "HOOKFORWARD_API_BASE",
        default_value = "https://api.hookforward.dev"
    )]
    pub api_base: String,

    /// Base URL for the dashboard, used to build the `o` open-action URL
    /// (spec §4.F).
    #[arg(
        long,
        env = "HOOKFORWARD_DASHBOARD_BASE",
        default_value = "https://dashboard.hookforward.dev"
    )]
    pub dashboard_base: String,

    /// Base URL for the console, used when `dashboard_base` is absent.
    #[arg(long, env = "HOOKFORWARD_CONSOLE_BASE", default_value = "")]
    pub console_base: String,

    /// Base URL for the duplex streaming transport (spec §6.1).
    #[arg(
        long,
        env = "HOOKFORWARD_WS_BASE",
        default_value = "wss://ws.hookforward.dev"
    )]
    pub ws_base: String,

    /// Local HTTP(S) endpoint attempts are forwarded to, e.g.
    /// `http://localhost:3000`.
    #[arg(long, env = "HOOKFORWARD_TARGET_URL")]
    pub target_url: String,

    /// Skip TLS certificate verification on the local target (spec §4.D
    /// `TLS_skip_verify`).
    #[arg(long)]
    pub insecure: bool,

    /// Use `ws://` instead of `wss://` for the streaming transport (spec
    /// §4.A "TLS is used unless an explicit no-tls option is set").
    #[arg(long)]
    pub no_tls: bool,

    /// Rendering mode (spec §4.F / §6.3).
    #[arg(long, value_enum, default_value_t = OutputModeArg::Interactive)]
    pub output: OutputModeArg,

    /// Maximum concurrent connections to the local target (spec §4.D
    /// `max_conns_per_host`).
    #[arg(long, default_value_t = crate::config::DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    /// Connection id to subscribe to; repeat for more than one (spec §3
    /// "Connection"). In a full product this list comes from the
    /// interactive login/listing flow (spec §1), not from flags — exposed
    /// here so the core is independently runnable.
    #[arg(long = "connection", value_parser = parse_connection, required = true)]
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputModeArg {
    Quiet,
    Compact,
    Interactive,
}

impl From<OutputModeArg> for OutputMode {
    fn from(value: OutputModeArg) -> Self {
        match value {
            OutputModeArg::Quiet => Self::Quiet,
            OutputModeArg::Compact => Self::Compact,
            OutputModeArg::Interactive => Self::Interactive,
        }
    }
}

/// Parses `id:source_id:destination_name:cli_path:source_name:source_url`
/// into a [`Connection`]. A real front end builds these from the login/list
/// flow's response rather than a flag string (spec §1); this is a stand-in
/// so the core binary can run standalone and in integration tests.
fn parse_connection(raw: &str) -> Result<Connection, String> {
    let parts: Vec<&str> = raw.splitn(6, ':').collect();
    let [id, source_id, destination_name, cli_path, source_name, source_url] = parts[..] else {
        return Err(format!(
            "expected id:source_id:destination_name:cli_path:source_name:source_url, got {raw:?}"
        ));
    };
    Ok(Connection {
        id: id.to_string(),
        source_id: source_id.to_string(),
        destination_name: destination_name.to_string(),
        cli_path: cli_path.to_string(),
        source_name: source_name.to_string(),
        source_url: source_url.to_string(),
    })
}

impl Cli {
    #[must_use]
    pub fn into_config(self) -> ProxyConfig {
        ProxyConfig {
            device_name: self.device_name,
            api_key: self.api_key,
            project_id: self.project_id.clone(),
            project_mode: self.project_id.is_some(),
            api_base: self.api_base,
            dashboard_base: self.dashboard_base,
            console_base: self.console_base,
            ws_base: self.ws_base,
            target_url: self.target_url,
            insecure_tls: self.insecure,
            no_tls: self.no_tls,
            output_mode: self.output.into(),
            max_connections: self.max_connections,
            connections: self.connections,
        }
    }
}
