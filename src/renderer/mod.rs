//! Renderers (spec §4.F): three presentation modes driven by the same
//! lifecycle and event stream.
//!
//! The spec describes this surface as a callback object (`OnConnecting`,
//! `OnEventPending`, ...). The idiomatic Rust shape for "many producers, one
//! consumer reacting to a stream of named occurrences" is an actor: a single
//! task owns the rendering state and drains an `mpsc::Receiver<RendererEvent>`
//! fed by the control loop and the dispatcher. Each spec callback maps to one
//! [`RendererEvent`] variant.

pub mod compact;
pub mod interactive;
pub mod quiet;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{OutputMode, ProxyConfig};
use crate::history::EventHistory;

/// One occurrence a renderer reacts to (spec §4.F capability set).
#[derive(Debug, Clone)]
pub enum RendererEvent {
    /// `OnConnecting`.
    Connecting,
    /// `OnConnected`.
    Connected,
    /// `OnDisconnected`.
    Disconnected(String),
    /// `OnError`.
    Error(String),
    /// `OnEventPending` — look up `(event_id, time_started)` in history for
    /// the attempt being dispatched.
    Pending {
        event_id: String,
        time_started: DateTime<Utc>,
    },
    /// `OnEventComplete` / `OnEventError` — the outcome is already recorded
    /// in history under the same key; whether it reads as success or error
    /// is in `EventInfo::outcome`.
    Completed {
        event_id: String,
        time_started: DateTime<Utc>,
    },
    /// `OnConnectionWarning`: entered high load (`true`) or cleared (`false`).
    ConnectionWarning(bool),
}

/// Dependencies every renderer mode shares (spec §4.F, §6.4).
pub struct RendererContext {
    pub history: Arc<Mutex<EventHistory>>,
    pub config: Arc<ProxyConfig>,
    pub http_client: reqwest::Client,
    pub cancellation: CancellationToken,
}

/// Spawn the renderer task selected by `config.output_mode` (spec §4.H: "on
/// `Connected`, ... notify renderer").
///
/// Returns the sender producers push [`RendererEvent`]s into and a join
/// handle the control loop awaits during `cleanup()`.
#[must_use]
pub fn spawn(ctx: RendererContext) -> (mpsc::Sender<RendererEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(256);
    let handle = match ctx.config.output_mode {
        OutputMode::Quiet => tokio::spawn(quiet::run(ctx, rx)),
        OutputMode::Compact => tokio::spawn(compact::run(ctx, rx)),
        OutputMode::Interactive => tokio::spawn(interactive::run(ctx, rx)),
    };
    (tx, handle)
}
