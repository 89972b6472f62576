//! Control Loop (spec §4.H): top-level sequencing — session, then
//! transport/dispatcher/renderer, with reconnect backoff and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ProxyConfig;
use crate::dispatcher::{DispatchEvent, Dispatcher};
use crate::error::AppError;
use crate::history::EventHistory;
use crate::renderer::{self, RendererContext, RendererEvent};
use crate::transport::{self, DisconnectReason, TransportEvent};
use crate::{http_pool, session};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Best-effort grace period for the outbound queue to drain in-flight
/// outcome frames before the transport is torn down (spec §5 "Cancellation
/// ... drains the outbound queue best-effort").
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Run the core for the lifetime of the process: create a session, then
/// loop opening the transport and dispatching attempts until the user quits
/// or an unrecoverable failure occurs.
///
/// # Errors
/// Returns `AppError` when session creation fails, or when the transport
/// cannot be (re-)established before the first successful connect and the
/// pre-connect attempt budget (spec §4.H, §6.5) is exhausted.
pub async fn run(config: ProxyConfig) -> Result<(), AppError> {
    let config = Arc::new(config);
    let cancellation = CancellationToken::new();
    spawn_signal_watcher(cancellation.clone());

    let http_client = http_pool::build(config.insecure_tls).map_err(|e| AppError {
        message: format!("failed to build http client: {e}"),
        code: crate::error::ExitCode::GeneralError,
    })?;

    let history = Arc::new(Mutex::new(EventHistory::default()));
    let (renderer_tx, renderer_handle) = renderer::spawn(RendererContext {
        history: Arc::clone(&history),
        config: Arc::clone(&config),
        http_client: http_client.clone(),
        cancellation: cancellation.clone(),
    });

    let result = run_loop(
        &config,
        &http_client,
        &history,
        &renderer_tx,
        &cancellation,
    )
    .await;

    cancellation.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    drop(renderer_tx);
    let _ = renderer_handle.await;

    result
}

async fn run_loop(
    config: &Arc<ProxyConfig>,
    http_client: &reqwest::Client,
    history: &Arc<Mutex<EventHistory>>,
    renderer_tx: &tokio::sync::mpsc::Sender<RendererEvent>,
    cancellation: &CancellationToken,
) -> Result<(), AppError> {
    let session = match session::create_session(http_client, config, cancellation).await {
        Ok(session) => session,
        Err(e) => {
            let _ = renderer_tx
                .send(RendererEvent::Error(e.to_string()))
                .await;
            return Err(e);
        }
    };
    tracing::info!(session_id = %session.id, "session created");

    let mut has_connected_once = false;
    let mut attempt: u32 = 0;

    loop {
        if cancellation.is_cancelled() {
            return Ok(());
        }
        if !has_connected_once && attempt >= config.max_pre_connect_attempts() {
            let err = AppError::connection_failed(format!(
                "failed to connect after {attempt} attempts"
            ));
            let _ = renderer_tx
                .send(RendererEvent::Error(err.to_string()))
                .await;
            return Err(err);
        }
        attempt += 1;

        let _ = renderer_tx.send(RendererEvent::Connecting).await;
        let open_result = transport::open(
            &config.ws_base,
            &session.id,
            &config.api_key,
            config.project_id.as_deref(),
            config.no_tls,
            CONNECT_TIMEOUT,
        )
        .await;

        let mut transport = match open_result {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(error = %e, attempt, "transport connect failed");
                let _ = renderer_tx
                    .send(RendererEvent::Disconnected(e.to_string()))
                    .await;
                sleep_backoff(attempt, has_connected_once, cancellation).await;
                continue;
            }
        };

        let (events_tx, mut events_rx) = tokio::sync::mpsc::channel::<DispatchEvent>(256);
        let dispatcher = Dispatcher::new(
            http_client.clone(),
            config.target_url.clone(),
            config.max_connections,
            Arc::clone(history),
            transport.sender(),
            events_tx,
        );

        let disconnect_reason = tokio::select! {
            () = cancellation.cancelled() => {
                transport.stop().await;
                return Ok(());
            }
            () = transport.connected() => {
                has_connected_once = true;
                attempt = 0;
                let _ = renderer_tx.send(RendererEvent::Connected).await;
                drive_connection(&mut transport, &dispatcher, &mut events_rx, renderer_tx, cancellation).await
            }
        };

        let _ = renderer_tx
            .send(RendererEvent::Disconnected(disconnect_reason.to_string()))
            .await;

        if cancellation.is_cancelled() {
            return Ok(());
        }
        sleep_backoff(attempt, has_connected_once, cancellation).await;
    }
}

/// Pumps inbound frames to the dispatcher and dispatcher events to the
/// renderer until the transport reports expiry or cancellation fires.
async fn drive_connection(
    transport: &mut transport::Transport,
    dispatcher: &Arc<Dispatcher>,
    events_rx: &mut tokio::sync::mpsc::Receiver<DispatchEvent>,
    renderer_tx: &tokio::sync::mpsc::Sender<RendererEvent>,
    cancellation: &CancellationToken,
) -> DisconnectReason {
    loop {
        tokio::select! {
            () = cancellation.cancelled() => return DisconnectReason::StreamError("shutting down".into()),

            transport_event = transport.next_event() => {
                match transport_event {
                    TransportEvent::Frame(crate::transport::InboundFrame::Attempt(attempt)) => {
                        dispatcher.spawn(attempt);
                    }
                    TransportEvent::Frame(crate::transport::InboundFrame::ConnectResponse) => {}
                    TransportEvent::Expired(reason) => return reason,
                }
            }

            event = events_rx.recv() => {
                if let Some(event) = event {
                    forward_dispatch_event(renderer_tx, event).await;
                }
            }
        }
    }
}

async fn forward_dispatch_event(
    renderer_tx: &tokio::sync::mpsc::Sender<RendererEvent>,
    event: DispatchEvent,
) {
    let mapped = match event {
        DispatchEvent::Pending {
            event_id,
            time_started,
        } => RendererEvent::Pending {
            event_id,
            time_started,
        },
        DispatchEvent::Completed {
            event_id,
            time_started,
        } => RendererEvent::Completed {
            event_id,
            time_started,
        },
        DispatchEvent::HighLoad(active) => RendererEvent::ConnectionWarning(active),
    };
    let _ = renderer_tx.send(mapped).await;
}

/// Reconnect backoff (spec §4.H, §8 property 6): `0` before the first
/// successful connect (the pre-connect budget is about attempt *count*, not
/// spacing), otherwise `min(10s, 100ms * 2^(k-1))`.
fn backoff_duration(attempt: u32, has_connected_once: bool) -> Duration {
    if !has_connected_once || attempt == 0 {
        return Duration::ZERO;
    }
    let millis = 100_u64.saturating_mul(1_u64 << attempt.saturating_sub(1).min(63));
    Duration::from_millis(millis).min(Duration::from_secs(10))
}

async fn sleep_backoff(attempt: u32, has_connected_once: bool, cancellation: &CancellationToken) {
    let duration = backoff_duration(attempt, has_connected_once);
    if duration.is_zero() {
        return;
    }
    tokio::select! {
        () = cancellation.cancelled() => {}
        () = tokio::time::sleep(duration) => {}
    }
}

fn spawn_signal_watcher(cancellation: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to install SIGTERM handler");
                        return;
                    }
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        cancellation.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_zero_before_first_connect() {
        assert_eq!(backoff_duration(1, false), Duration::ZERO);
        assert_eq!(backoff_duration(5, false), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_after_first_connect() {
        assert_eq!(backoff_duration(1, true), Duration::from_millis(100));
        assert_eq!(backoff_duration(2, true), Duration::from_millis(200));
        assert_eq!(backoff_duration(3, true), Duration::from_millis(400));
    }

    #[test]
    fn backoff_caps_at_ten_seconds() {
        assert_eq!(backoff_duration(20, true), Duration::from_secs(10));
    }
}
