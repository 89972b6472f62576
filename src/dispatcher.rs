//! Attempt Dispatcher (spec §4.C): for each inbound attempt, dispatches one
//! concurrent HTTP request to the local target and produces exactly one
//! outcome frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::{mpsc, Mutex};

use crate::history::EventHistory;
use crate::model::{Attempt, AttemptOutcome, AttemptResponseBody, AttemptResponseFrame};
use crate::transport::TransportSender;

/// Default per-attempt timeout when the inbound frame carries `timeout_ms = 0`
/// (spec §4.C step 2).
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// How long to wait before emitting a pending notification (spec §4.C step 5).
const PENDING_THRESHOLD: Duration = Duration::from_millis(100);

/// High-load advisory thresholds, as a fraction of `max_connections` (spec
/// §4.C step 4).
const HIGH_LOAD_RAISE: f64 = 0.80;
const HIGH_LOAD_CLEAR: f64 = 0.60;

/// Notifications the dispatcher raises for the renderer (spec §4.C steps 4–5).
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A call is taking longer than 100ms; the renderer may show it as pending.
    Pending {
        event_id: String,
        time_started: DateTime<Utc>,
    },
    /// The outcome for `(event_id, time_started)` is now recorded in history.
    Completed {
        event_id: String,
        time_started: DateTime<Utc>,
    },
    /// Active dispatches crossed the 80% watermark (`true`) or dropped back
    /// below 60% (`false`).
    HighLoad(bool),
}

/// Dispatches inbound attempts against the fixed local target (spec §4.C).
pub struct Dispatcher {
    client: reqwest::Client,
    target_url: String,
    max_connections: u32,
    active: AtomicU32,
    high_load_warned: AtomicBool,
    history: Arc<Mutex<EventHistory>>,
    transport: TransportSender,
    events_tx: mpsc::Sender<DispatchEvent>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        target_url: String,
        max_connections: u32,
        history: Arc<Mutex<EventHistory>>,
        transport: TransportSender,
        events_tx: mpsc::Sender<DispatchEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            target_url: target_url.trim_end_matches('/').to_string(),
            max_connections,
            active: AtomicU32::new(0),
            high_load_warned: AtomicBool::new(false),
            history,
            transport,
            events_tx,
        })
    }

    /// Spawn the dispatch of a single attempt as an independent task, so
    /// attempts run concurrently with one another (spec §3 "concurrent HTTP
    /// attempt dispatcher").
    pub fn spawn(self: &Arc<Self>, attempt: Attempt) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.dispatch(attempt).await;
        });
    }

    async fn dispatch(&self, attempt: Attempt) {
        let time_started = Utc::now();
        {
            let mut history = self.history.lock().await;
            history.add_pending(&attempt, time_started);
        }

        let _guard = self.enter();

        let url = format!("{}{}", self.target_url, attempt.cli_path);
        let timeout = if attempt.request.timeout_ms == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_millis(attempt.request.timeout_ms)
        };
        let method = reqwest::Method::from_bytes(attempt.request.method.as_bytes())
            .unwrap_or(reqwest::Method::POST);
        let headers = build_headers(&attempt);

        let request = self
            .client
            .request(method, &url)
            .headers(headers)
            .timeout(timeout)
            .body(attempt.request.body.clone())
            .send();
        tokio::pin!(request);

        let fast_result = tokio::select! {
            result = &mut request => Some(result),
            () = tokio::time::sleep(PENDING_THRESHOLD) => None,
        };

        let result = match fast_result {
            Some(result) => result,
            None => {
                self.notify(DispatchEvent::Pending {
                    event_id: attempt.event_id.clone(),
                    time_started,
                })
                .await;
                request.await
            }
        };
        let outcome = self.finish(result).await;

        {
            let mut history = self.history.lock().await;
            history.update(&attempt.event_id, time_started, outcome.clone());
        }
        self.notify(DispatchEvent::Completed {
            event_id: attempt.event_id.clone(),
            time_started,
        })
        .await;

        let frame = response_frame(&attempt, &outcome);
        if let Err(e) = self.transport.send(frame).await {
            tracing::debug!(error = %e, event_id = %attempt.event_id, "failed to send attempt_response");
        }
    }

    async fn finish(&self, result: reqwest::Result<reqwest::Response>) -> AttemptOutcome {
        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let success = response.status().is_success();
                let response_headers = response
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .to_str()
                            .ok()
                            .map(|v| (name.as_str().to_string(), v.to_string()))
                    })
                    .collect();
                let start = tokio::time::Instant::now();
                match response.text().await {
                    Ok(body) => AttemptOutcome {
                        status,
                        success,
                        response_headers,
                        response_body: body,
                        response_duration: start.elapsed(),
                    },
                    Err(_) => AttemptOutcome::error(),
                }
            }
            Err(_) => AttemptOutcome::error(),
        }
    }

    async fn notify(&self, event: DispatchEvent) {
        let _ = self.events_tx.send(event).await;
    }

    fn enter(&self) -> ActiveGuard<'_> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_high_load(active);
        ActiveGuard { dispatcher: self }
    }

    fn leave(&self) {
        let active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        self.check_high_load(active);
    }

    fn check_high_load(&self, active: u32) {
        if self.max_connections == 0 {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = f64::from(active) / f64::from(self.max_connections);
        if ratio > HIGH_LOAD_RAISE && !self.high_load_warned.swap(true, Ordering::SeqCst) {
            let events_tx = self.events_tx.clone();
            tokio::spawn(async move {
                let _ = events_tx.send(DispatchEvent::HighLoad(true)).await;
            });
        } else if ratio < HIGH_LOAD_CLEAR && self.high_load_warned.swap(false, Ordering::SeqCst) {
            let events_tx = self.events_tx.clone();
            tokio::spawn(async move {
                let _ = events_tx.send(DispatchEvent::HighLoad(false)).await;
            });
        }
    }
}

struct ActiveGuard<'a> {
    dispatcher: &'a Dispatcher,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.leave();
    }
}

/// Build the outbound HTTP headers from the attempt's JSON-quoted header
/// values, dropping any that fail to unquote (spec §4.C, resolved Open
/// Question in §9).
fn build_headers(attempt: &Attempt) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, raw_value) in &attempt.request.headers {
        let Some(unquoted) = crate::model::unquote_header_value(raw_value) else {
            tracing::warn!(
                event_id = %attempt.event_id,
                attempt_id = %attempt.attempt_id,
                header = %name,
                "dropping malformed header value"
            );
            continue;
        };
        let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&unquoted),
        ) else {
            tracing::warn!(
                event_id = %attempt.event_id,
                attempt_id = %attempt.attempt_id,
                header = %name,
                "dropping header with invalid name or value"
            );
            continue;
        };
        headers.insert(header_name, header_value);
    }
    headers
}

fn response_frame(attempt: &Attempt, outcome: &AttemptOutcome) -> AttemptResponseFrame {
    let body = if outcome.status == 0 {
        AttemptResponseBody::failure(attempt.attempt_id.clone())
    } else {
        AttemptResponseBody::success(
            attempt.attempt_id.clone(),
            attempt.cli_path.clone(),
            outcome.status,
            outcome.response_body.clone(),
        )
    };
    AttemptResponseFrame::new(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttemptRequest;
    use std::collections::HashMap;
    use std::convert::Infallible;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn attempt(event_id: &str, cli_path: &str, headers: HashMap<String, String>) -> Attempt {
        Attempt {
            event_id: event_id.into(),
            attempt_id: format!("{event_id}-a1"),
            connection_id: "conn_1".into(),
            cli_path: cli_path.into(),
            request: AttemptRequest {
                method: "POST".into(),
                headers,
                body: "{}".into(),
                timeout_ms: 0,
            },
        }
    }

    #[test]
    fn unquotes_valid_header_and_drops_malformed_one() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "\"application/json\"".to_string());
        headers.insert("x-bad".to_string(), "\"unterminated".to_string());
        let attempt = attempt("e1", "/hook", headers);

        let built = build_headers(&attempt);
        assert_eq!(built.get("content-type").unwrap(), "application/json");
        assert!(built.get("x-bad").is_none());
    }

    #[tokio::test]
    async fn dispatch_produces_success_frame_and_updates_history() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
            let _: Result<(), Infallible> = socket.write_all(response.as_bytes()).await.map(|()| ());
            let _ = socket.shutdown().await;
        });

        let client = reqwest::Client::new();
        let history = Arc::new(Mutex::new(EventHistory::default()));
        let (transport_cmd_tx, mut transport_cmd_rx) = mpsc::channel(8);
        let transport = test_sender(transport_cmd_tx);
        let (events_tx, mut events_rx) = mpsc::channel(16);

        let dispatcher = Dispatcher::new(
            client,
            format!("http://{addr}"),
            50,
            Arc::clone(&history),
            transport,
            events_tx,
        );

        dispatcher.dispatch(attempt("e1", "/hook", HashMap::new())).await;

        let frame = transport_cmd_rx.recv().await.unwrap();
        assert_eq!(frame.body.status, Some(200));
        assert_eq!(frame.body.data.as_deref(), Some("ok"));

        let history = history.lock().await;
        let entry = history.selected().unwrap();
        assert!(!entry.is_pending());
        assert_eq!(entry.outcome.unwrap().status, 200);

        let mut saw_completed = false;
        while let Ok(event) = events_rx.try_recv() {
            if matches!(event, DispatchEvent::Completed { .. }) {
                saw_completed = true;
            }
        }
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn dispatch_produces_error_frame_on_connection_failure() {
        let client = reqwest::Client::new();
        let history = Arc::new(Mutex::new(EventHistory::default()));
        let (transport_cmd_tx, mut transport_cmd_rx) = mpsc::channel(8);
        let transport = test_sender(transport_cmd_tx);
        let (events_tx, _events_rx) = mpsc::channel(16);

        let dispatcher = Dispatcher::new(
            client,
            "http://127.0.0.1:1".to_string(),
            50,
            Arc::clone(&history),
            transport,
            events_tx,
        );

        dispatcher.dispatch(attempt("e1", "/hook", HashMap::new())).await;

        let frame = transport_cmd_rx.recv().await.unwrap();
        assert!(frame.body.error);
        assert!(frame.body.status.is_none());

        let history = history.lock().await;
        let entry = history.selected().unwrap();
        assert_eq!(entry.outcome.as_ref().unwrap().status, 0);
        assert!(!entry.outcome.as_ref().unwrap().success);
    }

    #[tokio::test]
    async fn body_read_failure_produces_error_frame_despite_200_status() {
        // Declares a body longer than what is actually sent, then closes the
        // connection — the status line succeeds but `response.text()` fails
        // mid-read (spec §4.C step 7: "body-read failure" is an error outcome,
        // not a success with a truncated body).
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort";
            let _: Result<(), Infallible> = socket.write_all(response.as_bytes()).await.map(|()| ());
            let _ = socket.shutdown().await;
        });

        let client = reqwest::Client::new();
        let history = Arc::new(Mutex::new(EventHistory::default()));
        let (transport_cmd_tx, mut transport_cmd_rx) = mpsc::channel(8);
        let transport = test_sender(transport_cmd_tx);
        let (events_tx, _events_rx) = mpsc::channel(16);

        let dispatcher = Dispatcher::new(
            client,
            format!("http://{addr}"),
            50,
            Arc::clone(&history),
            transport,
            events_tx,
        );

        dispatcher.dispatch(attempt("e1", "/hook", HashMap::new())).await;

        let frame = transport_cmd_rx.recv().await.unwrap();
        assert!(frame.body.error);
        assert!(frame.body.status.is_none());

        let history = history.lock().await;
        let entry = history.selected().unwrap();
        assert_eq!(entry.outcome.as_ref().unwrap().status, 0);
        assert!(!entry.outcome.as_ref().unwrap().success);
    }

    #[tokio::test]
    async fn slow_endpoint_emits_pending_before_completed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 4096];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(PENDING_THRESHOLD * 2).await;
            let response = "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
            let _: Result<(), Infallible> = socket.write_all(response.as_bytes()).await.map(|()| ());
            let _ = socket.shutdown().await;
        });

        let client = reqwest::Client::new();
        let history = Arc::new(Mutex::new(EventHistory::default()));
        let (transport_cmd_tx, mut transport_cmd_rx) = mpsc::channel(8);
        let transport = test_sender(transport_cmd_tx);
        let (events_tx, mut events_rx) = mpsc::channel(16);

        let dispatcher = Dispatcher::new(
            client,
            format!("http://{addr}"),
            50,
            Arc::clone(&history),
            transport,
            events_tx,
        );

        dispatcher.dispatch(attempt("e1", "/hook", HashMap::new())).await;
        let _ = transport_cmd_rx.recv().await.unwrap();

        let first = events_rx.recv().await.unwrap();
        assert!(matches!(first, DispatchEvent::Pending { .. }));
        let second = events_rx.recv().await.unwrap();
        assert!(matches!(second, DispatchEvent::Completed { .. }));
    }

    #[tokio::test]
    async fn high_load_hysteresis_raises_at_80_percent_and_clears_at_60_percent() {
        let client = reqwest::Client::new();
        let history = Arc::new(Mutex::new(EventHistory::default()));
        let (transport_cmd_tx, _transport_cmd_rx) = mpsc::channel(8);
        let transport = test_sender(transport_cmd_tx);
        let (events_tx, mut events_rx) = mpsc::channel(16);

        let dispatcher = Dispatcher::new(client, "http://unused".to_string(), 10, history, transport, events_tx);

        // Below the raise threshold: no notification.
        dispatcher.check_high_load(7);
        assert!(events_rx.try_recv().is_err());

        // Crossing 80%: one HighLoad(true), not repeated on a second call.
        dispatcher.check_high_load(9);
        assert!(matches!(
            events_rx.recv().await.unwrap(),
            DispatchEvent::HighLoad(true)
        ));
        dispatcher.check_high_load(9);
        assert!(events_rx.try_recv().is_err());

        // Staying above 60% clears nothing.
        dispatcher.check_high_load(7);
        assert!(events_rx.try_recv().is_err());

        // Dropping below 60% clears the warning exactly once.
        dispatcher.check_high_load(5);
        assert!(matches!(
            events_rx.recv().await.unwrap(),
            DispatchEvent::HighLoad(false)
        ));
        dispatcher.check_high_load(5);
        assert!(events_rx.try_recv().is_err());
    }

    /// Build a `TransportSender` backed by a plain channel for tests, bypassing
    /// the real WebSocket actor task (spec §8: "a fake transport... standing
    /// in for the WebSocket").
    fn test_sender(tx: mpsc::Sender<AttemptResponseFrame>) -> TransportSender {
        crate::transport::test_support::sender_from_channel(tx)
    }
}
