//! Session Manager (spec §4.B): creates a session over the control-plane
//! HTTP API before the transport is opened, and drives the keyboard-retry
//! control-plane call (spec §6.2).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ProxyConfig;
use crate::error::AppError;

/// Number of attempts for session creation, including the first (spec §4.B:
/// "Retries up to 6 times with 1-second spacing").
const MAX_ATTEMPTS: u32 = 6;
const RETRY_SPACING: Duration = Duration::from_secs(1);

/// A created session (spec §3 "Session").
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub id: String,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    webhook_ids: &'a [String],
}

/// Create a session for the connections in `config` (spec §4.B, §6.2).
///
/// Retries on transport error with 1-second spacing; aborts immediately if
/// `cancellation` fires. An empty session id in an otherwise-2xx response is
/// treated as fatal.
///
/// # Errors
/// Returns `AppError::session_failed` if every attempt fails, the response
/// body can't be parsed, or the id is empty.
pub async fn create_session(
    client: &reqwest::Client,
    config: &ProxyConfig,
    cancellation: &CancellationToken,
) -> Result<Session, AppError> {
    let url = format!("{}/sessions", config.api_base.trim_end_matches('/'));
    let connection_ids = config.connection_ids();
    let body = CreateSessionRequest {
        webhook_ids: &connection_ids,
    };

    let mut last_error = String::from("no attempts made");

    for attempt in 1..=MAX_ATTEMPTS {
        if cancellation.is_cancelled() {
            return Err(AppError::session_failed("session creation cancelled"));
        }

        let request = apply_auth(client.post(&url), config).json(&body);

        let outcome = tokio::select! {
            () = cancellation.cancelled() => {
                return Err(AppError::session_failed("session creation cancelled"));
            }
            result = request.send() => result,
        };

        match outcome {
            Ok(response) if response.status().is_success() => {
                let session: Session = response.json().await.map_err(|e| {
                    AppError::session_failed(format!("invalid session response: {e}"))
                })?;
                if session.id.is_empty() {
                    return Err(AppError::session_failed("session id is empty"));
                }
                return Ok(session);
            }
            Ok(response) => {
                last_error = format!("http {}", response.status());
                tracing::warn!(attempt, status = %last_error, "session creation attempt failed");
            }
            Err(e) => {
                last_error = e.to_string();
                tracing::warn!(attempt, error = %last_error, "session creation attempt failed");
            }
        }

        if attempt < MAX_ATTEMPTS {
            tokio::select! {
                () = cancellation.cancelled() => {
                    return Err(AppError::session_failed("session creation cancelled"));
                }
                () = tokio::time::sleep(RETRY_SPACING) => {}
            }
        }
    }

    Err(AppError::session_failed(format!(
        "session creation failed after {MAX_ATTEMPTS} attempts: {last_error}"
    )))
}

/// Request a manual retry of a delivered event (spec §6.2, triggered by the
/// interactive renderer's `r` keyboard action).
///
/// # Errors
/// Returns `AppError::connection_failed` on a transport error or non-2xx
/// response.
pub async fn retry_event(
    client: &reqwest::Client,
    config: &ProxyConfig,
    event_id: &str,
) -> Result<(), AppError> {
    let url = format!(
        "{}/events/{event_id}/retry",
        config.api_base.trim_end_matches('/')
    );

    let response = apply_auth(client.post(&url), config)
        .json(&serde_json::json!({}))
        .send()
        .await
        .map_err(|e| AppError::connection_failed(format!("retry request failed: {e}")))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(AppError::connection_failed(format!(
            "retry rejected: http {}",
            response.status()
        )))
    }
}

fn apply_auth(request: reqwest::RequestBuilder, config: &ProxyConfig) -> reqwest::RequestBuilder {
    let request = request.bearer_auth(&config.api_key);
    match &config.project_id {
        Some(project_id) => request.header("X-Project-Id", project_id),
        None => request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Connection, OutputMode};
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config_for(api_base: String) -> ProxyConfig {
        ProxyConfig {
            device_name: "dev".into(),
            api_key: "key_1".into(),
            project_id: None,
            project_mode: false,
            api_base,
            dashboard_base: String::new(),
            console_base: String::new(),
            ws_base: String::new(),
            target_url: "http://localhost:3000".into(),
            insecure_tls: false,
            no_tls: false,
            output_mode: OutputMode::Quiet,
            max_connections: 50,
            connections: vec![Connection {
                id: "conn_1".into(),
                source_id: "src_1".into(),
                destination_name: "local".into(),
                cli_path: "/hook".into(),
                source_name: "stripe".into(),
                source_url: "https://stripe.example".into(),
            }],
        }
    }

    /// Spawn a one-shot local HTTP server that replies with the same
    /// canned response to every request, counting how many it received.
    /// Matches the dependency-light style of the teacher's own
    /// `tests/cdp_integration.rs` rather than pulling in a mock-server crate.
    async fn spawn_server(responses: Vec<&'static str>) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        tokio::spawn(async move {
            for response in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0_u8; 4096];
                let _ = socket.read(&mut buf).await;
                count_clone.fetch_add(1, Ordering::SeqCst);
                let _: Result<(), Infallible> = socket.write_all(response.as_bytes()).await.map(|()| ());
                let _ = socket.shutdown().await;
            }
        });

        (addr, count)
    }

    const OK_SESSION: &str =
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 15\r\nConnection: close\r\n\r\n{\"id\":\"sess_1\"}";
    const OK_EMPTY_ID: &str =
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 9\r\nConnection: close\r\n\r\n{\"id\":\"\"}";
    const SERVER_ERROR: &str =
        "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    #[tokio::test]
    async fn create_session_succeeds_on_first_try() {
        let (addr, count) = spawn_server(vec![OK_SESSION]).await;
        let config = config_for(format!("http://{addr}"));
        let client = reqwest::Client::new();
        let cancellation = CancellationToken::new();

        let session = create_session(&client, &config, &cancellation).await.unwrap();
        assert_eq!(session.id, "sess_1");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_session_retries_after_server_error() {
        let (addr, count) = spawn_server(vec![SERVER_ERROR, OK_SESSION]).await;
        let config = config_for(format!("http://{addr}"));
        let client = reqwest::Client::new();
        let cancellation = CancellationToken::new();

        let session = create_session(&client, &config, &cancellation).await.unwrap();
        assert_eq!(session.id, "sess_1");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn create_session_fails_after_exhausting_retries() {
        let responses = vec![SERVER_ERROR; MAX_ATTEMPTS as usize];
        let (addr, count) = spawn_server(responses).await;
        let config = config_for(format!("http://{addr}"));
        let client = reqwest::Client::new();
        let cancellation = CancellationToken::new();

        let result = create_session(&client, &config, &cancellation).await;
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn create_session_rejects_empty_id_as_fatal() {
        let (addr, _count) = spawn_server(vec![OK_EMPTY_ID]).await;
        let config = config_for(format!("http://{addr}"));
        let client = reqwest::Client::new();
        let cancellation = CancellationToken::new();

        let result = create_session(&client, &config, &cancellation).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_session_aborts_immediately_when_cancelled() {
        let config = config_for("http://127.0.0.1:1".to_string());
        let client = reqwest::Client::new();
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let result = create_session(&client, &config, &cancellation).await;
        assert!(result.is_err());
    }
}
