//! Quiet renderer (spec §4.F): no pending line, success is silent, only
//! `status == 0` (dispatch failures) and fatal errors reach the user, and
//! only via stderr.

use tokio::sync::mpsc;

use super::{RendererContext, RendererEvent};

pub async fn run(ctx: RendererContext, mut events: mpsc::Receiver<RendererEvent>) {
    loop {
        tokio::select! {
            () = ctx.cancellation.cancelled() => return,
            event = events.recv() => {
                let Some(event) = event else { return };
                handle(&ctx, event).await;
            }
        }
    }
}

async fn handle(ctx: &RendererContext, event: RendererEvent) {
    match event {
        RendererEvent::Error(message) => eprintln!("error: {message}"),
        RendererEvent::Disconnected(reason) => {
            tracing::warn!(reason = %reason, "transport disconnected");
        }
        RendererEvent::Completed {
            event_id,
            time_started,
        } => {
            let history = ctx.history.lock().await;
            if let Some(info) = history.find(&event_id, time_started) {
                if let Some(outcome) = &info.outcome {
                    if outcome.status == 0 {
                        eprintln!(
                            "error: {} {} did not reach the local endpoint",
                            info.request.method, info.cli_path
                        );
                    }
                }
            }
        }
        RendererEvent::Connecting
        | RendererEvent::Connected
        | RendererEvent::Pending { .. }
        | RendererEvent::ConnectionWarning(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::{OutputMode, ProxyConfig};
    use crate::history::EventHistory;
    use crate::model::AttemptOutcome;

    fn empty_config() -> Arc<ProxyConfig> {
        Arc::new(ProxyConfig {
            device_name: String::new(),
            api_key: String::new(),
            project_id: None,
            project_mode: false,
            api_base: String::new(),
            dashboard_base: String::new(),
            console_base: String::new(),
            ws_base: String::new(),
            target_url: String::new(),
            insecure_tls: false,
            no_tls: false,
            output_mode: OutputMode::Quiet,
            max_connections: 50,
            connections: vec![],
        })
    }

    #[tokio::test]
    async fn reports_only_failed_completions() {
        let history = Arc::new(Mutex::new(EventHistory::default()));
        let ts = Utc::now();
        {
            let mut history = history.lock().await;
            history.update(
                "e1",
                ts,
                AttemptOutcome {
                    status: 0,
                    success: false,
                    response_headers: std::collections::HashMap::new(),
                    response_body: String::new(),
                    response_duration: std::time::Duration::ZERO,
                },
            );
        }
        let ctx = RendererContext {
            history,
            config: empty_config(),
            http_client: reqwest::Client::new(),
            cancellation: CancellationToken::new(),
        };
        // Just exercising `handle` directly keeps this test from depending on
        // stderr capture — the property under test is that it doesn't panic
        // and reads the right entry.
        handle(
            &ctx,
            RendererEvent::Completed {
                event_id: "e1".into(),
                time_started: ts,
            },
        )
        .await;
    }
}
