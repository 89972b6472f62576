//! Compact renderer (spec §4.F): one line per event, no pending line, plain
//! stdout/stderr output — the mode a CI log or piped terminal gets.

use tokio::sync::mpsc;

use super::{RendererContext, RendererEvent};
use crate::model::EventInfo;

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
        RendererEvent::Connecting => println!("connecting..."),
        RendererEvent::Connected => println!("connected"),
        RendererEvent::Disconnected(reason) => println!("disconnected: {reason}"),
        RendererEvent::Error(message) => eprintln!("error: {message}"),
        RendererEvent::ConnectionWarning(true) => {
            println!("warning: connection pool under high load");
        }
        RendererEvent::ConnectionWarning(false) | RendererEvent::Pending { .. } => {}
        RendererEvent::Completed {
            event_id,
            time_started,
        } => {
            let history = ctx.history.lock().await;
            if let Some(info) = history.find(&event_id, time_started) {
                print_line(info);
            }
        }
    }
}

fn print_line(info: &EventInfo) {
    let Some(outcome) = &info.outcome else { return };
    if outcome.success {
        println!(
            "{} {} -> {} ({}ms)",
            info.request.method,
            info.cli_path,
            outcome.status,
            outcome.response_duration.as_millis()
        );
    } else if outcome.status == 0 {
        eprintln!(
            "{} {} -> error (no response)",
            info.request.method, info.cli_path
        );
    } else {
        eprintln!(
            "{} {} -> {} ({}ms)",
            info.request.method,
            info.cli_path,
            outcome.status,
            outcome.response_duration.as_millis()
        );
    }
}
