//! Interactive renderer (spec §4.F): alternate-screen TUI built on
//! `ratatui` + `crossterm` — the idiomatic pairing for Rust terminal UIs.
//! The teacher crate has no TUI of its own; the terminal-lifecycle idiom
//! here (enter/leave alternate screen, raw mode, a pausable event stream) is
//! grounded on the sibling `codex-rs` TUI crate's `tui.rs` and
//! `tui/event_stream.rs`.
//!
//! Modeled as an actor (spec §9): one task owns all UI state and a single
//! `tokio::select!` over three sources — [`RendererEvent`]s from the
//! dispatcher/control loop, [`crate::keyboard::Action`]s from the terminal,
//! and a redraw tick.

use std::io::{self, Stdout};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use tokio::sync::mpsc;

use super::{RendererContext, RendererEvent};
use crate::browser;
use crate::keyboard::{Action, Keyboard};
use crate::model::EventInfo;
use crate::session;

/// Redraw cadence outside of reacting to a fresh event/action, so the
/// pending row's "time elapsed so far" stays roughly live.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Connecting,
    Connected,
    Disconnected,
}

struct UiState {
    conn: ConnState,
    error: Option<String>,
    high_load: bool,
    status_message: Option<String>,
    show_details: bool,
}

impl UiState {
    fn new() -> Self {
        Self {
            conn: ConnState::Connecting,
            error: None,
            high_load: false,
            status_message: None,
            show_details: false,
        }
    }
}

/// Snapshot of the shared [`crate::history::EventHistory`] taken without
/// holding the lock across any I/O (spec §5 "renderers must not hold it
/// across I/O").
struct Snapshot {
    title_shown: bool,
    rows: Vec<EventInfo>,
    selected_key: Option<(String, DateTime<Utc>)>,
}

async fn snapshot(ctx: &RendererContext) -> Snapshot {
    let history = ctx.history.lock().await;
    let rows = history
        .navigable_indices()
        .into_iter()
        .filter_map(|i| history.get(i).cloned())
        .collect();
    Snapshot {
        title_shown: history.title_shown(),
        rows,
        selected_key: history.selected().map(|e| e.key()),
    }
}

pub async fn run(ctx: RendererContext, mut events: mpsc::Receiver<RendererEvent>) {
    if let Err(e) = run_inner(&ctx, &mut events).await {
        tracing::error!(error = %e, "interactive renderer terminated with an I/O error");
    }
}

async fn run_inner(
    ctx: &RendererContext,
    events: &mut mpsc::Receiver<RendererEvent>,
) -> io::Result<()> {
    let mut terminal = enter_terminal()?;
    let _restore = TerminalGuard;

    let mut state = UiState::new();
    let mut keyboard = Keyboard::new();
    let mut tick = tokio::time::interval(TICK_INTERVAL);
    let mut first_event_seen = false;

    loop {
        let snap = snapshot(ctx).await;
        terminal.draw(|frame| draw(frame, &ctx.config, &state, &snap))?;

        tokio::select! {
            () = ctx.cancellation.cancelled() => return Ok(()),

            action = keyboard.next_action() => {
                let Some(action) = action else { return Ok(()) };
                match action {
                    Action::Quit => {
                        ctx.cancellation.cancel();
                        return Ok(());
                    }
                    Action::NavigateUp => ctx.history.lock().await.navigate(-1),
                    Action::NavigateDown => ctx.history.lock().await.navigate(1),
                    Action::CollapseHeader => ctx.history.lock().await.collapse_title(),
                    Action::Retry => retry_selected(ctx, &snap, &mut state).await,
                    Action::Open => open_selected(ctx, &snap, &mut state),
                    Action::Details => {
                        if snap.selected_key.is_some() {
                            keyboard.pause();
                            show_details(&mut terminal, &snap).await?;
                            keyboard.resume();
                        }
                    }
                    Action::Resize => {}
                }
            }

            event = events.recv() => {
                let Some(event) = event else { return Ok(()) };
                if !first_event_seen
                    && matches!(event, RendererEvent::Pending { .. } | RendererEvent::Completed { .. })
                {
                    first_event_seen = true;
                    ctx.history.lock().await.collapse_title();
                }
                apply_event(&mut state, event);
            }

            _ = tick.tick() => {}
        }
    }
}

fn apply_event(state: &mut UiState, event: RendererEvent) {
    match event {
        RendererEvent::Connecting => {
            state.conn = ConnState::Connecting;
        }
        RendererEvent::Connected => {
            state.conn = ConnState::Connected;
            state.error = None;
        }
        RendererEvent::Disconnected(reason) => {
            state.conn = ConnState::Disconnected;
            state.error = Some(reason);
        }
        RendererEvent::Error(message) => state.error = Some(message),
        RendererEvent::ConnectionWarning(active) => state.high_load = active,
        RendererEvent::Pending { .. } | RendererEvent::Completed { .. } => {}
    }
}

async fn retry_selected(ctx: &RendererContext, snap: &Snapshot, state: &mut UiState) {
    let Some((event_id, _)) = &snap.selected_key else {
        return;
    };
    match session::retry_event(&ctx.http_client, &ctx.config, event_id).await {
        Ok(()) => state.status_message = Some(format!("retry requested for {event_id}")),
        Err(e) => state.status_message = Some(format!("retry failed: {e}")),
    }
}

fn open_selected(ctx: &RendererContext, snap: &Snapshot, state: &mut UiState) {
    let Some((event_id, _)) = &snap.selected_key else {
        return;
    };
    let base = if ctx.config.dashboard_base.is_empty() {
        &ctx.config.console_base
    } else {
        &ctx.config.dashboard_base
    };
    let url = format!("{}/events/{event_id}", base.trim_end_matches('/'));
    browser::open(&url);
    state.status_message = Some(format!("opened {url}"));
}

fn enter_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

/// Restores the terminal on every exit path, including an unwinding panic
/// (spec §9 "`defer`-style resource release").
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

fn draw(
    frame: &mut ratatui::Frame<'_>,
    config: &crate::config::ProxyConfig,
    state: &UiState,
    snap: &Snapshot,
) {
    let header_height = if snap.title_shown {
        u16::try_from(config.connections.len()).unwrap_or(u16::MAX).saturating_add(3)
    } else {
        1
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(header_height),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_header(frame, chunks[0], config, snap.title_shown);
    draw_events(frame, chunks[1], snap);
    draw_status_bar(frame, chunks[2], state, snap);
}

fn draw_header(frame: &mut ratatui::Frame<'_>, area: Rect, config: &crate::config::ProxyConfig, expanded: bool) {
    if !expanded {
        let line = Line::from(format!(
            "hookforward — {} connection(s) (press i to expand)",
            config.connections.len()
        ));
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    let mut lines = vec![Line::from(Span::styled(
        "hookforward",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))];
    for conn in &config.connections {
        lines.push(Line::from(format!(
            "  {} -> {}{}",
            conn.source_name, conn.destination_name, conn.cli_path
        )));
    }
    if !config.dashboard_base.is_empty() {
        lines.push(Line::from(format!("  dashboard: {}", config.dashboard_base)));
    }
    let block = Block::default().borders(Borders::BOTTOM);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_events(frame: &mut ratatui::Frame<'_>, area: Rect, snap: &Snapshot) {
    let lines: Vec<Line> = snap
        .rows
        .iter()
        .map(|info| event_line(info, is_selected(info, &snap.selected_key)))
        .collect();
    frame.render_widget(Paragraph::new(lines), area);
}

fn is_selected(info: &EventInfo, selected: &Option<(String, DateTime<Utc>)>) -> bool {
    selected.as_ref() == Some(&info.key())
}

fn event_line(info: &EventInfo, selected: bool) -> Line<'static> {
    let marker = if selected { "> " } else { "  " };
    let (status_text, color) = match &info.outcome {
        None => ("pending".to_string(), Color::Yellow),
        Some(outcome) if outcome.success => (
            format!("{} ({}ms)", outcome.status, outcome.response_duration.as_millis()),
            Color::Green,
        ),
        Some(outcome) if outcome.status == 0 => ("error".to_string(), Color::Red),
        Some(outcome) => (format!("{}", outcome.status), Color::Red),
    };
    Line::from(vec![
        Span::raw(marker.to_string()),
        Span::styled(
            format!("{:<6} {:<24} ", info.request.method, info.cli_path),
            if selected {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            },
        ),
        Span::styled(status_text, Style::default().fg(color)),
    ])
}

fn draw_status_bar(frame: &mut ratatui::Frame<'_>, area: Rect, state: &UiState, snap: &Snapshot) {
    let mut spans = vec![match state.conn {
        ConnState::Connecting => Span::styled("connecting", Style::default().fg(Color::Yellow)),
        ConnState::Connected => Span::styled("connected", Style::default().fg(Color::Green)),
        ConnState::Disconnected => Span::styled("disconnected", Style::default().fg(Color::Red)),
    }];
    if state.high_load {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            "high load",
            Style::default().fg(Color::Magenta),
        ));
    }
    if let Some(message) = &state.status_message {
        spans.push(Span::raw("  "));
        spans.push(Span::raw(message.clone()));
    } else if let Some(error) = &state.error {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(error.clone(), Style::default().fg(Color::Red)));
    } else if snap.selected_key.is_some() {
        spans.push(Span::raw(
            "  \u{2191}/\u{2193} navigate  r retry  o open  d details  i header  q quit",
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Full-screen details modal (spec §4.F "Details action"): request
/// method/URL, sorted headers, pretty-printed JSON body when parseable,
/// then response status/headers/body/duration. Blocks on the next key press
/// to dismiss; the caller pauses/resumes the keyboard around this call so
/// navigation keys aren't consumed while the modal is up.
async fn show_details(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    snap: &Snapshot,
) -> io::Result<()> {
    let Some(info) = snap
        .rows
        .iter()
        .find(|info| Some(info.key()) == snap.selected_key)
    else {
        return Ok(());
    };

    let text = details_text(info);
    terminal.draw(|frame| {
        let area = frame.area();
        frame.render_widget(Clear, area);
        let block = Block::default()
            .title("event details (any key to close)")
            .borders(Borders::ALL);
        frame.render_widget(Paragraph::new(text).block(block), area);
    })?;

    // Poll without blocking a runtime worker thread for the duration of the
    // modal — any key dismisses it, bypassing the shared keyboard classifier.
    loop {
        if crossterm::event::poll(Duration::ZERO)? {
            let _ = crossterm::event::read()?;
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
}

fn details_text(info: &EventInfo) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(format!("{} {}", info.request.method, info.cli_path)),
        Line::from(""),
        Line::from("headers:"),
    ];
    for (name, value) in info.request.sorted_headers() {
        lines.push(Line::from(format!("  {name}: {value}")));
    }
    lines.push(Line::from(""));
    lines.push(Line::from("body:"));
    lines.push(Line::from(pretty_body(&info.request.body)));

    if let Some(outcome) = &info.outcome {
        lines.push(Line::from(""));
        lines.push(Line::from(format!(
            "response: status {} ({}ms)",
            outcome.status,
            outcome.response_duration.as_millis()
        )));
        let mut headers: Vec<_> = outcome.response_headers.iter().collect();
        headers.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in headers {
            lines.push(Line::from(format!("  {name}: {value}")));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(pretty_body(&outcome.response_body)));
    }
    lines
}

fn pretty_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}
