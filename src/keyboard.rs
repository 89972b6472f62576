//! Keyboard & Signal (spec §4.G): interactive-mode-only raw-stdin reading.
//!
//! Ctrl-C/SIGTERM handling for `quiet`/`compact` mode is plain signal
//! watching (`tokio::signal`) owned by the control loop — there's no raw
//! terminal to read from in those modes. This module covers the interactive
//! case: a shared `crossterm::event::EventStream` classified into the
//! high-level actions the spec's keymap names, with a pause/resume gate so
//! the details modal (spec §4.F "Details action") can own the terminal
//! without the navigation keys leaking through.

use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use futures_util::StreamExt;

/// A keymap action (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    NavigateUp,
    NavigateDown,
    Retry,
    Open,
    Details,
    CollapseHeader,
    Resize,
}

/// Reads the shared terminal event stream and classifies it into [`Action`]s.
pub struct Keyboard {
    events: EventStream,
    paused: bool,
}

impl Keyboard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: EventStream::new(),
            paused: false,
        }
    }

    /// Suspend dispatch while the details modal owns the terminal (spec
    /// §4.G: "Suspend input while an external pager ... owns the terminal").
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume dispatch; buffered input observed while paused is simply
    /// never classified, which is equivalent to draining it.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Await the next dispatchable action. Returns `None` once stdin closes.
    pub async fn next_action(&mut self) -> Option<Action> {
        loop {
            let event = self.events.next().await?;
            let Ok(event) = event else { continue };
            if self.paused {
                continue;
            }
            if let Some(action) = classify(&event) {
                return Some(action);
            }
        }
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(event: &Event) -> Option<Action> {
    match event {
        Event::Resize(_, _) => Some(Action::Resize),
        Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Up => Some(Action::NavigateUp),
            KeyCode::Down => Some(Action::NavigateDown),
            KeyCode::Char('r' | 'R') => Some(Action::Retry),
            KeyCode::Char('o' | 'O') => Some(Action::Open),
            KeyCode::Char('d' | 'D') => Some(Action::Details),
            KeyCode::Char('i' | 'I') => Some(Action::CollapseHeader),
            KeyCode::Char('q' | 'Q') => Some(Action::Quit),
            _ => None,
        },
        _ => None,
    }
}
