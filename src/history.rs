//! Insertion-order event log with bounded retention, a selection cursor, and
//! navigation semantics shared by every renderer (spec §3, §4.E).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::model::{Attempt, AttemptOutcome, AttemptRequest, EventInfo};

/// Default retention cap (spec §9: "this spec picks 1000 for interactive history").
pub const DEFAULT_CAPACITY: usize = 1000;

/// Width of the on-screen "latest events" navigation window (spec §9: `W = 10`).
pub const NAVIGABLE_WINDOW: usize = 10;

/// Ordered log of [`EventInfo`] with dedup, retention, and a selection cursor.
///
/// `selected` is `None` when the log is empty (spec's `-1` sentinel,
/// expressed idiomatically). `user_navigated` tracks whether the cursor is
/// pinned away from the tail by the user (spec §4.E / §8 property 3).
#[derive(Debug)]
pub struct EventHistory {
    events: VecDeque<EventInfo>,
    capacity: usize,
    selected: Option<usize>,
    user_navigated: bool,
    title_shown: bool,
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventHistory {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
            selected: None,
            user_navigated: false,
            title_shown: true,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn user_navigated(&self) -> bool {
        self.user_navigated
    }

    /// Whether the interactive header is still expanded. Collapses on the
    /// first event (spec §4.F: "Header auto-collapses on first event").
    #[must_use]
    pub fn title_shown(&self) -> bool {
        self.title_shown
    }

    pub fn collapse_title(&mut self) {
        self.title_shown = false;
    }

    /// Insert a new pending entry for a freshly arrived attempt.
    ///
    /// Dedupes by `(event_id, time_started)` (spec §8 property 2): a second
    /// insertion with the same key is a no-op, since retries always carry a
    /// new `time_started`.
    pub fn add_pending(&mut self, attempt: &Attempt, time_started: DateTime<Utc>) {
        self.add(EventInfo::pending(attempt, time_started));
    }

    fn add(&mut self, info: EventInfo) {
        let key = info.key();
        if self.events.iter().any(|e| e.key() == key) {
            return;
        }

        self.events.push_back(info);

        if self.events.len() > self.capacity {
            self.events.pop_front();
            if let Some(selected) = self.selected {
                self.selected = Some(selected.saturating_sub(1));
            }
        }

        let last = self.events.len() - 1;
        if self.user_navigated {
            if self.selected == Some(last) {
                self.user_navigated = false;
            }
        } else {
            self.selected = Some(last);
        }
    }

    /// Record the outcome of a previously-pending attempt (spec §4.E
    /// `Update`). If the matching entry isn't found — the dispatch finished
    /// before the pending entry was inserted — a new entry is created with
    /// whatever fields are available.
    pub fn update(
        &mut self,
        event_id: &str,
        time_started: DateTime<Utc>,
        outcome: AttemptOutcome,
    ) {
        if let Some(entry) = self
            .events
            .iter_mut()
            .find(|e| e.event_id == event_id && e.time_started == time_started)
        {
            entry.outcome = Some(outcome);
            return;
        }

        self.add(EventInfo {
            event_id: event_id.to_string(),
            attempt_id: String::new(),
            time_started,
            connection_id: String::new(),
            cli_path: String::new(),
            request: AttemptRequest {
                method: String::new(),
                headers: std::collections::HashMap::new(),
                body: String::new(),
                timeout_ms: 0,
            },
            outcome: Some(outcome),
        });
    }

    /// A copy of the currently selected entry, if any.
    #[must_use]
    pub fn selected(&self) -> Option<EventInfo> {
        self.selected.and_then(|i| self.events.get(i)).cloned()
    }

    /// Indices into the log a renderer should show in its "latest events"
    /// region (spec §4.E `NavigableIndices`).
    #[must_use]
    pub fn navigable_indices(&self) -> Vec<usize> {
        let len = self.events.len();
        if len == 0 {
            return Vec::new();
        }

        let tail_start = len.saturating_sub(NAVIGABLE_WINDOW);
        if self.user_navigated {
            if let Some(selected) = self.selected {
                if selected < tail_start {
                    let mut indices = Vec::with_capacity(NAVIGABLE_WINDOW);
                    indices.push(selected);
                    let inner_start = len.saturating_sub(NAVIGABLE_WINDOW - 1);
                    indices.extend(inner_start..len);
                    return indices;
                }
            }
        }

        (tail_start..len).collect()
    }

    /// Move the cursor within the navigable window (spec §4.E `Navigate`).
    /// `delta` is typically `1` or `-1` (arrow down / up).
    pub fn navigate(&mut self, delta: i32) {
        let indices = self.navigable_indices();
        if indices.is_empty() {
            return;
        }

        let current_pos = self
            .selected
            .and_then(|sel| indices.iter().position(|&i| i == sel))
            .unwrap_or(indices.len() - 1);

        let new_pos = (i64::from(i32::try_from(current_pos).unwrap_or(i32::MAX)) + i64::from(delta))
            .clamp(0, i64::try_from(indices.len() - 1).unwrap_or(0));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let new_index = indices[new_pos as usize];

        self.selected = Some(new_index);
        // The tail of the full log, not just of the navigable window.
        self.user_navigated = Some(new_index) != self.events.len().checked_sub(1);
    }

    /// Iterate the full log in insertion order (used by the interactive
    /// details modal and tests).
    pub fn iter(&self) -> impl Iterator<Item = &EventInfo> {
        self.events.iter()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&EventInfo> {
        self.events.get(index)
    }

    /// Look up an entry by its dedup key, used by renderers to recover the
    /// outcome a [`crate::dispatcher::DispatchEvent::Completed`] refers to.
    #[must_use]
    pub fn find(&self, event_id: &str, time_started: DateTime<Utc>) -> Option<&EventInfo> {
        self.events
            .iter()
            .find(|e| e.event_id == event_id && e.time_started == time_started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttemptRequest;
    use std::collections::HashMap;

    fn attempt(event_id: &str, attempt_id: &str) -> Attempt {
        Attempt {
            event_id: event_id.to_string(),
            attempt_id: attempt_id.to_string(),
            connection_id: "c1".into(),
            cli_path: "/hook".into(),
            request: AttemptRequest {
                method: "POST".into(),
                headers: HashMap::new(),
                body: String::new(),
                timeout_ms: 0,
            },
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn add_sets_selection_to_tail_when_not_navigated() {
        let mut history = EventHistory::default();
        history.add_pending(&attempt("e1", "a1"), ts(1));
        history.add_pending(&attempt("e2", "a2"), ts(2));
        assert_eq!(history.len(), 2);
        assert_eq!(history.selected().unwrap().event_id, "e2");
    }

    #[test]
    fn dedup_by_event_id_and_time_started() {
        let mut history = EventHistory::default();
        history.add_pending(&attempt("e1", "a1"), ts(1));
        history.add_pending(&attempt("e1", "a1"), ts(1));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn retry_with_new_time_started_is_a_new_entry() {
        let mut history = EventHistory::default();
        history.add_pending(&attempt("e1", "a1"), ts(1));
        history.add_pending(&attempt("e1", "a2"), ts(2));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn retention_caps_at_configured_size_and_selects_tail() {
        let mut history = EventHistory::with_capacity(1000);
        for i in 0..1000 {
            history.add_pending(&attempt(&format!("e{i}"), &format!("a{i}")), ts(i));
        }
        assert_eq!(history.len(), 1000);
        assert_eq!(history.selected().unwrap().event_id, "e999");

        history.add_pending(&attempt("e1000", "a1000"), ts(1000));
        assert_eq!(history.len(), 1000);
        assert_eq!(history.get(0).unwrap().event_id, "e1");
        assert_eq!(history.selected().unwrap().event_id, "e1000");
    }

    #[test]
    fn navigation_pins_selection_until_user_returns_to_tail() {
        let mut history = EventHistory::default();
        for i in 0..5 {
            history.add_pending(&attempt(&format!("e{i}"), &format!("a{i}")), ts(i));
        }
        // selected is e4 (index 4); move up two to e2 (index 2).
        history.navigate(-1);
        history.navigate(-1);
        assert!(history.user_navigated());
        assert_eq!(history.selected().unwrap().event_id, "e2");

        // a new event arrives; pinned selection must not move.
        history.add_pending(&attempt("e5", "a5"), ts(5));
        assert!(history.user_navigated());
        assert_eq!(history.selected().unwrap().event_id, "e2");

        // navigate back down to the tail: pin clears.
        history.navigate(1);
        history.navigate(1);
        history.navigate(1);
        history.navigate(1);
        assert!(!history.user_navigated());
        assert_eq!(history.selected().unwrap().event_id, "e5");
    }

    #[test]
    fn navigate_clamps_at_window_bounds() {
        let mut history = EventHistory::default();
        for i in 0..3 {
            history.add_pending(&attempt(&format!("e{i}"), &format!("a{i}")), ts(i));
        }
        history.navigate(-100);
        assert_eq!(history.selected().unwrap().event_id, "e0");
        history.navigate(100);
        assert_eq!(history.selected().unwrap().event_id, "e2");
    }

    #[test]
    fn navigable_indices_pins_out_of_window_selection() {
        let mut history = EventHistory::default();
        for i in 0..20 {
            history.add_pending(&attempt(&format!("e{i}"), &format!("a{i}")), ts(i));
        }
        // Select the very first event (index 0), well before the tail window.
        for _ in 0..19 {
            history.navigate(-1);
        }
        assert_eq!(history.selected().unwrap().event_id, "e0");

        let indices = history.navigable_indices();
        assert_eq!(indices.len(), NAVIGABLE_WINDOW);
        assert_eq!(indices[0], 0);
        // Remaining entries are the last W-1 chronological entries.
        assert_eq!(indices[1], 20 - (NAVIGABLE_WINDOW - 1));
        assert_eq!(*indices.last().unwrap(), 19);
    }

    #[test]
    fn update_mutates_matching_entry_in_place() {
        let mut history = EventHistory::default();
        history.add_pending(&attempt("e1", "a1"), ts(1));
        assert!(history.selected().unwrap().is_pending());

        history.update("e1", ts(1), AttemptOutcome::error());
        let selected = history.selected().unwrap();
        assert!(!selected.is_pending());
        assert_eq!(selected.outcome.unwrap().status, 0);
    }

    #[test]
    fn update_without_prior_pending_inserts_new_entry() {
        let mut history = EventHistory::default();
        history.update("e1", ts(1), AttemptOutcome::error());
        assert_eq!(history.len(), 1);
        assert_eq!(history.selected().unwrap().event_id, "e1");
    }

    #[test]
    fn empty_history_has_no_selection() {
        let history = EventHistory::default();
        assert!(history.selected().is_none());
        assert!(history.navigable_indices().is_empty());
    }
}
