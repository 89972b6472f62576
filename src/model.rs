//! Wire frame and domain types shared across the transport, dispatcher,
//! history, and renderers (spec §3, §6.1).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The inbound request description carried by an [`Attempt`] (spec §6.1).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttemptRequest {
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, rename = "data")]
    pub body: String,
    #[serde(default, rename = "timeout")]
    pub timeout_ms: u64,
}

impl AttemptRequest {
    /// Header names and unquoted values, sorted by name (spec §4.F "Details
    /// action": "sorted headers"). Malformed values are dropped, matching
    /// the dispatcher's resolution of the header-unquoting Open Question
    /// (spec §9, §4.C).
    #[must_use]
    pub fn sorted_headers(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .headers
            .iter()
            .filter_map(|(name, raw)| unquote_header_value(raw).map(|v| (name.clone(), v)))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
}

/// Strip one layer of JSON string quoting from an inbound header value (spec
/// §6.1: "Header values ... are encoded as JSON string literals"). Returns
/// `None` on malformed input (spec §4.C, §9 resolved Open Question).
#[must_use]
pub fn unquote_header_value(raw: &str) -> Option<String> {
    serde_json::from_str::<String>(raw).ok()
}

/// A delivery attempt received over the transport (spec §3 "Attempt").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Attempt {
    pub event_id: String,
    pub attempt_id: String,
    #[serde(default, rename = "webhook_id")]
    pub connection_id: String,
    #[serde(default)]
    pub cli_path: String,
    pub request: AttemptRequest,
}

/// Body of the outbound `attempt_response` frame (spec §6.1).
#[derive(Debug, Clone, Serialize)]
pub struct AttemptResponseBody {
    pub attempt_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

impl AttemptResponseBody {
    #[must_use]
    pub fn success(attempt_id: String, cli_path: String, status: u16, data: String) -> Self {
        Self {
            attempt_id,
            cli_path: Some(cli_path),
            status: Some(status),
            data: Some(data),
            error: false,
        }
    }

    #[must_use]
    pub fn failure(attempt_id: String) -> Self {
        Self {
            attempt_id,
            cli_path: None,
            status: None,
            data: None,
            error: true,
        }
    }
}

/// Outbound `attempt_response` frame (spec §6.1).
#[derive(Debug, Clone, Serialize)]
pub struct AttemptResponseFrame {
    pub event: &'static str,
    pub body: AttemptResponseBody,
}

impl AttemptResponseFrame {
    #[must_use]
    pub fn new(body: AttemptResponseBody) -> Self {
        Self {
            event: "attempt_response",
            body,
        }
    }
}

/// Outcome of dispatching an [`Attempt`] to the local target, recorded on the
/// matching [`EventInfo`] entry (spec §3 "EventInfo").
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub status: u16,
    pub success: bool,
    pub response_headers: HashMap<String, String>,
    pub response_body: String,
    pub response_duration: std::time::Duration,
}

impl AttemptOutcome {
    #[must_use]
    pub fn error() -> Self {
        Self {
            status: 0,
            success: false,
            response_headers: HashMap::new(),
            response_body: String::new(),
            response_duration: std::time::Duration::ZERO,
        }
    }
}

/// One row in the [`crate::history::EventHistory`] (spec §3 "EventInfo").
///
/// Created when an attempt arrives; mutated exactly once when the outcome is
/// known (`outcome` flips from `None` to `Some`).
#[derive(Debug, Clone)]
pub struct EventInfo {
    pub event_id: String,
    pub attempt_id: String,
    pub time_started: DateTime<Utc>,
    pub connection_id: String,
    pub cli_path: String,
    pub request: AttemptRequest,
    pub outcome: Option<AttemptOutcome>,
}

impl EventInfo {
    #[must_use]
    pub fn pending(attempt: &Attempt, time_started: DateTime<Utc>) -> Self {
        Self {
            event_id: attempt.event_id.clone(),
            attempt_id: attempt.attempt_id.clone(),
            time_started,
            connection_id: attempt.connection_id.clone(),
            cli_path: attempt.cli_path.clone(),
            request: attempt.request.clone(),
            outcome: None,
        }
    }

    /// The dedup/identity key used by `EventHistory` (spec §3 invariants).
    #[must_use]
    pub fn key(&self) -> (String, DateTime<Utc>) {
        (self.event_id.clone(), self.time_started)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }
}
