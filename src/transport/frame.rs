//! Inbound wire-frame classification (spec §6.1).
//!
//! Mirrors the teacher's `RawCdpMessage`/`classify` idiom: every inbound
//! message is parsed into a permissive raw shape first, then classified by
//! its `type` (or, for `connect_response`, `event`) field.

use serde_json::Value;

use crate::model::Attempt;

#[derive(Debug, serde::Deserialize)]
struct RawInboundFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    event: Option<String>,
    body: Option<Value>,
}

impl RawInboundFrame {
    fn kind(&self) -> Option<&str> {
        self.kind.as_deref().or(self.event.as_deref())
    }
}

/// A classified inbound frame (spec §4.A "Inbound frame dispatch").
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// `type = "attempt"` — a delivery attempt to dispatch.
    Attempt(Attempt),
    /// `event = "connect_response"` — handshake acknowledgement.
    ConnectResponse,
}

/// Parse and classify a single inbound text frame.
///
/// Returns `Err` only when the frame is recognized as an `attempt` but its
/// body fails to deserialize — malformed JSON or an unrecognized `type`/
/// `event` is reported via `Ok(None)` and logged by the caller, per spec
/// §4.A ("Any other → log at `tracing::debug!` and ignore").
pub fn classify(text: &str) -> Result<Option<InboundFrame>, serde_json::Error> {
    let raw: RawInboundFrame = serde_json::from_str(text)?;
    match raw.kind() {
        Some("attempt") => {
            let body = raw.body.unwrap_or(Value::Null);
            let attempt: Attempt = serde_json::from_value(body)?;
            Ok(Some(InboundFrame::Attempt(attempt)))
        }
        Some("connect_response") => Ok(Some(InboundFrame::ConnectResponse)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_attempt_frame() {
        let raw = r#"{
            "type": "attempt",
            "body": {
                "event_id": "e1", "attempt_id": "a1", "webhook_id": "c1",
                "cli_path": "/hook",
                "request": { "method": "POST", "timeout": 5000, "data": "{}" }
            }
        }"#;
        let frame = classify(raw).unwrap().unwrap();
        match frame {
            InboundFrame::Attempt(a) => {
                assert_eq!(a.event_id, "e1");
                assert_eq!(a.connection_id, "c1");
            }
            InboundFrame::ConnectResponse => panic!("expected attempt"),
        }
    }

    #[test]
    fn classifies_connect_response_frame() {
        let frame = classify(r#"{"event":"connect_response"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(frame, InboundFrame::ConnectResponse));
    }

    #[test]
    fn unknown_frame_kind_is_ignored() {
        let frame = classify(r#"{"type":"ping"}"#).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(classify("not json").is_err());
    }
}
