use std::fmt;

/// Errors surfaced by the duplex transport (spec §4.A).
#[derive(Debug)]
pub enum TransportError {
    /// The initial connection could not be established.
    Connect(String),

    /// The connection attempt exceeded the configured timeout.
    ConnectTimeout,

    /// A frame could not be serialized to JSON; fatal for the connection
    /// (spec §4.A: "serialization errors are fatal for the connection").
    SerializeFailed(String),

    /// The underlying stream rejected a write.
    SendFailed(String),

    /// The transport task has already exited.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "transport connection error: {msg}"),
            Self::ConnectTimeout => write!(f, "transport connection timed out"),
            Self::SerializeFailed(msg) => write!(f, "transport frame serialization error: {msg}"),
            Self::SendFailed(msg) => write!(f, "transport write error: {msg}"),
            Self::Closed => write!(f, "transport is closed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for crate::error::AppError {
    fn from(e: TransportError) -> Self {
        use crate::error::ExitCode;
        Self {
            message: e.to_string(),
            code: ExitCode::ConnectionError,
        }
    }
}

/// Why the transport stopped delivering frames (spec §4.A `NotifyExpired`).
#[derive(Debug, Clone)]
pub enum DisconnectReason {
    /// The peer closed the stream.
    PeerClosed,
    /// A read or write on the underlying stream failed.
    StreamError(String),
    /// No pong was observed within two keepalive intervals.
    KeepaliveTimeout,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed the connection"),
            Self::StreamError(msg) => write!(f, "stream error: {msg}"),
            Self::KeepaliveTimeout => write!(f, "no keepalive response"),
        }
    }
}
