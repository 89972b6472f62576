//! Duplex streaming transport (spec §4.A): a single connection to the
//! configured base URL carrying JSON frames in both directions. Unlike the
//! teacher's CDP transport task, this transport never reconnects itself —
//! the control loop (§4.H) owns backoff and re-open so lifecycle events
//! reach the renderer first.

mod client;
mod error;
mod frame;

pub use client::{Transport, TransportEvent, TransportSender, open};
pub use error::{DisconnectReason, TransportError};
pub use frame::InboundFrame;

#[cfg(test)]
pub use client::test_support;
