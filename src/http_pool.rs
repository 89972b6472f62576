//! HTTP Client Pool (spec §4.D): a single shared `reqwest::Client` used by
//! every dispatched attempt.
//!
//! `reqwest` doesn't expose a hard per-host connection ceiling or a
//! header-only timeout the way the spec's source client does, so two of the
//! spec's settings are approximated rather than applied literally — see
//! DESIGN.md for the mapping. `max_connections` is not enforced as a hard
//! cap here; the dispatcher tracks an active-request counter against it
//! purely for the high-load advisory (spec §4.C step 4), matching the
//! spec's own description of the setting as a soft threshold.

use std::time::Duration;

/// Approximates `max_idle_conns_per_host` (spec §4.D).
const POOL_MAX_IDLE_PER_HOST: usize = 10;

/// `idle_conn_timeout` (spec §4.D).
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Approximates `response_header_timeout`: reqwest has no header-only
/// timeout, so this bounds the whole request as an upper bound; the
/// dispatcher still attaches its own per-attempt deadline on top (spec
/// §4.C, §4.D "Per-request deadline is attached by the dispatcher").
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the shared client (spec §4.D).
///
/// # Errors
/// Returns the underlying `reqwest::Error` if TLS configuration fails to
/// build (practically unreachable — no custom roots or identity are set).
pub fn build(insecure_tls: bool) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(IDLE_TIMEOUT)
        .timeout(RESPONSE_TIMEOUT)
        .danger_accept_invalid_certs(insecure_tls)
        .build()
}
