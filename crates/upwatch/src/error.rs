//! Error types shared across the engine.
//!
//! Probe failures never leave a check cycle as errors: they are folded into
//! an unhealthy [`CheckResult`](crate::CheckResult). The types here describe
//! what went wrong so that the folded result carries a precise message.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::probe::Phase;

/// Invalid target configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0} (expected http or https)")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("Check interval out of range: {0} seconds (allowed: 30-3600)")]
    IntervalOutOfRange(u64),

    #[error("Invalid status code range {min}-{max} (allowed: 100-599, min <= max)")]
    InvalidStatusRange { min: u16, max: u16 },
}

/// A time window outside the accepted vocabulary
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("Unknown time range `{0}` (expected one of 1h, 3h, 6h, 12h, 24h, 2d, 7d, 14d, 30d, 90d)")]
    Unknown(String),
}

/// Transport-level failure while probing a target
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),

    #[error("DNS lookup for {host} failed: {reason}")]
    Resolve { host: String, reason: String },

    #[error("TCP connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("Socket I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("{phase} timed out after {}s", .limit.as_secs())]
    Timeout { phase: Phase, limit: Duration },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Probe task aborted: {0}")]
    Aborted(String),
}

impl ProbeError {
    /// Whether the error means the endpoint could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        match self {
            ProbeError::Resolve { .. } | ProbeError::Connect { .. } | ProbeError::Tls(_) => true,
            ProbeError::Timeout { phase, .. } => phase.is_connection_setup(),
            _ => false,
        }
    }
}
