use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::StatusRange;

/// Per-phase latency of one check, in milliseconds.
///
/// Zero means the phase was not measured (not reached, not applicable or
/// failed), never a true zero latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub dns_ms: u64,
    pub connect_ms: u64,
    pub tls_handshake_ms: u64,
    pub time_to_first_byte_ms: u64,
    pub download_ms: u64,
}

/// Result of a monitoring check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Timestamp when the check completed
    pub timestamp: DateTime<Utc>,

    /// Overall response time in milliseconds
    pub response_time_ms: u64,

    /// HTTP status code, 0 when no response was received
    pub status_code: u16,

    pub timings: PhaseTimings,

    /// Transfer rate in Kbps derived from the Content-Length header
    pub transfer_rate_kbps: f64,

    /// Whole days until the certificate expires, 0 for plain HTTP or unknown
    pub ssl_expiry_days: i64,

    pub is_healthy: bool,

    /// Which sub-checks failed, empty when healthy
    pub error_message: String,
}

impl CheckResult {
    /// A check that could not complete. Timings of the phases that were
    /// reached are kept; status and response time stay at zero.
    pub fn unreachable(error: impl fmt::Display, timings: PhaseTimings) -> Self {
        Self {
            timestamp: Utc::now(),
            response_time_ms: 0,
            status_code: 0,
            timings,
            transfer_rate_kbps: 0.0,
            ssl_expiry_days: 0,
            is_healthy: false,
            error_message: error.to_string(),
        }
    }

    /// Result recorded when the probe itself failed before measuring anything
    pub fn from_error(error: impl fmt::Display) -> Self {
        Self::unreachable(format!("Check failed: {error}"), PhaseTimings::default())
    }

    /// No status and no response time: the signature of a dropped connection.
    pub fn is_connection_blip(&self) -> bool {
        self.status_code == 0 && self.response_time_ms == 0
    }

    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status_code)
    }
}

/// Outcome of the individual health sub-checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status_in_range: bool,
    pub keyword_found: bool,
    /// True when the certificate is valid or the target is not HTTPS
    pub certificate_ok: bool,
    is_https: bool,
}

impl Verdict {
    pub fn evaluate(
        status_code: u16,
        range: StatusRange,
        keyword: Option<&str>,
        body: &str,
        is_https: bool,
        ssl_expiry_days: i64,
    ) -> Self {
        Self {
            status_in_range: range.contains(status_code),
            keyword_found: match keyword {
                Some(keyword) if !keyword.is_empty() => body.contains(keyword),
                _ => true,
            },
            certificate_ok: !is_https || ssl_expiry_days > 0,
            is_https,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status_in_range && self.keyword_found && self.certificate_ok
    }

    /// Comma separated list of the failed sub-checks
    pub fn error_message(&self) -> String {
        let mut errors = Vec::new();

        if !self.status_in_range {
            errors.push("Status code not in accepted range");
        }
        if !self.keyword_found {
            errors.push("Keyword not found");
        }
        if self.is_https && !self.certificate_ok {
            errors.push("SSL certificate expired or invalid");
        }

        errors.join(", ")
    }
}
