//! Performance probe: one check of one target.
//!
//! A check measures the protocol phases over a raw socket, issues a normal
//! GET for status and body, reads the certificate expiry for HTTPS targets
//! and folds everything into a [`CheckResult`].

mod http;
mod phases;
mod tls;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::Url;

pub use self::http::transfer_rate_kbps;
pub use self::phases::Phase;
pub use self::tls::days_until;
use self::phases::{Endpoint, elapsed_ms};
use crate::check::{CheckResult, PhaseTimings, Verdict};
use crate::error::ProbeError;
use crate::target::Target;

pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Probe trait for executing a single check
#[async_trait]
pub trait Probe: Send + Sync {
    /// Run one check. Unreachable targets and failed validations come back
    /// as unhealthy results; an error means the check could not be attempted.
    async fn check(&self, target: &Target) -> Result<CheckResult, ProbeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Bound on every socket-level step
    pub socket_timeout: Duration,
    /// Bound on the whole GET, redirects included
    pub request_timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Let the GET through on self-signed or expired certificates. The
    /// expiry still decides health.
    pub accept_invalid_certs: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: format!("upwatch/{}", env!("CARGO_PKG_VERSION")),
            accept_invalid_certs: false,
        }
    }
}

impl ProbeConfig {
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

/// HTTP(S) probe measuring per-phase latency
#[derive(Clone)]
pub struct PerformanceProbe {
    config: ProbeConfig,
    client: reqwest::Client,
    connector: TlsConnector,
}

impl PerformanceProbe {
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        let client = http::client(&config)?;
        let connector = tls::connector()?;
        Ok(Self { config, client, connector })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    async fn measure_phases(&self, endpoint: &Endpoint, timings: &mut PhaseTimings) -> Result<(), ProbeError> {
        let limit = self.config.socket_timeout;
        // Whole walk is capped too, so a server that trickles bytes cannot hold the check
        let walk = phases::measure(endpoint, &self.connector, &self.config.user_agent, limit, timings);
        match tokio::time::timeout(self.config.request_timeout, walk).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout { phase: Phase::Download, limit: self.config.request_timeout }),
        }
    }

    async fn ssl_expiry_days(&self, endpoint: &Endpoint) -> i64 {
        match tls::expiry_days(&self.connector, endpoint, self.config.socket_timeout).await {
            Ok(days) => days,
            Err(error) => {
                debug!(host = %endpoint.host, error = %error, "Certificate expiry unavailable");
                0
            }
        }
    }
}

#[async_trait]
impl Probe for PerformanceProbe {
    async fn check(&self, target: &Target) -> Result<CheckResult, ProbeError> {
        let url = Url::parse(&target.url).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;
        let endpoint = Endpoint::from_url(&url)?;
        let started = Instant::now();

        let mut timings = PhaseTimings::default();
        if let Err(error) = self.measure_phases(&endpoint, &mut timings).await {
            if error.is_unreachable() {
                debug!(target_id = %target.id, error = %error, "Target unreachable");
                return Ok(CheckResult::unreachable(error, timings));
            }
            debug!(target_id = %target.id, error = %error, "Phase measurement incomplete");
        }

        let outcome = match http::fetch(&self.client, url.as_str()).await {
            Ok(outcome) => outcome,
            Err(error) => {
                debug!(target_id = %target.id, error = %error, "GET failed");
                return Ok(CheckResult::unreachable(error, timings));
            }
        };
        let response_time_ms = elapsed_ms(started);

        let ssl_expiry_days =
            if endpoint.secure { self.ssl_expiry_days(&endpoint).await } else { 0 };

        let verdict = Verdict::evaluate(
            outcome.status_code,
            target.status_range,
            target.keyword(),
            &outcome.body,
            endpoint.secure,
            ssl_expiry_days,
        );

        Ok(CheckResult {
            timestamp: Utc::now(),
            response_time_ms,
            status_code: outcome.status_code,
            timings,
            transfer_rate_kbps: outcome.transfer_rate_kbps,
            ssl_expiry_days,
            is_healthy: verdict.is_healthy(),
            error_message: verdict.error_message(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = ProbeConfig::default()
            .with_socket_timeout(Duration::from_secs(2))
            .with_request_timeout(Duration::from_secs(5))
            .with_max_redirects(1)
            .with_user_agent("upwatch-unit")
            .with_accept_invalid_certs(true);

        assert_eq!(config.socket_timeout, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_redirects, 1);
        assert_eq!(config.user_agent, "upwatch-unit");
        assert!(config.accept_invalid_certs);
        assert!(!ProbeConfig::default().accept_invalid_certs);
    }

    #[tokio::test]
    async fn test_invalid_url_is_an_error() {
        let probe = PerformanceProbe::new(ProbeConfig::default()).unwrap();
        let target = Target::new("not a url");
        assert!(matches!(probe.check(&target).await, Err(ProbeError::InvalidUrl(_))));
    }
}
