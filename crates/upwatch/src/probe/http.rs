//! The redirect-following GET that supplies status code, body and transfer
//! rate.

use std::time::{Duration, Instant};

use reqwest::redirect::Policy;

use super::ProbeConfig;
use crate::error::ProbeError;

#[derive(Debug, Clone)]
pub(crate) struct GetOutcome {
    pub status_code: u16,
    pub body: String,
    pub transfer_rate_kbps: f64,
}

pub(crate) fn client(config: &ProbeConfig) -> Result<reqwest::Client, ProbeError> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.socket_timeout)
        .redirect(Policy::limited(config.max_redirects))
        .user_agent(config.user_agent.clone())
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()?;

    Ok(client)
}

/// Issue the GET. Every status code is accepted.
pub(crate) async fn fetch(client: &reqwest::Client, url: &str) -> Result<GetOutcome, ProbeError> {
    let started = Instant::now();
    let response = client.get(url).send().await?;
    let status_code = response.status().as_u16();
    let content_length = response.content_length();
    let body = response.text().await?;

    let bytes = content_length.unwrap_or(body.len() as u64);
    Ok(GetOutcome {
        status_code,
        body,
        transfer_rate_kbps: transfer_rate_kbps(bytes, started.elapsed()),
    })
}

/// Kilobits per second, rounded to two decimals
pub fn transfer_rate_kbps(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if bytes == 0 || seconds <= 0.0 {
        return 0.0;
    }
    let kbps = bytes as f64 * 8.0 / seconds / 1024.0;
    (kbps * 100.0).round() / 100.0
}
