//! Classification of unhealthy samples into real outages and network jitter.
//!
//! Rules are tried in order and the first that matches decides. A sample no
//! rule marks as real is jitter: it counts as healthy for uptime purposes
//! while the raw record stays untouched.

use chrono::Duration;

use crate::check::CheckResult;

/// Response time above which a failure is always real
pub const SEVERE_RESPONSE_TIME_MS: u64 = 30_000;

/// Span scanned on each side of a failure when counting a consecutive run
pub const CONSECUTIVE_SCAN_SECONDS: u64 = 300;

/// Minimum neighbours scanned on each side, whatever the interval
pub const MIN_CONSECUTIVE_SCAN: usize = 2;

/// Run length that confirms an outage for targets polled at most every minute
pub const FAST_POLL_RUN_THRESHOLD: usize = 3;

/// Run length that confirms an outage for slower targets
pub const SLOW_POLL_RUN_THRESHOLD: usize = 2;

/// Intervals up to this many seconds use [`FAST_POLL_RUN_THRESHOLD`]
pub const FAST_POLL_MAX_INTERVAL_SECONDS: u64 = 60;

/// Half-width of the density window around a failure
pub const DENSITY_WINDOW_SECONDS: u64 = 15 * 60;

/// Share of the expected samples in the density window that must fail
pub const DENSITY_FAILURE_RATE: f64 = 0.15;

/// Failures in the density window never need to exceed this floor
pub const MIN_DENSITY_FAILURES: usize = 2;

/// Which rule decided the fate of an unhealthy sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Very slow response or a 5xx status
    Severe,
    /// No status and no response time, with healthy samples on both sides
    IsolatedBlip,
    /// Part of a long enough run of consecutive failures
    ConsecutiveRun,
    /// Enough failures clustered around it in time
    DenseFailures,
    /// Nothing marked it as real
    Jitter,
}

impl Classification {
    pub fn is_real(self) -> bool {
        matches!(
            self,
            Classification::Severe | Classification::ConsecutiveRun | Classification::DenseFailures
        )
    }
}

/// Neighbours scanned on each side: `max(2, ceil(300 / interval))`
pub fn consecutive_scan_limit(interval_seconds: u64) -> usize {
    let interval = interval_seconds.max(1);
    (CONSECUTIVE_SCAN_SECONDS.div_ceil(interval) as usize).max(MIN_CONSECUTIVE_SCAN)
}

pub fn consecutive_threshold(interval_seconds: u64) -> usize {
    if interval_seconds <= FAST_POLL_MAX_INTERVAL_SECONDS {
        FAST_POLL_RUN_THRESHOLD
    } else {
        SLOW_POLL_RUN_THRESHOLD
    }
}

/// Failures required inside the density window:
/// `max(2, ceil(ceil(900 / interval) * 0.15))`
pub fn density_threshold(interval_seconds: u64) -> usize {
    let interval = interval_seconds.max(1);
    let expected = DENSITY_WINDOW_SECONDS.div_ceil(interval) as f64;
    ((expected * DENSITY_FAILURE_RATE).ceil() as usize).max(MIN_DENSITY_FAILURES)
}

/// Classify the sample at `index`. `samples` must be sorted by timestamp.
/// Healthy samples are reported as [`Classification::Jitter`].
pub fn classify(samples: &[CheckResult], index: usize, interval_seconds: u64) -> Classification {
    let current = &samples[index];
    if current.is_healthy {
        return Classification::Jitter;
    }

    if current.response_time_ms > SEVERE_RESPONSE_TIME_MS || current.is_server_error() {
        return Classification::Severe;
    }

    if current.is_connection_blip() {
        let prev_healthy = index.checked_sub(1).and_then(|i| samples.get(i)).is_some_and(|s| s.is_healthy);
        let next_healthy = samples.get(index + 1).is_some_and(|s| s.is_healthy);
        if prev_healthy && next_healthy {
            return Classification::IsolatedBlip;
        }
    }

    if run_length(samples, index, consecutive_scan_limit(interval_seconds))
        >= consecutive_threshold(interval_seconds)
    {
        return Classification::ConsecutiveRun;
    }

    if failures_near(samples, index) >= density_threshold(interval_seconds) {
        return Classification::DenseFailures;
    }

    Classification::Jitter
}

/// Length of the unhealthy run through `index`, at most `limit` neighbours
/// counted on each side
fn run_length(samples: &[CheckResult], index: usize, limit: usize) -> usize {
    let before = samples[..index].iter().rev().take(limit).take_while(|s| !s.is_healthy).count();
    let after = samples[index + 1..].iter().take(limit).take_while(|s| !s.is_healthy).count();
    1 + before + after
}

/// Unhealthy samples within the density window centred on `index`
fn failures_near(samples: &[CheckResult], index: usize) -> usize {
    let half_width = Duration::seconds(DENSITY_WINDOW_SECONDS as i64);
    let center = samples[index].timestamp;
    let (start, end) = (center - half_width, center + half_width);

    samples
        .iter()
        .filter(|s| !s.is_healthy && s.timestamp >= start && s.timestamp <= end)
        .count()
}
