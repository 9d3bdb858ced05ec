//! Outage and SLA engine.
//!
//! Works on a window of raw check results and is independent of the live
//! scheduler state. Unhealthy samples are classified by [`jitter`]; uptime
//! counts jitter as healthy while downtime is measured on the raw series.

pub mod downtime;
pub mod events;
pub mod jitter;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::check::CheckResult;
use crate::target::Target;

pub use self::downtime::{OutagePeriod, format_downtime, total_downtime, unhealthy_runs};
pub use self::events::{EventKind, HealthEvent, health_events};
pub use self::jitter::{Classification, classify};

/// Samples required before uptime is reported
pub const MINIMUM_SAMPLE_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    Available,
    /// Monitoring is paused; no figure is meaningful
    Paused,
    /// Fewer than [`MINIMUM_SAMPLE_SIZE`] samples in the active window
    InsufficientData,
}

/// Availability figures for one target over one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaReport {
    pub status: SlaStatus,
    /// Samples in the active window
    pub sample_count: usize,
    pub minimum_required: usize,
    /// Samples dropped because they predate the latest resume
    pub excluded_sample_count: usize,
    pub avg_response_time_ms: u64,
    pub min_response_time_ms: u64,
    pub max_response_time_ms: u64,
    /// Filtered uptime with two decimals, `None` unless available
    pub uptime_percent: Option<f64>,
    /// Healthy samples after jitter filtering
    pub successful_checks: usize,
    /// Raw unhealthy samples
    pub failure_count: usize,
    /// Unhealthy samples classified as real outages
    pub real_outage_count: usize,
    #[serde(serialize_with = "serialize_seconds")]
    pub downtime: Duration,
    /// Unhealthy runs holding at least one real outage sample
    pub outages: Vec<OutagePeriod>,
}

impl SlaReport {
    fn empty(status: SlaStatus, sample_count: usize, excluded_sample_count: usize) -> Self {
        Self {
            status,
            sample_count,
            minimum_required: MINIMUM_SAMPLE_SIZE,
            excluded_sample_count,
            avg_response_time_ms: 0,
            min_response_time_ms: 0,
            max_response_time_ms: 0,
            uptime_percent: None,
            successful_checks: 0,
            failure_count: 0,
            real_outage_count: 0,
            downtime: Duration::zero(),
            outages: Vec::new(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.status == SlaStatus::Paused
    }

    /// Still collecting enough samples for a trustworthy figure
    pub fn is_calculating(&self) -> bool {
        self.status == SlaStatus::InsufficientData
    }

    pub fn downtime_display(&self) -> String {
        match self.status {
            SlaStatus::Available => format_downtime(self.downtime),
            SlaStatus::Paused => "paused".to_string(),
            SlaStatus::InsufficientData => "insufficient data".to_string(),
        }
    }
}

fn serialize_seconds<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(duration.num_seconds())
}

/// Samples that count for the target's SLA: everything when it was never
/// paused, otherwise only those at or after the latest resume.
pub fn active_window<'a>(target: &Target, samples: &'a [CheckResult]) -> Vec<&'a CheckResult> {
    match target.active_since() {
        Some(since) => samples.iter().filter(|s| s.timestamp >= since).collect(),
        None => samples.iter().collect(),
    }
}

/// Compute the SLA report for `target` over `samples`.
pub fn evaluate(target: &Target, samples: &[CheckResult], now: DateTime<Utc>) -> SlaReport {
    if !target.enabled {
        return SlaReport::empty(SlaStatus::Paused, 0, 0);
    }

    let mut active: Vec<CheckResult> = active_window(target, samples).into_iter().cloned().collect();
    let excluded = samples.len() - active.len();
    if active.len() < MINIMUM_SAMPLE_SIZE {
        return SlaReport::empty(SlaStatus::InsufficientData, active.len(), excluded);
    }
    active.sort_by_key(|s| s.timestamp);

    let interval_seconds = target.interval_seconds.max(1);
    let classes: Vec<Classification> =
        (0..active.len()).map(|i| classify(&active, i, interval_seconds)).collect();

    let failure_count = active.iter().filter(|s| !s.is_healthy).count();
    let real_outage_count = classes
        .iter()
        .zip(&active)
        .filter(|(class, sample)| !sample.is_healthy && class.is_real())
        .count();
    let successful_checks = active.len() - real_outage_count;

    let response_times: Vec<u64> =
        active.iter().map(|s| s.response_time_ms).filter(|&rt| rt > 0).collect();
    let (avg, min, max) = if response_times.is_empty() {
        (0, 0, 0)
    } else {
        let sum: u64 = response_times.iter().sum();
        (
            (sum as f64 / response_times.len() as f64).round() as u64,
            response_times.iter().copied().min().unwrap_or(0),
            response_times.iter().copied().max().unwrap_or(0),
        )
    };

    let outages = unhealthy_runs(&active)
        .into_iter()
        .filter(|run| classes[run.clone()].iter().any(|c| c.is_real()))
        .map(|run| downtime::period_of(&active, &run, now))
        .collect();

    let uptime = successful_checks as f64 / active.len() as f64 * 100.0;

    SlaReport {
        status: SlaStatus::Available,
        sample_count: active.len(),
        minimum_required: MINIMUM_SAMPLE_SIZE,
        excluded_sample_count: excluded,
        avg_response_time_ms: avg,
        min_response_time_ms: min,
        max_response_time_ms: max,
        uptime_percent: Some((uptime * 100.0).round() / 100.0),
        successful_checks,
        failure_count,
        real_outage_count,
        downtime: total_downtime(&active, now),
        outages,
    }
}
