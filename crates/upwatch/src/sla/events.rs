//! Health flips between consecutive raw samples, for reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alert::Severity;
use crate::check::CheckResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Outage,
    Recovery,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthEvent {
    pub time: DateTime<Utc>,
    pub kind: EventKind,
    pub severity: Severity,
    pub description: String,
    pub status_code: u16,
    pub response_time_ms: u64,
}

impl HealthEvent {
    fn from_flip(sample: &CheckResult) -> Self {
        let (kind, severity, description) = if sample.is_healthy {
            (
                EventKind::Recovery,
                Severity::Info,
                format!("Service recovered, response time {}ms", sample.response_time_ms),
            )
        } else {
            (
                EventKind::Outage,
                Severity::Error,
                format!(
                    "Service failure, status code {}, response time {}ms",
                    sample.status_code, sample.response_time_ms
                ),
            )
        };

        Self {
            time: sample.timestamp,
            kind,
            severity,
            description,
            status_code: sample.status_code,
            response_time_ms: sample.response_time_ms,
        }
    }
}

/// One event per change of health between neighbouring samples, newest first.
/// The first sample never produces an event.
pub fn health_events(samples: &[CheckResult]) -> Vec<HealthEvent> {
    let mut ordered: Vec<&CheckResult> = samples.iter().collect();
    ordered.sort_by_key(|s| s.timestamp);

    let mut events: Vec<HealthEvent> = ordered
        .windows(2)
        .filter(|pair| pair[0].is_healthy != pair[1].is_healthy)
        .map(|pair| HealthEvent::from_flip(pair[1]))
        .collect();
    events.reverse();
    events
}
