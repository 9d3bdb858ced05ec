//! Downtime accounting over the raw, unfiltered series.

use std::ops::Range;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::check::CheckResult;

/// A contiguous stretch of downtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutagePeriod {
    pub start: DateTime<Utc>,
    /// Time of the healthy sample that closed the run, `None` while ongoing
    pub end: Option<DateTime<Utc>>,
    #[serde(with = "duration_seconds")]
    pub duration: Duration,
}

impl OutagePeriod {
    pub fn is_ongoing(&self) -> bool {
        self.end.is_none()
    }
}

/// Index ranges of consecutive unhealthy samples
pub fn unhealthy_runs(samples: &[CheckResult]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = None;

    for (index, sample) in samples.iter().enumerate() {
        match (sample.is_healthy, start) {
            (false, None) => start = Some(index),
            (true, Some(begin)) => {
                runs.push(begin..index);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(begin) = start {
        runs.push(begin..samples.len());
    }

    runs
}

/// Wall-clock extent of one run. A closed run ends at the healthy sample
/// after it; an open run ends at the earlier of `now` and the last sample.
pub fn period_of(samples: &[CheckResult], run: &Range<usize>, now: DateTime<Utc>) -> OutagePeriod {
    let start = samples[run.start].timestamp;
    let (end, until) = match samples.get(run.end) {
        Some(closing) => (Some(closing.timestamp), closing.timestamp),
        None => {
            let last = samples[run.end - 1].timestamp;
            (None, last.min(now))
        }
    };

    OutagePeriod { start, end, duration: (until - start).max(Duration::zero()) }
}

/// Total wall-clock time spent in unhealthy runs
pub fn total_downtime(samples: &[CheckResult], now: DateTime<Utc>) -> Duration {
    unhealthy_runs(samples)
        .iter()
        .map(|run| period_of(samples, run, now).duration)
        .fold(Duration::zero(), |total, d| total + d)
}

/// Compact human form: `45m`, `2h`, `2h5m`, `3d`, `3d4h`
pub fn format_downtime(duration: Duration) -> String {
    let minutes = duration.num_minutes().max(0);

    if minutes < 60 {
        format!("{minutes}m")
    } else if minutes < 24 * 60 {
        let (hours, rest) = (minutes / 60, minutes % 60);
        if rest > 0 { format!("{hours}h{rest}m") } else { format!("{hours}h") }
    } else {
        let (days, hours) = (minutes / (24 * 60), (minutes % (24 * 60)) / 60);
        if hours > 0 { format!("{days}d{hours}h") } else { format!("{days}d") }
    }
}

mod duration_seconds {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_seconds())
    }
}
