//! Time-series storage of check results.
//!
//! [`MetricsStore::query_window`] always returns the raw, finest-grained
//! series; [`aggregate`] reduces it to a presentation-sized series and must
//! not be fed into the SLA engine.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::check::{CheckResult, PhaseTimings};
use crate::range::TimeRange;
use crate::target::TargetId;

#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Append one check result
    async fn write(&self, target_id: TargetId, url: &str, result: &CheckResult) -> Result<()>;

    /// Raw results inside the window, ascending by time
    async fn query_window(&self, target_id: TargetId, range: TimeRange) -> Result<Vec<CheckResult>>;

    /// Results inside the window bucketed for charts
    async fn query_bucketed(
        &self,
        target_id: TargetId,
        range: TimeRange,
    ) -> Result<Vec<CheckResult>> {
        let raw = self.query_window(target_id, range).await?;
        Ok(aggregate(&raw, range.bucket_size()))
    }

    /// Most recent result within the last hour
    async fn latest(&self, target_id: TargetId) -> Result<Option<CheckResult>> {
        Ok(self.query_window(target_id, TimeRange::Hour1).await?.pop())
    }
}

#[derive(Debug, Clone)]
struct StoredSeries {
    url: String,
    results: Vec<CheckResult>,
}

/// Store kept in process memory. Results older than the retention period
/// are dropped on write.
#[derive(Debug)]
pub struct InMemoryMetricsStore {
    series: RwLock<HashMap<TargetId, StoredSeries>>,
    retention: Duration,
}

impl Default for InMemoryMetricsStore {
    fn default() -> Self {
        Self::with_retention(TimeRange::Days90.duration())
    }
}

impl InMemoryMetricsStore {
    /// Store retaining the longest queryable window
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self { series: RwLock::default(), retention }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// URL last written for a target
    pub async fn url_of(&self, target_id: TargetId) -> Option<String> {
        self.series.read().await.get(&target_id).map(|series| series.url.clone())
    }

    /// Number of results held for a target
    pub async fn len(&self, target_id: TargetId) -> usize {
        self.series.read().await.get(&target_id).map_or(0, |series| series.results.len())
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn write(&self, target_id: TargetId, url: &str, result: &CheckResult) -> Result<()> {
        let mut series = self.series.write().await;
        let entry = series
            .entry(target_id)
            .or_insert_with(|| StoredSeries { url: url.to_string(), results: Vec::new() });
        entry.url = url.to_string();

        let out_of_order =
            entry.results.last().is_some_and(|last| last.timestamp > result.timestamp);
        entry.results.push(result.clone());
        if out_of_order {
            entry.results.sort_by_key(|r| r.timestamp);
        }

        let cutoff = Utc::now() - self.retention;
        let expired = entry.results.partition_point(|r| r.timestamp < cutoff);
        entry.results.drain(..expired);
        Ok(())
    }

    async fn query_window(&self, target_id: TargetId, range: TimeRange) -> Result<Vec<CheckResult>> {
        let since = Utc::now() - range.duration();
        let series = self.series.read().await;
        Ok(series
            .get(&target_id)
            .map(|series| {
                series.results.iter().filter(|r| r.timestamp >= since).cloned().collect()
            })
            .unwrap_or_default())
    }
}

/// Average fixed-size chunks of a series.
///
/// Numeric fields are averaged and rounded, a bucket is healthy only when
/// every member is, the bucket time is the first member's time and the error
/// message is the last non-empty one.
pub fn aggregate(results: &[CheckResult], bucket_size: usize) -> Vec<CheckResult> {
    if bucket_size <= 1 {
        return results.to_vec();
    }

    results.chunks(bucket_size).map(average_bucket).collect()
}

fn average_bucket(chunk: &[CheckResult]) -> CheckResult {
    let len = chunk.len() as f64;
    let avg = |f: &dyn Fn(&CheckResult) -> f64| (chunk.iter().map(f).sum::<f64>() / len).round();

    CheckResult {
        timestamp: chunk[0].timestamp,
        response_time_ms: avg(&|r| r.response_time_ms as f64) as u64,
        status_code: avg(&|r| f64::from(r.status_code)) as u16,
        timings: PhaseTimings {
            dns_ms: avg(&|r| r.timings.dns_ms as f64) as u64,
            connect_ms: avg(&|r| r.timings.connect_ms as f64) as u64,
            tls_handshake_ms: avg(&|r| r.timings.tls_handshake_ms as f64) as u64,
            time_to_first_byte_ms: avg(&|r| r.timings.time_to_first_byte_ms as f64) as u64,
            download_ms: avg(&|r| r.timings.download_ms as f64) as u64,
        },
        transfer_rate_kbps: avg(&|r| r.transfer_rate_kbps),
        ssl_expiry_days: avg(&|r| r.ssl_expiry_days as f64) as i64,
        is_healthy: chunk.iter().all(|r| r.is_healthy),
        error_message: chunk
            .iter()
            .rev()
            .find(|r| !r.error_message.is_empty())
            .map(|r| r.error_message.clone())
            .unwrap_or_default(),
    }
}
