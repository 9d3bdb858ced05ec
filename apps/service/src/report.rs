//! Periodic SLA report over every registered target.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};
use upwatch::sla::{self, SlaReport, SlaStatus};
use upwatch::{MetricsStore, Target, TargetRegistry, TimeRange};

#[derive(Clone)]
pub struct SlaReporter {
    registry: Arc<dyn TargetRegistry>,
    store: Arc<dyn MetricsStore>,
    window: TimeRange,
    period: Duration,
}

impl SlaReporter {
    pub fn new(
        registry: Arc<dyn TargetRegistry>,
        store: Arc<dyn MetricsStore>,
        window: TimeRange,
        period: Duration,
    ) -> Self {
        Self { registry, store, window, period }
    }

    /// Evaluate and log the SLA of every target once
    pub async fn report_once(&self) -> Result<Vec<(Target, SlaReport)>> {
        let now = Utc::now();
        let mut reports = Vec::new();

        for target in self.registry.get_all().await? {
            let samples = self.store.query_window(target.id, self.window).await?;
            let report = sla::evaluate(&target, &samples, now);
            log_report(&target, &report, self.window);
            reports.push((target, report));
        }

        Ok(reports)
    }

    /// Start background report task, first run one period from now
    pub fn start_periodic_report(&self) -> tokio::task::JoinHandle<()> {
        let reporter = self.clone();

        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + reporter.period, reporter.period);

            loop {
                interval.tick().await;

                match reporter.report_once().await {
                    Ok(reports) => debug!("SLA report completed for {} targets", reports.len()),
                    Err(e) => warn!("SLA report failed: {}", e),
                }
            }
        })
    }
}

fn log_report(target: &Target, report: &SlaReport, window: TimeRange) {
    match report.status {
        SlaStatus::Available => info!(
            target_id = %target.id,
            name = %target.name,
            window = %window,
            uptime_percent = report.uptime_percent.unwrap_or_default(),
            downtime = %report.downtime_display(),
            samples = report.sample_count,
            failures = report.failure_count,
            real_outages = report.real_outage_count,
            avg_response_time_ms = report.avg_response_time_ms,
            "SLA report"
        ),
        SlaStatus::Paused => info!(target_id = %target.id, name = %target.name, "SLA report: monitoring paused"),
        SlaStatus::InsufficientData => info!(
            target_id = %target.id,
            name = %target.name,
            samples = report.sample_count,
            required = report.minimum_required,
            "SLA report: collecting data"
        ),
    }
}
