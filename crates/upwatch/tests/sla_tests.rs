//! SLA engine over series read back from the metrics store

mod common;

use chrono::{Duration, Utc};
use common::sample_at;
use upwatch::sla::{self, EventKind, SlaStatus, format_downtime, health_events};
use upwatch::store::aggregate;
use upwatch::{InMemoryMetricsStore, MetricsStore, Target, TimeRange};

#[tokio::test]
async fn test_report_from_store() {
    let _ = tracing_subscriber::fmt::try_init();

    let store = InMemoryMetricsStore::new();
    let target = Target::new("https://example.com");
    let base = Utc::now() - Duration::minutes(30);

    for minute in 0..20 {
        let (status, rt) = match minute {
            6..=9 => (503, 800),
            14 => (0, 0),
            _ => (200, 150),
        };
        let sample = sample_at(base, Duration::minutes(minute), status, rt);
        store.write(target.id, &target.url, &sample).await.unwrap();
    }

    let window = store.query_window(target.id, TimeRange::Hours24).await.unwrap();
    let report = sla::evaluate(&target, &window, Utc::now());

    assert_eq!(report.status, SlaStatus::Available);
    assert_eq!(report.sample_count, 20);
    assert_eq!(report.failure_count, 5);
    assert_eq!(report.real_outage_count, 4);
    assert_eq!(report.uptime_percent, Some(80.0));
    // Four minutes of 503 plus the one minute blip on the raw series
    assert_eq!(format_downtime(report.downtime), "5m");
    assert_eq!(report.outages.len(), 1);
    assert_eq!(report.outages[0].duration, Duration::minutes(4));
    assert_eq!(report.min_response_time_ms, 150);
    assert_eq!(report.max_response_time_ms, 800);

    let events = health_events(&window);
    assert_eq!(events.len(), 4);
    assert_eq!(events[0].kind, EventKind::Recovery);
    assert_eq!(events[3].kind, EventKind::Outage);
    assert_eq!(events[3].time, window[6].timestamp);
}

#[tokio::test]
async fn test_bucketed_series_is_presentation_only() {
    let _ = tracing_subscriber::fmt::try_init();

    let store = InMemoryMetricsStore::new();
    let target = Target::new("https://example.com");
    let base = Utc::now() - Duration::hours(20);

    for i in 0..60 {
        let status = if i == 30 { 500 } else { 200 };
        let sample = sample_at(base, Duration::minutes(i * 15), status, 100 + i as u64);
        store.write(target.id, &target.url, &sample).await.unwrap();
    }

    let raw = store.query_window(target.id, TimeRange::Hours24).await.unwrap();
    let bucketed = store.query_bucketed(target.id, TimeRange::Hours24).await.unwrap();

    assert_eq!(raw.len(), 60);
    assert_eq!(bucketed.len(), 4);
    assert_eq!(bucketed.iter().filter(|b| !b.is_healthy).count(), 1);
    assert_eq!(aggregate(&raw, TimeRange::Hours24.bucket_size()), bucketed);
}

#[test]
fn test_report_serializes_for_reporting() {
    let base = Utc::now() - Duration::hours(2);
    let samples: Vec<_> = (0..15)
        .map(|minute| {
            let status = if (3..5).contains(&minute) { 502 } else { 200 };
            sample_at(base, Duration::minutes(minute), status, 90)
        })
        .collect();

    let report = sla::evaluate(&Target::new("https://example.com"), &samples, Utc::now());
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["status"], "available");
    assert_eq!(json["downtime"], 120);
    assert_eq!(json["outages"][0]["duration"], 120);
    assert_eq!(json["minimum_required"], 12);

    let events = serde_json::to_value(health_events(&samples)).unwrap();
    assert_eq!(events[0]["kind"], "recovery");
    assert_eq!(events[1]["severity"], "error");
}
