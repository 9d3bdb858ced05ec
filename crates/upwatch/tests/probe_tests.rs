//! Performance probe against local HTTP and HTTPS responders

mod common;

use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, Utc};
use common::{
    TestCertificate, http_response, sample_at, spawn_http_server, spawn_https_server,
    spawn_stalled_server,
};
use tokio::net::TcpListener;
use upwatch::probe::days_until;
use upwatch::sla::{Classification, classify};
use upwatch::{PerformanceProbe, Probe, ProbeConfig, Target};

fn probe() -> PerformanceProbe {
    PerformanceProbe::new(ProbeConfig::default().with_user_agent("upwatch-tests")).unwrap()
}

fn accepting_any_certificate() -> PerformanceProbe {
    let config = ProbeConfig::default().with_user_agent("upwatch-tests").with_accept_invalid_certs(true);
    PerformanceProbe::new(config).unwrap()
}

#[tokio::test]
async fn test_healthy_plain_http() {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = spawn_http_server(|_| http_response("200 OK", "hello from upwatch")).await;
    let target = Target::new(format!("http://{addr}/")).with_keyword("upwatch");

    let result = probe().check(&target).await.unwrap();

    assert!(result.is_healthy, "unexpected failure: {}", result.error_message);
    assert_eq!(result.status_code, 200);
    assert_eq!(result.error_message, "");
    assert_eq!(result.ssl_expiry_days, 0);
    assert_eq!(result.timings.tls_handshake_ms, 0, "plain HTTP has no handshake");
    assert!(result.timings.connect_ms > 0);
    assert!(result.timings.time_to_first_byte_ms > 0);
    assert!(result.transfer_rate_kbps >= 0.0);
}

#[tokio::test]
async fn test_missing_keyword() {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = spawn_http_server(|_| http_response("200 OK", "nothing to see")).await;
    let target = Target::new(format!("http://{addr}/")).with_keyword("upwatch");

    let result = probe().check(&target).await.unwrap();

    assert!(!result.is_healthy);
    assert_eq!(result.status_code, 200);
    assert_eq!(result.error_message, "Keyword not found");
}

#[tokio::test]
async fn test_status_outside_range() {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = spawn_http_server(|_| http_response("503 Service Unavailable", "down")).await;
    let target = Target::new(format!("http://{addr}/status"));

    let result = probe().check(&target).await.unwrap();

    assert!(!result.is_healthy);
    assert_eq!(result.status_code, 503);
    assert_eq!(result.error_message, "Status code not in accepted range");
    assert!(result.is_server_error());
}

#[tokio::test]
async fn test_custom_status_range() {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = spawn_http_server(|_| http_response("404 Not Found", "gone")).await;
    let target = Target::new(format!("http://{addr}/")).with_status_range(400, 404);

    let result = probe().check(&target).await.unwrap();
    assert!(result.is_healthy);
}

#[tokio::test]
async fn test_redirects_are_followed() {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = spawn_http_server(|path| match path {
        "/old" => "HTTP/1.1 301 Moved Permanently\r\nLocation: /new\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string(),
        _ => http_response("200 OK", "moved here"),
    })
    .await;
    let target = Target::new(format!("http://{addr}/old")).with_keyword("moved here");

    let result = probe().check(&target).await.unwrap();

    assert_eq!(result.status_code, 200);
    assert!(result.is_healthy);
}

#[tokio::test]
async fn test_refused_connection_is_unreachable() {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let target = Target::new(format!("http://{addr}/"));
    let result = probe().check(&target).await.unwrap();

    assert!(!result.is_healthy);
    assert_eq!(result.status_code, 0);
    assert_eq!(result.timings.connect_ms, 0);
    assert_eq!(result.timings.time_to_first_byte_ms, 0);
    assert_eq!(result.timings.download_ms, 0);
    assert!(result.error_message.contains("TCP connect"), "{}", result.error_message);
    assert_eq!(result.response_time_ms, 0);
    assert!(result.is_connection_blip());
}

#[tokio::test]
async fn test_transient_reset_between_healthy_checks_is_a_blip() {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let refused = probe().check(&Target::new(format!("http://{addr}/"))).await.unwrap();
    let at = refused.timestamp;

    // Nearby 404s would make the failure dense if the reset looked like a real response
    let samples = vec![
        sample_at(at, Duration::minutes(-3), 404, 90),
        sample_at(at, Duration::minutes(-2), 200, 100),
        sample_at(at, Duration::minutes(-1), 200, 100),
        refused,
        sample_at(at, Duration::minutes(1), 200, 100),
        sample_at(at, Duration::minutes(2), 200, 100),
        sample_at(at, Duration::minutes(3), 404, 90),
    ];

    let class = classify(&samples, 3, 60);
    assert_eq!(class, Classification::IsolatedBlip);
    assert!(!class.is_real());
}

#[tokio::test]
async fn test_unresolvable_host() {
    let _ = tracing_subscriber::fmt::try_init();

    let target = Target::new("http://upwatch-does-not-exist.invalid/");
    let result = probe().check(&target).await.unwrap();

    assert!(!result.is_healthy);
    assert_eq!(result.status_code, 0);
    assert_eq!(result.timings.dns_ms, 0);
    assert!(result.error_message.contains("DNS lookup"), "{}", result.error_message);
}

#[tokio::test]
async fn test_https_handshake_and_certificate_expiry() {
    let _ = tracing_subscriber::fmt::try_init();

    let not_after = (Utc::now() + Duration::days(30)).date_naive();
    let certificate = TestCertificate::expiring_on(not_after);
    let addr = spawn_https_server(certificate, |_| http_response("200 OK", "secure hello")).await;
    let target = Target::new(format!("https://{addr}/")).with_keyword("secure");

    let result = accepting_any_certificate().check(&target).await.unwrap();

    assert!(result.is_healthy, "unexpected failure: {}", result.error_message);
    assert_eq!(result.status_code, 200);
    assert!(result.timings.connect_ms > 0);
    assert!(result.timings.tls_handshake_ms > 0);
    assert!(result.timings.time_to_first_byte_ms > 0);

    let expected = days_until(not_after.and_hms_opt(0, 0, 0).unwrap().and_utc(), Utc::now());
    assert!(
        (expected..=expected + 1).contains(&result.ssl_expiry_days),
        "expected about {expected} days, got {}",
        result.ssl_expiry_days
    );
}

#[tokio::test]
async fn test_expired_certificate_is_unhealthy() {
    let _ = tracing_subscriber::fmt::try_init();

    let not_after = (Utc::now() - Duration::days(10)).date_naive();
    let certificate = TestCertificate::expiring_on(not_after);
    let addr = spawn_https_server(certificate, |_| http_response("200 OK", "stale")).await;
    let target = Target::new(format!("https://{addr}/"));

    let result = accepting_any_certificate().check(&target).await.unwrap();

    assert_eq!(result.status_code, 200);
    assert_eq!(result.ssl_expiry_days, 0);
    assert!(result.timings.tls_handshake_ms > 0);
    assert!(!result.is_healthy);
    assert_eq!(result.error_message, "SSL certificate expired or invalid");
}

#[tokio::test]
async fn test_self_signed_certificate_rejected_by_default() {
    let _ = tracing_subscriber::fmt::try_init();

    let not_after = (Utc::now() + Duration::days(30)).date_naive();
    let addr = spawn_https_server(TestCertificate::expiring_on(not_after), |_| {
        http_response("200 OK", "hello")
    })
    .await;

    let result = probe().check(&Target::new(format!("https://{addr}/"))).await.unwrap();

    // Phases are still timed, the GET refuses the certificate
    assert!(!result.is_healthy);
    assert_eq!(result.status_code, 0);
    assert!(result.timings.tls_handshake_ms > 0);
}

#[tokio::test]
async fn test_stalled_peer_bounded_by_timeouts() {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = spawn_stalled_server().await;
    let config = ProbeConfig::default()
        .with_socket_timeout(StdDuration::from_millis(200))
        .with_request_timeout(StdDuration::from_millis(500));
    let probe = PerformanceProbe::new(config).unwrap();

    let started = Instant::now();
    let result = probe.check(&Target::new(format!("http://{addr}/"))).await.unwrap();

    assert!(started.elapsed() < StdDuration::from_secs(3), "took {:?}", started.elapsed());
    assert!(!result.is_healthy);
    assert_eq!(result.status_code, 0);
    assert!(result.timings.connect_ms > 0);
    assert_eq!(result.timings.time_to_first_byte_ms, 0);
    assert!(result.is_connection_blip());
}
