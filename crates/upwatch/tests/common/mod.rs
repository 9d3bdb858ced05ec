//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rcgen::{CertificateParams, KeyPair};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;
use upwatch::{CheckResult, PhaseTimings, Probe, ProbeError, Target};

pub fn healthy_result() -> CheckResult {
    CheckResult {
        timestamp: Utc::now(),
        response_time_ms: 120,
        status_code: 200,
        timings: PhaseTimings::default(),
        transfer_rate_kbps: 12.5,
        ssl_expiry_days: 0,
        is_healthy: true,
        error_message: String::new(),
    }
}

pub fn unhealthy_result() -> CheckResult {
    CheckResult {
        status_code: 503,
        is_healthy: false,
        error_message: "Status code not in accepted range".to_string(),
        ..healthy_result()
    }
}

/// Sample at a fixed offset from `base`
pub fn sample_at(base: DateTime<Utc>, offset: Duration, status_code: u16, response_time_ms: u64) -> CheckResult {
    let is_healthy = (200..300).contains(&status_code);
    CheckResult {
        timestamp: base + offset,
        response_time_ms,
        status_code,
        timings: PhaseTimings::default(),
        transfer_rate_kbps: 0.0,
        ssl_expiry_days: 0,
        is_healthy,
        error_message: if is_healthy { String::new() } else { "Status code not in accepted range".to_string() },
    }
}

/// Probe replaying a fixed sequence of outcomes, healthy once exhausted.
/// With a gate, every check waits for a permit before answering.
#[derive(Default)]
pub struct ScriptedProbe {
    script: Mutex<VecDeque<Result<bool, String>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedProbe {
    pub fn new(outcomes: impl IntoIterator<Item = bool>) -> Self {
        Self { script: Mutex::new(outcomes.into_iter().map(Ok).collect()), ..Default::default() }
    }

    pub fn failing_with(message: &str) -> Self {
        Self { script: Mutex::new(VecDeque::from([Err(message.to_string())])), ..Default::default() }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self { gate: Some(gate), ..Default::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn check(&self, _target: &Target) -> Result<CheckResult, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|e| ProbeError::Aborted(e.to_string()))?;
            permit.forget();
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(true)) | None => Ok(healthy_result()),
            Some(Ok(false)) => Ok(unhealthy_result()),
            Some(Err(message)) => Err(ProbeError::Tls(message)),
        }
    }
}

/// Minimal HTTP/1.1 server answering every request through `respond(path)`
pub async fn spawn_http_server<F>(respond: F) -> SocketAddr
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else { break };
            tokio::spawn(serve(socket, respond.clone()));
        }
    });

    addr
}

/// Same as [`spawn_http_server`] behind TLS with the given certificate
pub async fn spawn_https_server<F>(certificate: TestCertificate, respond: F) -> SocketAddr
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![certificate.der], certificate.key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else { break };
            let acceptor = acceptor.clone();
            let respond = respond.clone();
            tokio::spawn(async move {
                if let Ok(stream) = acceptor.accept(socket).await {
                    serve(stream, respond).await;
                }
            });
        }
    });

    addr
}

/// Listener that accepts connections and never answers
pub async fn spawn_stalled_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

async fn serve<S, F>(mut socket: S, respond: Arc<F>)
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(&str) -> String,
{
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&request);
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let _ = socket.write_all(respond(&path).as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Self-signed certificate for 127.0.0.1 and its private key
pub struct TestCertificate {
    pub der: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
}

impl TestCertificate {
    /// Certificate valid from a year ago until `not_after` (midnight UTC of that day)
    pub fn expiring_on(not_after: NaiveDate) -> Self {
        let not_before = not_after - Duration::days(365);
        let mut params = CertificateParams::new(vec!["127.0.0.1".to_string()]).unwrap();
        params.not_before = rcgen::date_time_ymd(not_before.year(), not_before.month() as u8, not_before.day() as u8);
        params.not_after = rcgen::date_time_ymd(not_after.year(), not_after.month() as u8, not_after.day() as u8);

        let key_pair = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        Self {
            der: cert.der().clone(),
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        }
    }
}

pub fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}
