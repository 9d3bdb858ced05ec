//! Protocol-level phase measurement over a raw socket.
//!
//! One measurement walks resolve, connect, handshake, first byte and end of
//! stream in order. Each step is bounded by the socket timeout and records its
//! latency into [`PhaseTimings`] as soon as it completes, so a caller that
//! gives up early still sees the phases that were reached.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::Url;

use super::tls;
use crate::check::PhaseTimings;
use crate::error::ProbeError;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Named steps of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolve,
    Connect,
    Handshake,
    FirstByte,
    Download,
}

impl Phase {
    /// Phases whose failure means the endpoint was never reached
    pub fn is_connection_setup(self) -> bool {
        matches!(self, Phase::Resolve | Phase::Connect | Phase::Handshake)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Resolve => "DNS lookup",
            Phase::Connect => "TCP connect",
            Phase::Handshake => "TLS handshake",
            Phase::FirstByte => "First byte",
            Phase::Download => "Download",
        };
        f.write_str(name)
    }
}

/// Where to open the measurement socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    /// Host without IPv6 brackets, used for lookup and SNI
    pub host: String,
    /// Host header value
    pub authority: String,
    pub port: u16,
    pub secure: bool,
    pub path: String,
}

impl Endpoint {
    pub fn from_url(url: &Url) -> Result<Self, ProbeError> {
        let host_str = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ProbeError::InvalidUrl(format!("{url} has no host")))?;
        let secure = match url.scheme() {
            "https" => true,
            "http" => false,
            other => return Err(ProbeError::InvalidUrl(format!("unsupported scheme {other}"))),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::InvalidUrl(format!("{url} has no port")))?;

        let authority = match url.port() {
            Some(port) => format!("{host_str}:{port}"),
            None => host_str.to_string(),
        };
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        Ok(Self {
            host: host_str.trim_start_matches('[').trim_end_matches(']').to_string(),
            authority,
            port,
            secure,
            path,
        })
    }

    fn request(&self, user_agent: &str) -> String {
        format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nConnection: close\r\n\r\n",
            self.path, self.authority, user_agent
        )
    }
}

/// Milliseconds rounded up, so a completed phase never reads as unmeasured
pub(crate) fn elapsed_ms(since: Instant) -> u64 {
    let micros = since.elapsed().as_micros();
    u64::try_from(micros.div_ceil(1000)).unwrap_or(u64::MAX)
}

/// Resolve the endpoint host to its first socket address
pub(crate) async fn resolve(endpoint: &Endpoint, limit: Duration) -> Result<SocketAddr, ProbeError> {
    let lookup = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port));
    let mut addrs = timeout(limit, lookup)
        .await
        .map_err(|_| ProbeError::Timeout { phase: Phase::Resolve, limit })?
        .map_err(|e| ProbeError::Resolve { host: endpoint.host.clone(), reason: e.to_string() })?;

    addrs.next().ok_or_else(|| ProbeError::Resolve {
        host: endpoint.host.clone(),
        reason: "no addresses returned".to_string(),
    })
}

pub(crate) async fn connect(addr: SocketAddr, limit: Duration) -> Result<TcpStream, ProbeError> {
    timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| ProbeError::Timeout { phase: Phase::Connect, limit })?
        .map_err(|source| ProbeError::Connect { addr, source })
}

/// Walk every phase once, filling `timings` as phases complete.
///
/// Setup failures (resolve, connect, handshake) are returned as errors.
/// Failures after the request is written leave the remaining phases at zero
/// and are only logged.
pub(crate) async fn measure(
    endpoint: &Endpoint,
    connector: &TlsConnector,
    user_agent: &str,
    limit: Duration,
    timings: &mut PhaseTimings,
) -> Result<(), ProbeError> {
    let started = Instant::now();
    let addr = resolve(endpoint, limit).await?;
    timings.dns_ms = elapsed_ms(started);

    let started = Instant::now();
    let stream = connect(addr, limit).await?;
    timings.connect_ms = elapsed_ms(started);

    let request = endpoint.request(user_agent);
    let exchanged = if endpoint.secure {
        let started = Instant::now();
        let mut stream = tls::handshake(connector, stream, &endpoint.host, limit).await?;
        timings.tls_handshake_ms = elapsed_ms(started);
        exchange(&mut stream, request.as_bytes(), limit, timings).await
    } else {
        let mut stream = stream;
        exchange(&mut stream, request.as_bytes(), limit, timings).await
    };

    if let Err(error) = exchanged {
        debug!(host = %endpoint.host, error = %error, "Response phases not measured");
    }
    Ok(())
}

/// Write the request and time the response. The stream is shut down whether
/// or not the exchange succeeded.
async fn exchange<S>(
    stream: &mut S,
    request: &[u8],
    limit: Duration,
    timings: &mut PhaseTimings,
) -> Result<(), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = read_response(stream, request, limit, timings).await;
    let _ = timeout(limit, stream.shutdown()).await;
    result
}

async fn read_response<S>(
    stream: &mut S,
    request: &[u8],
    limit: Duration,
    timings: &mut PhaseTimings,
) -> Result<(), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started = Instant::now();
    timeout(limit, stream.write_all(request))
        .await
        .map_err(|_| ProbeError::Timeout { phase: Phase::FirstByte, limit })??;

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let read = timeout(limit, stream.read(&mut buf))
        .await
        .map_err(|_| ProbeError::Timeout { phase: Phase::FirstByte, limit })??;
    if read == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before response").into());
    }
    timings.time_to_first_byte_ms = elapsed_ms(started);

    let first_byte = Instant::now();
    loop {
        match timeout(limit, stream.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => continue,
            // Peers that close TLS without close_notify
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ProbeError::Timeout { phase: Phase::Download, limit }),
        }
    }
    timings.download_ms = elapsed_ms(first_byte);

    Ok(())
}
