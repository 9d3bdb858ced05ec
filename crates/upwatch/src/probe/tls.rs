//! TLS plumbing for the probe.
//!
//! The measurement and expiry handshakes accept any certificate: an expired
//! or self-signed certificate must still be timed and its expiry read.
//! Certificate validity is judged by the expiry days, and the HTTP request
//! keeps the client's normal verification.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::phases::{self, Endpoint, Phase};
use crate::error::ProbeError;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Connector used for timing and certificate inspection
pub(crate) fn connector() -> Result<TlsConnector, ProbeError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

pub(crate) async fn handshake(
    connector: &TlsConnector,
    stream: TcpStream,
    host: &str,
    limit: Duration,
) -> Result<TlsStream<TcpStream>, ProbeError> {
    let server_name =
        ServerName::try_from(host.to_string()).map_err(|e| ProbeError::Tls(e.to_string()))?;

    timeout(limit, connector.connect(server_name, stream))
        .await
        .map_err(|_| ProbeError::Timeout { phase: Phase::Handshake, limit })?
        .map_err(|e| ProbeError::Tls(e.to_string()))
}

/// Whole days left before `not_after`, rounded up and clamped at zero
pub fn days_until(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (not_after - now).num_seconds();
    if seconds <= 0 {
        return 0;
    }
    (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

fn certificate_not_after(stream: &TlsStream<TcpStream>) -> Result<DateTime<Utc>, ProbeError> {
    let (_, connection) = stream.get_ref();
    let der = connection
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| ProbeError::Tls("server presented no certificate".to_string()))?;

    let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref())
        .map_err(|e| ProbeError::Tls(format!("unreadable certificate: {e}")))?;
    let timestamp = cert.validity().not_after.timestamp();

    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| ProbeError::Tls(format!("certificate expiry {timestamp} out of range")))
}

/// Open a dedicated connection and read the leaf certificate's expiry
pub(crate) async fn expiry_days(
    connector: &TlsConnector,
    endpoint: &Endpoint,
    limit: Duration,
) -> Result<i64, ProbeError> {
    let addr = phases::resolve(endpoint, limit).await?;
    let stream = phases::connect(addr, limit).await?;
    let mut stream = handshake(connector, stream, &endpoint.host, limit).await?;

    let not_after = certificate_not_after(&stream);
    let _ = timeout(limit, stream.shutdown()).await;

    Ok(days_until(not_after?, Utc::now()))
}
