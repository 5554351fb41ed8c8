use crate::error::ProbeError;
use crate::model::PeerCertificate;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::{X509NameRef, X509Ref};
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_openssl::SslStream;
use tracing::debug;

static VERIFYING_CONNECTOR: OnceLock<anyhow::Result<SslConnector>> = OnceLock::new();
static PERMISSIVE_CONNECTOR: OnceLock<anyhow::Result<SslConnector>> = OnceLock::new();

/// Shared connector for the requested verification mode.
pub fn tls_connector(insecure: bool) -> anyhow::Result<&'static SslConnector> {
    let cell = if insecure {
        &PERMISSIVE_CONNECTOR
    } else {
        &VERIFYING_CONNECTOR
    };

    cell.get_or_init(|| {
        let mut builder = SslConnector::builder(SslMethod::tls()).map_err(|e| anyhow!(e))?;
        if insecure {
            builder.set_verify(SslVerifyMode::NONE);
        }
        Ok(builder.build())
    })
    .as_ref()
    .map_err(|err| anyhow!("failed to create TLS connector: {err}"))
}

/// Runs a client handshake over `stream` and returns the peer's leaf
/// certificate. The stream is consumed and dropped on every path.
pub async fn handshake<S>(
    stream: S,
    server_name: &str,
    insecure: bool,
    limit: Duration,
) -> Result<PeerCertificate, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let connector = tls_connector(insecure).map_err(ProbeError::handshake)?;
    let ssl = connector
        .configure()
        .context("failed to configure TLS connector")
        .map(|cfg| cfg.verify_hostname(!insecure))
        .and_then(|cfg| {
            cfg.into_ssl(server_name)
                .context("failed to configure TLS SNI")
        })
        .map_err(ProbeError::handshake)?;
    let mut tls_stream = SslStream::new(ssl, stream)
        .context("failed to initialize TLS stream")
        .map_err(ProbeError::handshake)?;

    match timeout(limit, Pin::new(&mut tls_stream).connect()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            return Err(ProbeError::TlsHandshake(format!(
                "handshake with {server_name} failed: {err}"
            )))
        }
        Err(_) => {
            return Err(ProbeError::TlsHandshake(format!(
                "handshake with {server_name} timed out after {limit:?}"
            )))
        }
    }
    debug!(server_name, version = tls_stream.ssl().version_str(), "TLS handshake complete");

    leaf_certificate(&tls_stream)
}

/// Extracts the first certificate of the chain the peer presented.
pub fn leaf_certificate<S>(stream: &SslStream<S>) -> Result<PeerCertificate, ProbeError>
where
    S: AsyncRead + AsyncWrite,
{
    let cert = stream
        .ssl()
        .peer_certificate()
        .ok_or_else(|| ProbeError::TlsHandshake("peer presented no certificate".into()))?;
    peer_certificate(&cert).map_err(ProbeError::handshake)
}

pub(crate) fn peer_certificate(cert: &X509Ref) -> anyhow::Result<PeerCertificate> {
    let serial = cert
        .serial_number()
        .to_bn()
        .and_then(|bn| bn.to_hex_str().map(|hex| hex.to_string()))
        .context("failed to read certificate serial")?;

    Ok(PeerCertificate {
        subject: format_x509_name(cert.subject_name()),
        issuer: format_x509_name(cert.issuer_name()),
        serial,
        not_before: asn1_to_utc(cert.not_before())?,
        not_after: asn1_to_utc(cert.not_after())?,
        der: cert.to_der().context("failed to encode certificate")?,
    })
}

fn asn1_to_utc(time: &Asn1TimeRef) -> anyhow::Result<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0).context("failed to build epoch")?;
    let diff = epoch.diff(time).context("failed to compare certificate time")?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("certificate time out of range"))
}

fn format_x509_name(name: &X509NameRef) -> String {
    let mut parts = Vec::new();
    for entry in name.entries() {
        let key = entry.object().nid().short_name().unwrap_or("UNKNOWN");
        let value = entry
            .data()
            .as_utf8()
            .map(|val| val.to_string())
            .unwrap_or_default();
        if !value.is_empty() {
            parts.push(format!("{key}={value}"));
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::{X509NameBuilder, X509};

    fn certificate() -> X509 {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("O", "Probe Test").unwrap();
        name.append_entry_by_text("CN", "mail.example.org").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(0x2a).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::from_unix(1_767_225_600).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::from_unix(1_775_001_600).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    #[test]
    fn converts_certificate_fields() {
        let cert = peer_certificate(&certificate()).unwrap();
        assert_eq!(cert.subject, "O=Probe Test, CN=mail.example.org");
        assert_eq!(cert.issuer, cert.subject);
        assert_eq!(cert.serial, "2A");
        assert_eq!(cert.not_before.timestamp(), 1_767_225_600);
        assert_eq!(cert.not_after.timestamp(), 1_775_001_600);
        assert!(!cert.der.is_empty());
    }

    #[test]
    fn connectors_are_cached_per_mode() {
        let strict = tls_connector(false).unwrap();
        let permissive = tls_connector(true).unwrap();
        assert!(std::ptr::eq(strict, tls_connector(false).unwrap()));
        assert!(!std::ptr::eq(strict, permissive));
    }
}
