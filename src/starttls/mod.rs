//! Plaintext-to-TLS upgrade probing.
//!
//! The destination port selects an upgrade dialogue (SMTP, POP3, IMAP, FTP,
//! LDAP) or none at all for TLS-native and unknown ports; the TLS handshake
//! then runs over the same connection.

mod ftp;
mod imap;
mod ldap;
mod pop3;
mod registry;
mod session;
mod smtp;

pub use registry::UpgradeProtocol;

use crate::connection::dial;
use crate::error::ProbeError;
use crate::input::parse_address;
use crate::model::{PeerCertificate, ProbeConfig, StartTlsResult, TargetSpec};
use crate::tls;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Byte stream an upgrade dialogue can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// A protocol-specific request to switch the connection to TLS.
#[async_trait]
pub trait Upgrader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs the plaintext dialogue. On `Ok` the peer expects a ClientHello
    /// as the next bytes on `stream`.
    async fn upgrade(&self, stream: &mut dyn Transport, server_name: &str) -> anyhow::Result<()>;
}

/// Connects to `address`, runs the upgrade dialogue its port calls for and
/// completes a TLS handshake, returning the peer's leaf certificate.
#[instrument(skip(config), fields(insecure = config.insecure))]
pub async fn probe_starttls(
    address: &str,
    config: &ProbeConfig,
) -> Result<PeerCertificate, ProbeError> {
    let target = parse_address(address)?;
    let protocol = UpgradeProtocol::for_port(target.port);
    upgrade_and_handshake(&target, protocol, config).await
}

/// Like [`probe_starttls`] but with the upgrade dialogue chosen by the
/// caller, for services on non-standard ports.
#[instrument(skip(config), fields(insecure = config.insecure))]
pub async fn probe_starttls_with(
    address: &str,
    protocol: UpgradeProtocol,
    config: &ProbeConfig,
) -> Result<PeerCertificate, ProbeError> {
    let target = parse_address(address)?;
    upgrade_and_handshake(&target, protocol, config).await
}

async fn upgrade_and_handshake(
    target: &TargetSpec,
    protocol: UpgradeProtocol,
    config: &ProbeConfig,
) -> Result<PeerCertificate, ProbeError> {
    let mut stream = dial(target, config.timeout).await?;

    if let Some(upgrader) = protocol.upgrader() {
        debug!(protocol = upgrader.name(), "requesting TLS upgrade");
        match timeout(config.timeout, upgrader.upgrade(&mut stream, &target.host)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let err = err.context(format!("{} upgrade failed", upgrader.name()));
                return Err(ProbeError::handshake(err));
            }
            Err(_) => {
                return Err(ProbeError::TlsHandshake(format!(
                    "{} upgrade not acknowledged within {:?}",
                    upgrader.name(),
                    config.timeout
                )))
            }
        }
    }

    tls::handshake(stream, &target.host, config.insecure, config.timeout).await
}

/// Convenience wrapper using the default timeout.
pub async fn can_perform_starttls(address: &str, insecure: bool) -> StartTlsResult {
    probe_starttls(address, &ProbeConfig::insecure(insecure))
        .await
        .into()
}
