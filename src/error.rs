//! Error types for connectivity probes

use std::time::Duration;
use thiserror::Error;

/// Reasons a TLS or StartTLS probe can fail.
///
/// Every variant leaves the probe with `connected = false` and no
/// certificate; the caller decides what the failure means for the
/// endpoint's health.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The address was not of the form `host:port`. No I/O was attempted.
    #[error("invalid address {0:?}, format must be host:port")]
    AddressFormat(String),

    /// The TCP connection could not be established.
    #[error("failed to connect to {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connection was not established within the configured timeout.
    #[error("timed out connecting to {address} after {timeout:?}")]
    DialTimeout { address: String, timeout: Duration },

    /// The connection was established but the upgrade dialogue or the TLS
    /// handshake did not complete.
    #[error("tls handshake failed: {0}")]
    TlsHandshake(String),
}

impl ProbeError {
    pub fn is_address_format(&self) -> bool {
        matches!(self, ProbeError::AddressFormat(_))
    }

    /// True for both refused/unresolvable dials and dial timeouts.
    pub fn is_dial(&self) -> bool {
        matches!(self, ProbeError::Dial { .. } | ProbeError::DialTimeout { .. })
    }

    pub fn is_tls_handshake(&self) -> bool {
        matches!(self, ProbeError::TlsHandshake(_))
    }

    /// Short machine-readable label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::AddressFormat(_) => "address_format",
            ProbeError::Dial { .. } | ProbeError::DialTimeout { .. } => "dial",
            ProbeError::TlsHandshake(_) => "tls_handshake",
        }
    }

    pub(crate) fn handshake(err: anyhow::Error) -> Self {
        ProbeError::TlsHandshake(format!("{err:#}"))
    }
}
