use crate::error::ProbeError;
use crate::input::parse_address;
use crate::model::{PeerCertificate, ProbeConfig, StartTlsResult, TargetSpec};
use crate::tls;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Opens a TCP connection, resolving the host inside the same time budget.
pub(crate) async fn dial(target: &TargetSpec, limit: Duration) -> Result<TcpStream, ProbeError> {
    let address = target.to_string();
    match timeout(limit, TcpStream::connect((target.host.as_str(), target.port))).await {
        Ok(Ok(stream)) => {
            debug!(%address, "connected");
            Ok(stream)
        }
        Ok(Err(source)) => Err(ProbeError::Dial { address, source }),
        Err(_) => Err(ProbeError::DialTimeout {
            address,
            timeout: limit,
        }),
    }
}

/// Whether a TCP connection to `address` can be established. The
/// connection is closed right away.
#[instrument(skip(config))]
pub async fn can_create_tcp_connection(address: &str, config: &ProbeConfig) -> bool {
    let Ok(target) = parse_address(address) else {
        return false;
    };
    dial(&target, config.timeout).await.is_ok()
}

/// Whether a UDP socket can be connected to `address`. UDP has no
/// handshake, so this only shows the address resolves and is routable.
#[instrument(skip(config))]
pub async fn can_create_udp_connection(address: &str, config: &ProbeConfig) -> bool {
    let Ok(target) = parse_address(address) else {
        return false;
    };
    timeout(config.timeout, connect_udp(&target))
        .await
        .map(|res| res.is_ok())
        .unwrap_or(false)
}

async fn connect_udp(target: &TargetSpec) -> std::io::Result<UdpSocket> {
    let remote = lookup_host((target.host.as_str(), target.port))
        .await?
        .next()
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::AddrNotAvailable))?;
    let local: SocketAddr = match remote {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(remote).await?;
    Ok(socket)
}

/// TLS handshake directly on connect, whatever the port.
#[instrument(skip(config), fields(insecure = config.insecure))]
pub async fn probe_tls(address: &str, config: &ProbeConfig) -> Result<PeerCertificate, ProbeError> {
    let target = parse_address(address)?;
    let stream = dial(&target, config.timeout).await?;
    tls::handshake(stream, &target.host, config.insecure, config.timeout).await
}

pub async fn can_perform_tls(address: &str, config: &ProbeConfig) -> StartTlsResult {
    probe_tls(address, config).await.into()
}
