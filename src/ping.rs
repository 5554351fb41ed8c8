//! ICMP echo reachability probe.

use crate::model::PingResult;
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError, ICMP};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, instrument};

pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

const PAYLOAD: [u8; 56] = [0; 56];

/// Why an echo attempt produced no reply. Only used internally and in
/// tests; callers of [`ping`] see a uniform failure.
#[derive(Error, Debug)]
pub enum PingError {
    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("cannot open ICMP socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("echo failed: {0}")]
    Echo(#[from] SurgeError),
}

/// Sends one echo request to `host` and waits up to the default timeout.
pub async fn ping(host: &str) -> PingResult {
    ping_with_timeout(host, DEFAULT_PING_TIMEOUT).await
}

/// Sends one echo request and waits up to `limit`, resolution included.
/// Every failure collapses to `PingResult::failed()`.
pub async fn ping_with_timeout(host: &str, limit: Duration) -> PingResult {
    match echo(host, limit).await {
        Ok(rtt) => PingResult::succeeded(rtt),
        Err(err) => {
            debug!(host, error = %err, "no echo reply");
            PingResult::failed()
        }
    }
}

#[instrument]
pub(crate) async fn echo(host: &str, limit: Duration) -> Result<Duration, PingError> {
    match timeout(limit, echo_unbounded(host, limit)).await {
        Ok(res) => res,
        Err(_) => Err(PingError::Timeout(limit)),
    }
}

async fn echo_unbounded(host: &str, limit: Duration) -> Result<Duration, PingError> {
    let ip = resolve(host).await?;
    let config = match ip {
        IpAddr::V4(_) => Config::default(),
        IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
    };
    let client = Client::new(&config).map_err(PingError::Socket)?;
    let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
    pinger.timeout(limit);

    match pinger.ping(PingSequence(0), &PAYLOAD).await {
        Ok((_packet, rtt)) => {
            debug!(%ip, ?rtt, "echo reply");
            Ok(rtt)
        }
        Err(SurgeError::Timeout { .. }) => Err(PingError::Timeout(limit)),
        Err(err) => Err(err.into()),
    }
}

async fn resolve(host: &str) -> Result<IpAddr, PingError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let name = host.to_string();
    tokio::task::spawn_blocking(move || dns_lookup::lookup_host(&name).ok())
        .await
        .ok()
        .flatten()
        .and_then(|addrs| addrs.into_iter().next())
        .ok_or_else(|| PingError::Resolve(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const TEST_TIMEOUT: Duration = Duration::from_millis(500);
    const SLACK: Duration = Duration::from_millis(1500);

    #[tokio::test]
    async fn loopback_replies() {
        match echo("127.0.0.1", TEST_TIMEOUT).await {
            Err(PingError::Socket(err)) => {
                eprintln!("skipping loopback ping, ICMP sockets unavailable: {err}");
            }
            other => {
                let rtt = other.expect("loopback should answer");
                assert!(rtt > Duration::ZERO);

                let res = ping_with_timeout("127.0.0.1", TEST_TIMEOUT).await;
                assert!(res.success);
                assert!(res.rtt > Duration::ZERO);
            }
        }
    }

    #[tokio::test]
    async fn invalid_address_fails_with_zero_rtt() {
        let started = Instant::now();
        let res = ping_with_timeout("256.256.256.256", TEST_TIMEOUT).await;
        assert!(!res.success);
        assert_eq!(res.rtt, Duration::ZERO);
        assert!(started.elapsed() < TEST_TIMEOUT + SLACK);
    }

    #[tokio::test]
    async fn unreachable_address_fails_within_timeout() {
        // TEST-NET-1, reserved for documentation and never routed.
        let started = Instant::now();
        let res = ping_with_timeout("192.0.2.1", TEST_TIMEOUT).await;
        assert!(!res.success);
        assert_eq!(res.rtt, Duration::ZERO);
        assert!(started.elapsed() < TEST_TIMEOUT + SLACK);
    }
}
