//! Connectivity probes for health checking: ICMP reachability, TCP/UDP
//! connectivity, direct TLS and StartTLS capability with the peer's leaf
//! certificate, plus shared HTTP clients per verification mode.

pub mod connection;
pub mod error;
pub mod http;
pub mod input;
pub mod model;
pub mod ping;
pub mod starttls;
pub mod tls;

pub use connection::{
    can_create_tcp_connection, can_create_udp_connection, can_perform_tls, probe_tls,
};
pub use error::ProbeError;
pub use http::get_http_client;
pub use model::{PeerCertificate, PingResult, ProbeConfig, StartTlsResult};
pub use ping::{ping, ping_with_timeout};
pub use starttls::{can_perform_starttls, probe_starttls, probe_starttls_with, UpgradeProtocol};
