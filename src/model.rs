use crate::error::ProbeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A parsed `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Settings shared by the TCP, TLS and StartTLS probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProbeConfig {
    /// Accept any certificate and skip hostname verification.
    #[serde(default)]
    pub insecure: bool,

    /// Bound applied to each of connect, upgrade dialogue and TLS handshake.
    #[serde(default = "default_timeout", with = "millis")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ProbeConfig {
    pub fn insecure(insecure: bool) -> Self {
        Self {
            insecure,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Outcome of a single echo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PingResult {
    pub success: bool,
    #[serde(rename = "rtt_ms", serialize_with = "serialize_millis")]
    pub rtt: Duration,
}

impl PingResult {
    pub fn succeeded(rtt: Duration) -> Self {
        // A reply always takes some time; keep success distinguishable from
        // the zero that marks failure even on coarse clocks.
        let rtt = if rtt.is_zero() {
            Duration::from_nanos(1)
        } else {
            rtt
        };
        Self { success: true, rtt }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            rtt: Duration::ZERO,
        }
    }
}

fn serialize_millis<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

/// The leaf certificate presented by a TLS peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerCertificate {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    #[serde(skip)]
    pub der: Vec<u8>,
}

impl PeerCertificate {
    /// Time left until `not_after`, negative once expired.
    pub fn expires_in(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.not_after - now
    }

    pub fn seconds_until_expiry(&self) -> i64 {
        self.expires_in(Utc::now()).num_seconds()
    }
}

/// Connectivity and certificate evidence from a StartTLS or TLS probe.
///
/// `error` set implies `connected == false` and no certificate.
#[derive(Debug, Serialize)]
pub struct StartTlsResult {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<PeerCertificate>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_error"
    )]
    pub error: Option<ProbeError>,
}

impl From<Result<PeerCertificate, ProbeError>> for StartTlsResult {
    fn from(result: Result<PeerCertificate, ProbeError>) -> Self {
        match result {
            Ok(certificate) => StartTlsResult {
                connected: true,
                certificate: Some(certificate),
                error: None,
            },
            Err(error) => StartTlsResult {
                connected: false,
                certificate: None,
                error: Some(error),
            },
        }
    }
}

fn serialize_error<S>(value: &Option<ProbeError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;

    match value {
        Some(err) => {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("kind", err.kind())?;
            map.serialize_entry("message", &err.to_string())?;
            map.end()
        }
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn certificate() -> PeerCertificate {
        PeerCertificate {
            subject: "CN=mail.example.org".into(),
            issuer: "CN=Example CA".into(),
            serial: "01".into(),
            not_before: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            not_after: Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
            der: Vec::new(),
        }
    }

    #[test]
    fn failed_ping_has_zero_rtt() {
        let res = PingResult::failed();
        assert!(!res.success);
        assert_eq!(res.rtt, Duration::ZERO);
    }

    #[test]
    fn successful_ping_is_never_zero() {
        let res = PingResult::succeeded(Duration::ZERO);
        assert!(res.success);
        assert!(res.rtt > Duration::ZERO);
    }

    #[test]
    fn expiry_countdown() {
        let cert = certificate();
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap();
        assert_eq!(cert.expires_in(now).num_seconds(), 86_400);
        let later = Utc.with_ymd_and_hms(2026, 4, 2, 0, 0, 0).unwrap();
        assert!(cert.expires_in(later).num_seconds() < 0);
    }

    #[test]
    fn error_result_has_no_certificate() {
        let res = StartTlsResult::from(Err(ProbeError::AddressFormat("test".into())));
        assert!(!res.connected);
        assert!(res.certificate.is_none());
        assert!(res.error.is_some());

        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["connected"], false);
        assert_eq!(json["error"]["kind"], "address_format");
    }

    #[test]
    fn success_result_carries_certificate() {
        let res = StartTlsResult::from(Ok(certificate()));
        assert!(res.connected);
        assert!(res.error.is_none());
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["certificate"]["subject"], "CN=mail.example.org");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn config_defaults_from_empty_document() {
        let cfg: ProbeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ProbeConfig::default());

        let cfg: ProbeConfig = serde_json::from_str(r#"{"insecure":true,"timeout":250}"#).unwrap();
        assert!(cfg.insecure);
        assert_eq!(cfg.timeout, Duration::from_millis(250));
    }

    #[test]
    fn target_display_brackets_ipv6() {
        let spec = TargetSpec {
            host: "::1".into(),
            port: 993,
        };
        assert_eq!(spec.to_string(), "[::1]:993");
    }
}
