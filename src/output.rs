use crate::cli::OutputFormat;
use netprobe::model::{PingResult, StartTlsResult};
use netprobe::starttls::UpgradeProtocol;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub probe: &'static str,
    pub target: String,
    pub success: bool,
    pub timestamp: String,
    pub elapsed_ms: f64,
    #[serde(flatten)]
    pub detail: Detail,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Detail {
    Ping(PingResult),
    Tls {
        #[serde(skip_serializing_if = "Option::is_none")]
        upgrade: Option<UpgradeProtocol>,
        #[serde(flatten)]
        result: StartTlsResult,
    },
    Connect {
        connected: bool,
    },
    Http {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ProbeReport {
    pub fn new(probe: &'static str, target: String, elapsed: Duration, detail: Detail) -> Self {
        let success = match &detail {
            Detail::Ping(res) => res.success,
            Detail::Tls { result, .. } => result.connected,
            Detail::Connect { connected } => *connected,
            Detail::Http { status, .. } => status.is_some_and(|code| code < 400),
        };
        Self {
            probe,
            target,
            success,
            timestamp: chrono::Utc::now().to_rfc3339(),
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            detail,
        }
    }
}

/// Drops the query string so credentials passed as parameters never reach
/// the output.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.to_string()
        }
        Err(_) => "-".to_string(),
    }
}

pub fn write_report(format: OutputFormat, report: &ProbeReport) -> anyhow::Result<()> {
    let mut writer = BufWriter::new(std::io::stdout());
    render(format, report, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn render(format: OutputFormat, report: &ProbeReport, writer: &mut impl Write) -> anyhow::Result<()> {
    match format {
        OutputFormat::Jsonl => {
            let line = serde_json::to_string(report)?;
            writeln!(writer, "{line}")?;
        }
        OutputFormat::Pretty => {
            writeln!(
                writer,
                "{} {} -> {} ({:.2} ms)",
                report.probe,
                report.target,
                if report.success { "ok" } else { "failed" },
                report.elapsed_ms
            )?;
            match &report.detail {
                Detail::Ping(res) if res.success => {
                    writeln!(writer, "  rtt: {:.3} ms", res.rtt.as_secs_f64() * 1000.0)?;
                }
                Detail::Tls { upgrade, result } => {
                    if let Some(upgrade) = upgrade {
                        writeln!(writer, "  upgrade: {upgrade}")?;
                    }
                    if let Some(cert) = &result.certificate {
                        writeln!(writer, "  subject: {}", cert.subject)?;
                        writeln!(writer, "  issuer: {}", cert.issuer)?;
                        writeln!(
                            writer,
                            "  expires: {} ({:.1}d)",
                            cert.not_after.to_rfc3339(),
                            cert.seconds_until_expiry() as f64 / 86_400.0
                        )?;
                    }
                    if let Some(err) = &result.error {
                        writeln!(writer, "  error: [{}] {err}", err.kind())?;
                    }
                }
                Detail::Http { status, error } => {
                    if let Some(status) = status {
                        writeln!(writer, "  status: {status}")?;
                    }
                    if let Some(error) = error {
                        writeln!(writer, "  error: {error}")?;
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}
