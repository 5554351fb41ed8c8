use clap::{Args, Parser, Subcommand, ValueEnum};
use netprobe::model::{ProbeConfig, DEFAULT_TIMEOUT};
use netprobe::starttls::UpgradeProtocol;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(author, version, about = "Connectivity and StartTLS probing tool", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long = "output", global = true, default_value_t = OutputFormat::Jsonl)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one ICMP echo request
    Ping {
        host: String,
        /// Reply timeout in milliseconds
        #[arg(long = "timeout")]
        timeout_ms: Option<u64>,
    },
    /// Upgrade to TLS with the port's StartTLS dialogue and report the certificate
    Starttls {
        #[command(flatten)]
        tls: TlsArgs,
        /// Upgrade dialogue to use instead of the one implied by the port
        #[arg(long = "upgrade", value_name = "PROTOCOL")]
        upgrade: Option<UpgradeProtocol>,
    },
    /// TLS handshake immediately after connecting
    Tls(TlsArgs),
    /// Open and close a TCP connection
    Tcp(ConnectArgs),
    /// Connect a UDP socket
    Udp(ConnectArgs),
    /// GET a URL through the shared HTTP client
    Http {
        url: String,
        /// Accept any certificate
        #[arg(long = "insecure")]
        insecure: bool,
    },
}

#[derive(Debug, Args)]
pub struct TlsArgs {
    /// Target as host:port
    pub address: String,
    /// Accept any certificate and skip hostname verification
    #[arg(long = "insecure")]
    pub insecure: bool,
    /// Timeout in milliseconds for each of connect, upgrade and handshake
    #[arg(long = "timeout")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Target as host:port
    pub address: String,
    /// Connect timeout in milliseconds
    #[arg(long = "timeout")]
    pub timeout_ms: Option<u64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Jsonl,
    Pretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Pretty => write!(f, "pretty"),
        }
    }
}

pub fn timeout(timeout_ms: Option<u64>) -> anyhow::Result<Duration> {
    match timeout_ms {
        Some(0) => anyhow::bail!("timeout must be greater than zero"),
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => Ok(DEFAULT_TIMEOUT),
    }
}

impl TlsArgs {
    pub fn config(&self) -> anyhow::Result<ProbeConfig> {
        Ok(ProbeConfig::insecure(self.insecure).with_timeout(timeout(self.timeout_ms)?))
    }
}

impl ConnectArgs {
    pub fn config(&self) -> anyhow::Result<ProbeConfig> {
        Ok(ProbeConfig::default().with_timeout(timeout(self.timeout_ms)?))
    }
}
