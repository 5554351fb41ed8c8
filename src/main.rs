mod cli;
mod output;

use clap::Parser;
use cli::{Cli, Command};
use netprobe::starttls::UpgradeProtocol;
use netprobe::{input::parse_address, ping, StartTlsResult};
use output::{redact_url, write_report, Detail, ProbeReport};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let report = run(cli.command).await?;
    write_report(cli.output, &report)?;

    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Command) -> anyhow::Result<ProbeReport> {
    let started = Instant::now();
    let report = match command {
        Command::Ping { host, timeout_ms } => {
            let limit = cli::timeout(timeout_ms)?;
            let res = ping::ping_with_timeout(&host, limit).await;
            ProbeReport::new("ping", host, started.elapsed(), Detail::Ping(res))
        }
        Command::Starttls { tls: args, upgrade } => {
            let config = args.config()?;
            let upgrade = upgrade.or_else(|| {
                parse_address(&args.address)
                    .ok()
                    .map(|target| UpgradeProtocol::for_port(target.port))
            });
            let result: StartTlsResult = match upgrade {
                Some(protocol) => {
                    netprobe::probe_starttls_with(&args.address, protocol, &config).await
                }
                None => netprobe::probe_starttls(&args.address, &config).await,
            }
            .into();
            ProbeReport::new(
                "starttls",
                args.address,
                started.elapsed(),
                Detail::Tls { upgrade, result },
            )
        }
        Command::Tls(args) => {
            let config = args.config()?;
            let result = netprobe::can_perform_tls(&args.address, &config).await;
            ProbeReport::new(
                "tls",
                args.address,
                started.elapsed(),
                Detail::Tls {
                    upgrade: None,
                    result,
                },
            )
        }
        Command::Tcp(args) => {
            let config = args.config()?;
            let connected = netprobe::can_create_tcp_connection(&args.address, &config).await;
            ProbeReport::new(
                "tcp",
                args.address,
                started.elapsed(),
                Detail::Connect { connected },
            )
        }
        Command::Udp(args) => {
            let config = args.config()?;
            let connected = netprobe::can_create_udp_connection(&args.address, &config).await;
            ProbeReport::new(
                "udp",
                args.address,
                started.elapsed(),
                Detail::Connect { connected },
            )
        }
        Command::Http { url, insecure } => {
            let client = netprobe::get_http_client(insecure)?;
            let detail = match client.get(&url).send().await {
                Ok(resp) => Detail::Http {
                    status: Some(resp.status().as_u16()),
                    error: None,
                },
                Err(err) => Detail::Http {
                    status: None,
                    error: Some(err.without_url().to_string()),
                },
            };
            ProbeReport::new("http", redact_url(&url), started.elapsed(), detail)
        }
    };
    Ok(report)
}
