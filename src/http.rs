//! Process-wide HTTP clients, one per certificate-verification mode.

use anyhow::anyhow;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_IDLE_PER_HOST: usize = 20;

static SECURE_HTTP_CLIENT: OnceLock<anyhow::Result<Client>> = OnceLock::new();
static INSECURE_HTTP_CLIENT: OnceLock<anyhow::Result<Client>> = OnceLock::new();

/// Returns the shared client for the requested verification mode, building
/// it on first use. Concurrent first callers observe the same instance.
pub fn get_http_client(insecure: bool) -> anyhow::Result<&'static Client> {
    let cell = if insecure {
        &INSECURE_HTTP_CLIENT
    } else {
        &SECURE_HTTP_CLIENT
    };

    cell.get_or_init(|| build_client(insecure))
        .as_ref()
        .map_err(|err| anyhow!("failed to create HTTP client: {err}"))
}

fn build_client(insecure: bool) -> anyhow::Result<Client> {
    tracing::debug!(insecure, "building shared HTTP client");
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .danger_accept_invalid_certs(insecure)
        .user_agent(concat!("netprobe/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only test in this binary that touches the caches, so the
    // "not yet built" assertions hold.
    #[test]
    fn clients_are_built_lazily_and_independently() {
        assert!(SECURE_HTTP_CLIENT.get().is_none());
        assert!(INSECURE_HTTP_CLIENT.get().is_none());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| get_http_client(false).unwrap() as *const Client as usize)
            })
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
        assert!(SECURE_HTTP_CLIENT.get().is_some());
        assert!(INSECURE_HTTP_CLIENT.get().is_none());

        let secure = get_http_client(false).unwrap();
        let insecure = get_http_client(true).unwrap();
        assert!(INSECURE_HTTP_CLIENT.get().is_some());

        assert_eq!(secure as *const Client as usize, addrs[0]);
        assert!(std::ptr::eq(insecure, get_http_client(true).unwrap()));
        assert!(!std::ptr::eq(secure, insecure));
    }
}
