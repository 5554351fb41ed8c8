use super::Transport;
use anyhow::{bail, Context};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const MAX_REPLY_BYTES: usize = 16 * 1024;
const READ_CHUNK: usize = 1024;

/// Command/reply exchange over the plaintext leg of a connection.
///
/// Bytes received past the end of a reply are kept for the next one; any
/// still buffered when the upgrade is acknowledged are an error, since the
/// peer must wait for our ClientHello.
pub(crate) struct UpgradeSession<'a> {
    stream: &'a mut dyn Transport,
    buf: Vec<u8>,
    max_bytes: usize,
}

impl<'a> UpgradeSession<'a> {
    pub(crate) fn new(stream: &'a mut dyn Transport) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            max_bytes: MAX_REPLY_BYTES,
        }
    }

    pub(crate) async fn send(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.stream
            .write_all(bytes)
            .await
            .context("failed to write upgrade command")?;
        self.stream
            .flush()
            .await
            .context("failed to flush upgrade command")
    }

    /// Reads until `complete` reports the end offset of a whole reply and
    /// returns exactly that reply.
    pub(crate) async fn read_reply<F>(&mut self, complete: F) -> anyhow::Result<Vec<u8>>
    where
        F: Fn(&[u8]) -> Option<usize> + Send,
    {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(end) = complete(&self.buf) {
                return Ok(self.buf.drain(..end).collect());
            }
            if self.buf.len() >= self.max_bytes {
                bail!("reply exceeded {} bytes", self.max_bytes);
            }
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .context("failed to read reply")?;
            if n == 0 {
                bail!("connection closed before the reply was complete");
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    pub(crate) fn finish(self) -> anyhow::Result<()> {
        if !self.buf.is_empty() {
            bail!(
                "peer sent {} unexpected bytes after acknowledging the upgrade",
                self.buf.len()
            );
        }
        Ok(())
    }
}

/// End of the first complete line.
pub(crate) fn line_end(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}

/// End of an SMTP/FTP style reply: continuation lines are `NNN-text`, the
/// final line is `NNN text` or a bare `NNN`.
pub(crate) fn numeric_reply_end(buf: &[u8]) -> Option<usize> {
    let mut offset = 0;
    while let Some(len) = line_end(&buf[offset..]) {
        let line = &buf[offset..offset + len];
        offset += len;
        if line.get(3) != Some(&b'-') {
            return Some(offset);
        }
    }
    None
}

/// Status code of the last line of a numeric reply.
pub(crate) fn reply_code(reply: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(reply).ok()?;
    let last = text.lines().filter(|line| !line.trim().is_empty()).last()?;
    last.get(..3)?.parse().ok()
}

pub(crate) fn expect_code(reply: &[u8], expected: u16) -> anyhow::Result<()> {
    match reply_code(reply) {
        Some(code) if code == expected => Ok(()),
        Some(code) => bail!(
            "expected {expected}, got {code}: {}",
            String::from_utf8_lossy(reply).trim()
        ),
        None => bail!(
            "malformed reply: {}",
            String::from_utf8_lossy(reply).trim()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn numeric_reply_waits_for_final_line() {
        let partial = b"250-mx.example.org\r\n250-PIPELINING\r\n";
        assert_eq!(numeric_reply_end(partial), None);

        let full = b"250-mx.example.org\r\n250 STARTTLS\r\n220 next";
        assert_eq!(numeric_reply_end(full), Some(34));
    }

    #[test]
    fn bare_code_is_final() {
        assert_eq!(numeric_reply_end(b"250\r\n"), Some(5));
    }

    #[test]
    fn code_of_last_line() {
        assert_eq!(reply_code(b"250-first\r\n250 STARTTLS\r\n"), Some(250));
        assert_eq!(reply_code(b"hello\r\n"), None);
        assert!(expect_code(b"220 ready\r\n", 220).is_ok());
        let err = expect_code(b"454 TLS not available\r\n", 220).unwrap_err();
        assert!(err.to_string().contains("got 454"));
    }

    #[tokio::test]
    async fn keeps_bytes_past_the_reply() {
        let (mut client, mut server) = duplex(256);
        server
            .write_all(b"+OK ready\r\n+OK begin\r\n")
            .await
            .unwrap();

        let mut session = UpgradeSession::new(&mut client);
        assert_eq!(session.read_reply(line_end).await.unwrap(), b"+OK ready\r\n");
        assert_eq!(session.read_reply(line_end).await.unwrap(), b"+OK begin\r\n");
        assert!(session.finish().is_ok());
    }

    #[tokio::test]
    async fn leftover_bytes_fail_the_upgrade() {
        let (mut client, mut server) = duplex(256);
        server
            .write_all(b"220 go ahead\r\n250 injected\r\n")
            .await
            .unwrap();

        let mut session = UpgradeSession::new(&mut client);
        session.read_reply(numeric_reply_end).await.unwrap();
        assert!(session.finish().is_err());
    }

    #[tokio::test]
    async fn close_mid_reply_is_an_error() {
        let (mut client, mut server) = duplex(256);
        server.write_all(b"250-partial\r\n").await.unwrap();
        drop(server);

        let mut session = UpgradeSession::new(&mut client);
        let err = session.read_reply(numeric_reply_end).await.unwrap_err();
        assert!(err.to_string().contains("connection closed"));
    }
}
