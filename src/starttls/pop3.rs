use super::session::{line_end, UpgradeSession};
use super::{Transport, Upgrader};
use anyhow::{bail, Context};
use async_trait::async_trait;

pub(crate) struct Pop3Upgrade;

#[async_trait]
impl Upgrader for Pop3Upgrade {
    fn name(&self) -> &'static str {
        "pop3"
    }

    async fn upgrade(&self, stream: &mut dyn Transport, _server_name: &str) -> anyhow::Result<()> {
        let mut session = UpgradeSession::new(stream);

        let greeting = session
            .read_reply(line_end)
            .await
            .context("failed to read POP3 greeting")?;
        expect_positive(&greeting).context("POP3 server refused the session")?;

        session.send(b"STLS\r\n").await?;
        let ack = session
            .read_reply(line_end)
            .await
            .context("failed to read STLS response")?;
        expect_positive(&ack).context("POP3 server rejected STLS")?;

        session.finish()
    }
}

fn expect_positive(reply: &[u8]) -> anyhow::Result<()> {
    if reply.starts_with(b"+OK") {
        Ok(())
    } else {
        bail!("{}", String::from_utf8_lossy(reply).trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn sends_stls() {
        let (mut client, mut server) = duplex(1024);
        let server = tokio::spawn(async move {
            server.write_all(b"+OK POP3 ready\r\n").await.unwrap();
            let mut buf = [0u8; 16];
            let n = server.read(&mut buf).await.unwrap();
            server
                .write_all(b"+OK Begin TLS negotiation\r\n")
                .await
                .unwrap();
            buf[..n].to_vec()
        });

        Pop3Upgrade.upgrade(&mut client, "pop.example.org").await.unwrap();
        assert_eq!(server.await.unwrap(), b"STLS\r\n");
    }

    #[tokio::test]
    async fn err_reply_is_rejected() {
        let (mut client, mut server) = duplex(1024);
        tokio::spawn(async move {
            server.write_all(b"+OK POP3 ready\r\n").await.unwrap();
            let mut buf = [0u8; 16];
            let _ = server.read(&mut buf).await.unwrap();
            server
                .write_all(b"-ERR command not permitted\r\n")
                .await
                .unwrap();
            let _ = server.read(&mut buf).await;
        });

        let err = Pop3Upgrade.upgrade(&mut client, "pop").await.unwrap_err();
        assert!(format!("{err:#}").contains("-ERR command not permitted"));
    }
}
