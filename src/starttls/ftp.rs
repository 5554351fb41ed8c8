use super::session::{expect_code, numeric_reply_end, UpgradeSession};
use super::{Transport, Upgrader};
use anyhow::Context;
use async_trait::async_trait;

pub(crate) struct FtpUpgrade;

#[async_trait]
impl Upgrader for FtpUpgrade {
    fn name(&self) -> &'static str {
        "ftp"
    }

    async fn upgrade(&self, stream: &mut dyn Transport, _server_name: &str) -> anyhow::Result<()> {
        let mut session = UpgradeSession::new(stream);

        let greeting = session
            .read_reply(numeric_reply_end)
            .await
            .context("failed to read FTP greeting")?;
        expect_code(&greeting, 220).context("FTP server refused the session")?;

        session.send(b"AUTH TLS\r\n").await?;
        let ack = session
            .read_reply(numeric_reply_end)
            .await
            .context("failed to read AUTH TLS response")?;
        expect_code(&ack, 234).context("FTP server rejected AUTH TLS")?;

        session.finish()
    }
}
