use super::session::{expect_code, numeric_reply_end, UpgradeSession};
use super::{Transport, Upgrader};
use anyhow::Context;
use async_trait::async_trait;

const EHLO_NAME: &str = "localhost";

pub(crate) struct SmtpUpgrade;

#[async_trait]
impl Upgrader for SmtpUpgrade {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn upgrade(&self, stream: &mut dyn Transport, _server_name: &str) -> anyhow::Result<()> {
        let mut session = UpgradeSession::new(stream);

        let greeting = session
            .read_reply(numeric_reply_end)
            .await
            .context("failed to read SMTP greeting")?;
        expect_code(&greeting, 220).context("SMTP server refused the session")?;

        session
            .send(format!("EHLO {EHLO_NAME}\r\n").as_bytes())
            .await?;
        let ehlo = session
            .read_reply(numeric_reply_end)
            .await
            .context("failed to read EHLO response")?;
        expect_code(&ehlo, 250).context("SMTP server rejected EHLO")?;

        session.send(b"STARTTLS\r\n").await?;
        let ack = session
            .read_reply(numeric_reply_end)
            .await
            .context("failed to read STARTTLS response")?;
        expect_code(&ack, 220).context("SMTP server rejected STARTTLS")?;

        session.finish()
    }
}
