use super::session::{line_end, UpgradeSession};
use super::{Transport, Upgrader};
use anyhow::{bail, Context};
use async_trait::async_trait;

const TAG: &str = "a001";

pub(crate) struct ImapUpgrade;

#[async_trait]
impl Upgrader for ImapUpgrade {
    fn name(&self) -> &'static str {
        "imap"
    }

    async fn upgrade(&self, stream: &mut dyn Transport, _server_name: &str) -> anyhow::Result<()> {
        let mut session = UpgradeSession::new(stream);

        let greeting = session
            .read_reply(line_end)
            .await
            .context("failed to read IMAP greeting")?;
        if !starts_with_ignore_case(&greeting, b"* OK") {
            bail!(
                "IMAP server refused the session: {}",
                String::from_utf8_lossy(&greeting).trim()
            );
        }

        session
            .send(format!("{TAG} STARTTLS\r\n").as_bytes())
            .await?;
        let reply = session
            .read_reply(tagged_reply_end)
            .await
            .context("failed to read STARTTLS response")?;
        let status = tagged_status(&reply)
            .context("STARTTLS response carried no tagged status")?;
        if !status.eq_ignore_ascii_case("OK") {
            bail!("IMAP server rejected STARTTLS: {status}");
        }

        session.finish()
    }
}

/// End of the line carrying our tag; untagged lines before it are part of
/// the reply.
fn tagged_reply_end(buf: &[u8]) -> Option<usize> {
    let prefix = format!("{TAG} ");
    let mut offset = 0;
    while let Some(len) = line_end(&buf[offset..]) {
        let line = &buf[offset..offset + len];
        offset += len;
        if starts_with_ignore_case(line, prefix.as_bytes()) {
            return Some(offset);
        }
    }
    None
}

fn tagged_status(reply: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(reply);
    let line = text.lines().last()?;
    line.split_whitespace().nth(1).map(ToString::to_string)
}

fn starts_with_ignore_case(line: &[u8], prefix: &[u8]) -> bool {
    line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}
