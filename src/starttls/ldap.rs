use super::session::UpgradeSession;
use super::{Transport, Upgrader};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;

/// LDAPMessage { messageID 1, ExtendedRequest { requestName "1.3.6.1.4.1.1466.20037" } }
const STARTTLS_REQUEST: &[u8] = b"\x30\x1d\x02\x01\x01\x77\x18\x80\x161.3.6.1.4.1.1466.20037";

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;
const TAG_ENUMERATED: u8 = 0x0a;
const TAG_EXTENDED_RESPONSE: u8 = 0x78;

pub(crate) struct LdapUpgrade;

#[async_trait]
impl Upgrader for LdapUpgrade {
    fn name(&self) -> &'static str {
        "ldap"
    }

    async fn upgrade(&self, stream: &mut dyn Transport, _server_name: &str) -> anyhow::Result<()> {
        let mut session = UpgradeSession::new(stream);

        session.send(STARTTLS_REQUEST).await?;
        let reply = session
            .read_reply(ber_element_end)
            .await
            .context("failed to read StartTLS extended response")?;
        let code = extended_result_code(&reply)?;
        if code != 0 {
            bail!("LDAP server rejected StartTLS with resultCode {code}");
        }

        session.finish()
    }
}

/// Splits one BER element off the front of `buf`: (tag, contents, rest).
/// Only definite lengths up to four length octets are accepted.
fn read_element(buf: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let tag = *buf.first()?;
    let first = *buf.get(1)?;
    let (len, header) = if first & 0x80 == 0 {
        (usize::from(first), 2)
    } else {
        let octets = usize::from(first & 0x7f);
        if octets == 0 || octets > 4 {
            return None;
        }
        let bytes = buf.get(2..2 + octets)?;
        let len = bytes
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
        (len, 2 + octets)
    };
    let contents = buf.get(header..header + len)?;
    Some((tag, contents, &buf[header + len..]))
}

fn ber_element_end(buf: &[u8]) -> Option<usize> {
    read_element(buf).map(|(_, _, rest)| buf.len() - rest.len())
}

fn extended_result_code(message: &[u8]) -> anyhow::Result<u8> {
    let malformed = || anyhow!("malformed LDAP response");

    let (tag, body, _) = read_element(message).ok_or_else(malformed)?;
    if tag != TAG_SEQUENCE {
        bail!("LDAP response is not a message envelope (tag {tag:#04x})");
    }
    let (tag, _message_id, body) = read_element(body).ok_or_else(malformed)?;
    if tag != TAG_INTEGER {
        return Err(malformed());
    }
    let (tag, op, _) = read_element(body).ok_or_else(malformed)?;
    if tag != TAG_EXTENDED_RESPONSE {
        bail!("expected ExtendedResponse, got tag {tag:#04x}");
    }
    let (tag, code, _) = read_element(op).ok_or_else(malformed)?;
    if tag != TAG_ENUMERATED || code.len() != 1 {
        return Err(malformed());
    }
    Ok(code[0])
}
