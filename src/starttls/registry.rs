use super::ftp::FtpUpgrade;
use super::imap::ImapUpgrade;
use super::ldap::LdapUpgrade;
use super::pop3::Pop3Upgrade;
use super::smtp::SmtpUpgrade;
use super::Upgrader;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How a connection to a given port reaches TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeProtocol {
    /// TLS from the first byte.
    Native,
    Smtp,
    Pop3,
    Imap,
    Ftp,
    Ldap,
    /// Port not in the table; handshake immediately.
    Unknown,
}

const PORT_TABLE: &[(u16, UpgradeProtocol)] = &[
    (21, UpgradeProtocol::Ftp),
    (25, UpgradeProtocol::Smtp),
    (110, UpgradeProtocol::Pop3),
    (143, UpgradeProtocol::Imap),
    (389, UpgradeProtocol::Ldap),
    (443, UpgradeProtocol::Native),
    (465, UpgradeProtocol::Native),
    (587, UpgradeProtocol::Smtp),
    (636, UpgradeProtocol::Native),
    (989, UpgradeProtocol::Native),
    (990, UpgradeProtocol::Native),
    (993, UpgradeProtocol::Native),
    (995, UpgradeProtocol::Native),
    (2525, UpgradeProtocol::Smtp),
];

static SMTP_UPGRADE: SmtpUpgrade = SmtpUpgrade;
static POP3_UPGRADE: Pop3Upgrade = Pop3Upgrade;
static IMAP_UPGRADE: ImapUpgrade = ImapUpgrade;
static FTP_UPGRADE: FtpUpgrade = FtpUpgrade;
static LDAP_UPGRADE: LdapUpgrade = LdapUpgrade;

impl UpgradeProtocol {
    pub fn for_port(port: u16) -> Self {
        PORT_TABLE
            .iter()
            .find(|(p, _)| *p == port)
            .map(|(_, protocol)| *protocol)
            .unwrap_or(UpgradeProtocol::Unknown)
    }

    pub fn upgrader(&self) -> Option<&'static dyn Upgrader> {
        match self {
            UpgradeProtocol::Smtp => Some(&SMTP_UPGRADE),
            UpgradeProtocol::Pop3 => Some(&POP3_UPGRADE),
            UpgradeProtocol::Imap => Some(&IMAP_UPGRADE),
            UpgradeProtocol::Ftp => Some(&FTP_UPGRADE),
            UpgradeProtocol::Ldap => Some(&LDAP_UPGRADE),
            UpgradeProtocol::Native | UpgradeProtocol::Unknown => None,
        }
    }
}

impl fmt::Display for UpgradeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpgradeProtocol::Native => "native",
            UpgradeProtocol::Smtp => "smtp",
            UpgradeProtocol::Pop3 => "pop3",
            UpgradeProtocol::Imap => "imap",
            UpgradeProtocol::Ftp => "ftp",
            UpgradeProtocol::Ldap => "ldap",
            UpgradeProtocol::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for UpgradeProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "tls" => Ok(UpgradeProtocol::Native),
            "smtp" | "submission" => Ok(UpgradeProtocol::Smtp),
            "pop3" => Ok(UpgradeProtocol::Pop3),
            "imap" => Ok(UpgradeProtocol::Imap),
            "ftp" => Ok(UpgradeProtocol::Ftp),
            "ldap" => Ok(UpgradeProtocol::Ldap),
            other => Err(format!("unknown upgrade protocol {other:?}")),
        }
    }
}
