use crate::error::ProbeError;
use crate::model::TargetSpec;

/// Split `host:port` on the last colon. Bracketed IPv6 hosts are unwrapped.
pub fn parse_address(address: &str) -> Result<TargetSpec, ProbeError> {
    let invalid = || ProbeError::AddressFormat(address.to_string());

    let (host_part, port_part) = address.trim().rsplit_once(':').ok_or_else(invalid)?;
    let host = host_part
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    // An unbracketed IPv6 literal would otherwise be split in the middle.
    if host.contains(':') && !host_part.trim().starts_with('[') {
        return Err(invalid());
    }
    let port: u16 = port_part.trim().parse().map_err(|_| invalid())?;

    Ok(TargetSpec {
        host: host.to_string(),
        port,
    })
}
