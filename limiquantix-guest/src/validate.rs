//! Value validators shared by the guest and its devices.

use std::collections::BTreeSet;

use rand::Rng;
use uuid::Uuid;

use crate::error::{GuestError, Result};

/// OUI used for Xen guest MAC addresses.
pub const XEN_OUI: [u8; 3] = [0x00, 0x16, 0x3e];

/// OUI used for qemu/KVM guest MAC addresses.
pub const QEMU_OUI: [u8; 3] = [0x52, 0x54, 0x00];

/// Check an object name: non-empty, not purely numeric, restricted charset
/// and, with `lencheck`, at most 50 characters.
pub fn validate_name(kind: &str, name: &str, lencheck: bool) -> Result<()> {
    if name.is_empty() {
        return Err(GuestError::Validation(format!("{} name must be a non-empty string", kind)));
    }
    if lencheck && name.chars().count() > 50 {
        return Err(GuestError::Validation(format!(
            "{} name '{}' must be less than 50 characters",
            kind, name
        )));
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(GuestError::Validation(format!(
            "{} name can not be only numeric characters",
            kind
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(GuestError::Validation(format!(
            "{} name '{}' can only contain alphanumeric, '_', '.' or '-' characters",
            kind, name
        )));
    }
    Ok(())
}

/// Accepts hyphenated or plain 32-digit UUIDs.
pub fn validate_uuid(value: &str) -> Result<()> {
    Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| GuestError::Validation(format!("UUID '{}' must be a 32-digit hexadecimal number", value)))
}

pub fn validate_macaddr(value: &str) -> Result<()> {
    let octets: Vec<&str> = value.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(())
    } else {
        Err(GuestError::Validation(format!(
            "MAC address '{}' must be of the form NN:NN:NN:NN:NN:NN",
            value
        )))
    }
}

/// Parse a cpuset string such as `1-3,^2,6` into the selected CPU numbers.
///
/// `^N` excludes a CPU selected earlier. An empty selection is an error.
pub fn parse_cpuset(value: &str) -> Result<Vec<u32>> {
    let invalid = |why: &str| GuestError::Validation(format!("cpuset '{}': {}", value, why));

    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ',' | '-' | '^'))
    {
        return Err(invalid("can only contain numeric, ',', '^', or '-' characters"));
    }

    let mut selected = BTreeSet::new();
    let mut excluded = BTreeSet::new();
    for token in value.split(',') {
        if token.is_empty() {
            return Err(invalid("contains an empty entry"));
        }
        if let Some(cpu) = token.strip_prefix('^') {
            let cpu: u32 = cpu.parse().map_err(|_| invalid("bad exclusion"))?;
            excluded.insert(cpu);
            continue;
        }
        match token.split_once('-') {
            Some((start, end)) => {
                let start: u32 = start.parse().map_err(|_| invalid("bad range start"))?;
                let end: u32 = end.parse().map_err(|_| invalid("bad range end"))?;
                if start > end {
                    return Err(invalid("range start is greater than its end"));
                }
                selected.extend(start..=end);
            }
            None => {
                selected.insert(token.parse::<u32>().map_err(|_| invalid("bad cpu number"))?);
            }
        }
    }

    let cpus: Vec<u32> = selected.difference(&excluded).copied().collect();
    if cpus.is_empty() {
        return Err(invalid("no CPUs selected"));
    }
    Ok(cpus)
}

pub fn validate_cpuset(value: &str) -> Result<()> {
    parse_cpuset(value).map(|_| ())
}

/// Generate a random MAC address under the given OUI.
pub fn random_mac(oui: [u8; 3]) -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        oui[0],
        oui[1],
        oui[2],
        rng.gen_range(0..=0x7f),
        rng.gen::<u8>(),
        rng.gen::<u8>()
    )
}
