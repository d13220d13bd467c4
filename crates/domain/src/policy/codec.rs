//! Key and entry construction for the policy LPM map.
//!
//! The key's prefix length encodes which segments are specified:
//!
//! | protocol | port | prefixlen                                   |
//! |----------|------|---------------------------------------------|
//! | 0        | 0    | `STATIC_PREFIX_BITS`                        |
//! | != 0     | 0    | `STATIC_PREFIX_BITS + NEXTHDR_BITS`         |
//! | != 0     | != 0 | `STATIC_PREFIX_BITS + NEXTHDR_BITS + 1..=16` |
//!
//! Every entry mirrors the variable part of its key's prefix length in
//! `lpm_prefix_length`.

use ebpf_common::policy::{
    FULL_PREFIX_BITS, NEXTHDR_BITS, POLICY_FLAG_DENY, PolicyEntry, PolicyKey, STATIC_PREFIX_BITS,
};

use crate::common::entity::Protocol;

use super::entity::{PolicyVerdict, TrafficDirection};
use super::error::PolicyError;
use super::wildcard::WildcardCheck;

/// Prefix length implied by the given segments. Inputs must already pass
/// `WildcardCheck::validate`.
pub fn prefix_len_for(protocol: u8, port: u16, port_prefix_len: u8) -> u32 {
    if protocol == 0 {
        STATIC_PREFIX_BITS
    } else if port == 0 {
        STATIC_PREFIX_BITS + NEXTHDR_BITS
    } else {
        STATIC_PREFIX_BITS + NEXTHDR_BITS + u32::from(port_prefix_len)
    }
}

/// Number of leading port bits a key treats as significant.
pub fn port_prefix_len(key: &PolicyKey) -> u8 {
    let port_bits = key
        .prefixlen
        .saturating_sub(STATIC_PREFIX_BITS + NEXTHDR_BITS);
    u8::try_from(port_bits).unwrap_or(u8::MAX)
}

/// Build a canonical policy key.
pub fn build_key(
    direction: TrafficDirection,
    identity: u32,
    protocol: Protocol,
    port: u16,
    port_prefix_len: u8,
) -> Result<PolicyKey, PolicyError> {
    let proto = protocol.to_u8();
    WildcardCheck::key(proto, port, port_prefix_len).validate()?;

    Ok(PolicyKey::new(
        prefix_len_for(proto, port, port_prefix_len),
        identity,
        direction.to_u8(),
        proto,
        port,
    ))
}

/// Re-check a key that was built elsewhere or read back from the map.
pub fn validate_key(key: &PolicyKey) -> Result<(), PolicyError> {
    TrafficDirection::from_u8(key.traffic_direction)?;

    if key.prefixlen < STATIC_PREFIX_BITS || key.prefixlen > FULL_PREFIX_BITS {
        return Err(PolicyError::KeyPrefixOutOfRange {
            prefixlen: key.prefixlen,
        });
    }

    let port = key.dest_port();
    let port_prefix = if key.nexthdr != 0 && port != 0 {
        port_prefix_len(key)
    } else {
        0
    };
    WildcardCheck::key(key.nexthdr, port, port_prefix).validate()?;

    let expected = prefix_len_for(key.nexthdr, port, port_prefix);
    if expected != key.prefixlen {
        return Err(PolicyError::KeyPrefixMismatch {
            expected,
            actual: key.prefixlen,
        });
    }
    Ok(())
}

/// `key.prefixlen - STATIC_PREFIX_BITS` for a validated key.
#[allow(clippy::cast_possible_truncation)] // ≤ NEXTHDR_BITS + DEST_PORT_BITS after validation
fn lpm_prefix_length(key: &PolicyKey) -> u8 {
    (key.prefixlen - STATIC_PREFIX_BITS) as u8
}

/// Build an allow entry for `key`. A non-zero `proxy_port` requires the key
/// to have a specified destination port.
pub fn build_allow_entry(
    key: &PolicyKey,
    auth_type: u8,
    proxy_port: u16,
) -> Result<PolicyEntry, PolicyError> {
    validate_key(key)?;
    if proxy_port != 0 && key.dest_port() == 0 {
        return Err(PolicyError::ProxyPortWithoutPort { proxy_port });
    }
    Ok(PolicyEntry::new(0, auth_type, proxy_port, lpm_prefix_length(key)))
}

/// Build a deny entry for `key`. Auth type and proxy port are always zero.
pub fn build_deny_entry(key: &PolicyKey) -> Result<PolicyEntry, PolicyError> {
    validate_key(key)?;
    Ok(PolicyEntry::new(POLICY_FLAG_DENY, 0, 0, lpm_prefix_length(key)))
}

pub fn build_entry(key: &PolicyKey, verdict: PolicyVerdict) -> Result<PolicyEntry, PolicyError> {
    match verdict {
        PolicyVerdict::Allow {
            auth_type,
            proxy_port,
        } => build_allow_entry(key, auth_type, proxy_port),
        PolicyVerdict::Deny => build_deny_entry(key),
    }
}

/// Check a pre-built pair: valid key, matching prefix lengths, and no
/// redirect or auth metadata on a deny entry.
pub fn check_pair(key: &PolicyKey, entry: &PolicyEntry) -> Result<(), PolicyError> {
    validate_key(key)?;

    if u32::from(entry.lpm_prefix_length) + STATIC_PREFIX_BITS != key.prefixlen {
        return Err(PolicyError::PrefixLengthMismatch {
            key_prefixlen: key.prefixlen,
            entry_prefix_length: entry.lpm_prefix_length,
        });
    }

    let port = key.dest_port();
    WildcardCheck {
        protocol: key.nexthdr,
        port,
        port_prefix_len: if key.nexthdr != 0 && port != 0 {
            port_prefix_len(key)
        } else {
            0
        },
        proxy_port: entry.proxy_port(),
        auth_type: entry.auth_type,
        deny: entry.is_deny(),
    }
    .validate()
}
