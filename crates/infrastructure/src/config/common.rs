//! Shared parsing helpers and error types used by the config modules.

use std::path::Path;

use tracing::warn;

use domain::common::entity::Protocol;
use domain::policy::entity::{PolicyAction, TrafficDirection};
use ebpf_common::policy::MAX_POLICY_ENTRIES;

/// Maximum policy rules, one map entry each at most.
pub(super) const MAX_POLICY_RULES: usize = MAX_POLICY_ENTRIES as usize;

// ── Config errors ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(String),

    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("invalid value '{value}' for field '{field}': expected one of {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("logging init failed: {0}")]
    Logging(String),
}

impl From<serde_yaml_ng::Error> for ConfigError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Yaml(e.to_string())
    }
}

// ── Parsing helpers ────────────────────────────────────────────────

/// Parse a traffic direction. Accepts `ingress`/`in` and `egress`/`out`.
pub fn parse_direction(s: &str) -> Result<TrafficDirection, ()> {
    match s.to_lowercase().as_str() {
        "ingress" | "in" => Ok(TrafficDirection::Ingress),
        "egress" | "out" => Ok(TrafficDirection::Egress),
        _ => Err(()),
    }
}

pub(super) fn parse_action(s: &str) -> Result<PolicyAction, ()> {
    match s.to_lowercase().as_str() {
        "allow" | "pass" => Ok(PolicyAction::Allow),
        "deny" | "drop" => Ok(PolicyAction::Deny),
        _ => Err(()),
    }
}

/// Parse a protocol name or a raw IP protocol number (`"47"`).
pub(super) fn parse_protocol(s: &str) -> Result<Protocol, ()> {
    match s.to_lowercase().as_str() {
        "tcp" => Ok(Protocol::Tcp),
        "udp" => Ok(Protocol::Udp),
        "icmp" => Ok(Protocol::Icmp),
        "icmpv6" | "icmp6" => Ok(Protocol::IcmpV6),
        "sctp" => Ok(Protocol::Sctp),
        "any" | "*" => Ok(Protocol::Any),
        other => other.parse::<u8>().map(Protocol::from_u8).map_err(|_| ()),
    }
}

/// Log a warning if a file is world-writable (Unix only).
#[cfg(unix)]
pub(super) fn warn_if_world_writable(path: &Path, label: &str) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o002 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{mode:04o}"),
                "{label} is world-writable, consider chmod 644 or stricter",
            );
        }
    }
}

#[cfg(not(unix))]
pub(super) fn warn_if_world_writable(_path: &Path, _label: &str) {}

/// Enforce a maximum count on a config collection.
pub(super) fn check_limit(field: &str, count: usize, max: usize) -> Result<(), ConfigError> {
    if count > max {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: format!("count {count} exceeds maximum {max}"),
        });
    }
    Ok(())
}
