use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("destination port {port} requires a protocol")]
    PortWithoutProtocol { port: u16 },

    #[error("port prefix length {prefix_len} requires a protocol")]
    PortPrefixWithoutProtocol { prefix_len: u8 },

    #[error("port prefix length {prefix_len} requires a destination port")]
    PortPrefixWithoutPort { prefix_len: u8 },

    #[error("proxy port {proxy_port} requires a destination port")]
    ProxyPortWithoutPort { proxy_port: u16 },

    #[error("port prefix length {prefix_len} must be 1-16 for a specified port")]
    PortPrefixOutOfRange { prefix_len: u8 },

    #[error("deny entry cannot redirect to proxy port {proxy_port}")]
    DenyWithProxyPort { proxy_port: u16 },

    #[error("deny entry cannot require auth type {auth_type}")]
    DenyWithAuthType { auth_type: u8 },

    #[error("invalid traffic direction: {value}")]
    InvalidTrafficDirection { value: u8 },

    #[error("key prefix length {prefixlen} is outside the valid range")]
    KeyPrefixOutOfRange { prefixlen: u32 },

    #[error("key prefix length {actual} does not match its fields (expected {expected})")]
    KeyPrefixMismatch { expected: u32, actual: u32 },

    #[error(
        "entry prefix length {entry_prefix_length} does not match key prefix length {key_prefixlen}"
    )]
    PrefixLengthMismatch {
        key_prefixlen: u32,
        entry_prefix_length: u8,
    },

    #[error("policy entry not found: {key}")]
    EntryNotFound { key: String },

    #[error("policy map full: {max} entries")]
    MapFull { max: usize },
}

impl From<PolicyError> for DomainError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::EntryNotFound { ref key } => DomainError::RuleNotFound(key.clone()),
            PolicyError::MapFull { .. } => DomainError::EngineError(e.to_string()),
            other => DomainError::InvalidRule(other.to_string()),
        }
    }
}
