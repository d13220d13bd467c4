//! Policy map configuration structs and conversion logic.

use domain::policy::entity::PolicyRule;
use ebpf_common::policy::DEST_PORT_BITS;
use serde::{Deserialize, Serialize};

use super::common::{ConfigError, parse_action, parse_direction, parse_protocol};
use crate::constants::DEFAULT_POLICY_MAP_NAME;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyMapConfig {
    /// Name of the LPM trie map in the loaded eBPF object.
    #[serde(default = "default_map_name")]
    pub map_name: String,

    #[serde(default)]
    pub rules: Vec<PolicyRuleConfig>,
}

impl Default for PolicyMapConfig {
    fn default() -> Self {
        Self {
            map_name: default_map_name(),
            rules: Vec::new(),
        }
    }
}

fn default_map_name() -> String {
    DEFAULT_POLICY_MAP_NAME.to_string()
}

// ── Policy rule config (YAML-friendly) ─────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRuleConfig {
    /// Peer identity, 0 or absent for any.
    #[serde(default)]
    pub identity: u32,

    pub direction: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Destination port, 0 or absent for any.
    #[serde(default)]
    pub port: u16,

    /// Leading port bits to match. Defaults to a full match when a port is
    /// set and to 0 otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_prefix_len: Option<u8>,

    pub action: String,

    #[serde(default)]
    pub auth_type: u8,

    #[serde(default)]
    pub proxy_port: u16,
}

fn default_protocol() -> String {
    "any".to_string()
}

impl PolicyRuleConfig {
    /// Validate this rule config at the YAML level, then check the
    /// resulting rule's wildcarding.
    pub(super) fn validate(&self, idx: usize) -> Result<(), ConfigError> {
        let prefix = format!("policy_map.rules[{idx}]");
        let rule = self.convert(&prefix)?;
        rule.validate().map_err(|e| ConfigError::Validation {
            field: prefix,
            message: e.to_string(),
        })
    }

    /// Convert to a domain `PolicyRule`.
    pub fn to_domain_rule(&self) -> Result<PolicyRule, ConfigError> {
        self.convert("policy_map.rule")
    }

    #[allow(clippy::cast_possible_truncation)] // DEST_PORT_BITS == 16
    fn effective_port_prefix_len(&self) -> u8 {
        match self.port_prefix_len {
            Some(len) => len,
            None if self.port != 0 => DEST_PORT_BITS as u8,
            None => 0,
        }
    }

    fn convert(&self, prefix: &str) -> Result<PolicyRule, ConfigError> {
        let direction = parse_direction(&self.direction).map_err(|()| ConfigError::InvalidValue {
            field: format!("{prefix}.direction"),
            value: self.direction.clone(),
            expected: "ingress, egress".to_string(),
        })?;

        let protocol = parse_protocol(&self.protocol).map_err(|()| ConfigError::InvalidValue {
            field: format!("{prefix}.protocol"),
            value: self.protocol.clone(),
            expected: "tcp, udp, icmp, icmpv6, sctp, any, 0-255".to_string(),
        })?;

        let action = parse_action(&self.action).map_err(|()| ConfigError::InvalidValue {
            field: format!("{prefix}.action"),
            value: self.action.clone(),
            expected: "allow, deny".to_string(),
        })?;

        Ok(PolicyRule {
            identity: self.identity,
            direction,
            protocol,
            port: self.port,
            port_prefix_len: self.effective_port_prefix_len(),
            action,
            auth_type: self.auth_type,
            proxy_port: self.proxy_port,
        })
    }
}
