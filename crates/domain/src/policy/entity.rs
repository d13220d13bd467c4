use serde::{Deserialize, Serialize};

use ebpf_common::policy::{PolicyEntry, PolicyKey, TRAFFIC_DIRECTION_EGRESS, TRAFFIC_DIRECTION_INGRESS};

use crate::common::entity::Protocol;

use super::codec;
use super::error::PolicyError;
use super::wildcard::WildcardCheck;

// ── Traffic direction ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrafficDirection {
    Ingress,
    Egress,
}

impl TrafficDirection {
    /// Convert to the u8 value stored in `PolicyKey.traffic_direction`.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Ingress => TRAFFIC_DIRECTION_INGRESS,
            Self::Egress => TRAFFIC_DIRECTION_EGRESS,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, PolicyError> {
        match value {
            TRAFFIC_DIRECTION_INGRESS => Ok(Self::Ingress),
            TRAFFIC_DIRECTION_EGRESS => Ok(Self::Egress),
            value => Err(PolicyError::InvalidTrafficDirection { value }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingress => "Ingress",
            Self::Egress => "Egress",
        }
    }
}

impl std::fmt::Display for TrafficDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Verdict ─────────────────────────────────────────────────────────

/// Decision carried by a policy entry. Deny carries no redirect or auth
/// metadata, so there is nothing to zero out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyVerdict {
    Allow { auth_type: u8, proxy_port: u16 },
    Deny,
}

impl PolicyVerdict {
    /// Plain allow: no auth requirement, no redirect.
    pub const ALLOW: Self = Self::Allow {
        auth_type: 0,
        proxy_port: 0,
    };

    /// Decode the verdict stored in a map entry.
    pub fn from_entry(entry: &PolicyEntry) -> Self {
        if entry.is_deny() {
            Self::Deny
        } else {
            Self::Allow {
                auth_type: entry.auth_type,
                proxy_port: entry.proxy_port(),
            }
        }
    }
}

// ── Map pair ────────────────────────────────────────────────────────

/// One (key, entry) pair as written to or dumped from the policy map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyEntryDump {
    pub key: PolicyKey,
    pub entry: PolicyEntry,
}

impl PolicyEntryDump {
    pub fn new(key: PolicyKey, entry: PolicyEntry) -> Self {
        Self { key, entry }
    }

    pub fn verdict(&self) -> PolicyVerdict {
        PolicyVerdict::from_entry(&self.entry)
    }

    pub fn is_deny(&self) -> bool {
        self.entry.is_deny()
    }
}

// ── Policy rule ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyAction {
    Allow,
    Deny,
}

/// Declarative policy intent, as read from configuration.
///
/// `auth_type` and `proxy_port` are kept raw so that a deny rule carrying
/// them is reported instead of silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Peer identity. 0 = any identity.
    pub identity: u32,
    pub direction: TrafficDirection,
    pub protocol: Protocol,
    /// Destination port. 0 = any port.
    pub port: u16,
    /// Significant leading bits of `port` (1-16), 0 when the port is wildcarded.
    pub port_prefix_len: u8,
    pub action: PolicyAction,
    #[serde(default)]
    pub auth_type: u8,
    #[serde(default)]
    pub proxy_port: u16,
}

impl PolicyRule {
    /// Validate the wildcarding of all fields of this rule.
    pub fn validate(&self) -> Result<(), PolicyError> {
        WildcardCheck {
            protocol: self.protocol.to_u8(),
            port: self.port,
            port_prefix_len: self.port_prefix_len,
            proxy_port: self.proxy_port,
            auth_type: self.auth_type,
            deny: self.action == PolicyAction::Deny,
        }
        .validate()
    }

    pub fn verdict(&self) -> PolicyVerdict {
        match self.action {
            PolicyAction::Allow => PolicyVerdict::Allow {
                auth_type: self.auth_type,
                proxy_port: self.proxy_port,
            },
            PolicyAction::Deny => PolicyVerdict::Deny,
        }
    }

    /// Encode this rule into the key/entry pair written to the policy map.
    pub fn to_map_pair(&self) -> Result<PolicyEntryDump, PolicyError> {
        self.validate()?;
        let key = codec::build_key(
            self.direction,
            self.identity,
            self.protocol,
            self.port,
            self.port_prefix_len,
        )?;
        let entry = codec::build_entry(&key, self.verdict())?;
        Ok(PolicyEntryDump::new(key, entry))
    }
}
