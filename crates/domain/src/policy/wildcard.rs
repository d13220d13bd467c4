use ebpf_common::policy::DEST_PORT_BITS;

use super::error::PolicyError;

/// Field combination to check before a key or entry is built.
///
/// Wildcards are applied coarse to fine: a protocol of 0 wildcards the port,
/// a port of 0 wildcards the port prefix and forbids a proxy redirect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WildcardCheck {
    pub protocol: u8,
    pub port: u16,
    pub port_prefix_len: u8,
    pub proxy_port: u16,
    pub auth_type: u8,
    pub deny: bool,
}

impl WildcardCheck {
    /// Check covering only the key fields.
    pub fn key(protocol: u8, port: u16, port_prefix_len: u8) -> Self {
        Self {
            protocol,
            port,
            port_prefix_len,
            ..Self::default()
        }
    }

    /// Reject combinations that break the specificity ladder.
    /// Each broken rule has its own error variant.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.protocol == 0 {
            if self.port != 0 {
                return Err(PolicyError::PortWithoutProtocol { port: self.port });
            }
            if self.port_prefix_len != 0 {
                return Err(PolicyError::PortPrefixWithoutProtocol {
                    prefix_len: self.port_prefix_len,
                });
            }
        }

        if self.port == 0 {
            if self.port_prefix_len != 0 {
                return Err(PolicyError::PortPrefixWithoutPort {
                    prefix_len: self.port_prefix_len,
                });
            }
            if self.proxy_port != 0 {
                return Err(PolicyError::ProxyPortWithoutPort {
                    proxy_port: self.proxy_port,
                });
            }
        } else if self.port_prefix_len == 0 || u32::from(self.port_prefix_len) > DEST_PORT_BITS {
            return Err(PolicyError::PortPrefixOutOfRange {
                prefix_len: self.port_prefix_len,
            });
        }

        if self.deny {
            if self.proxy_port != 0 {
                return Err(PolicyError::DenyWithProxyPort {
                    proxy_port: self.proxy_port,
                });
            }
            if self.auth_type != 0 {
                return Err(PolicyError::DenyWithAuthType {
                    auth_type: self.auth_type,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_wildcarded_is_valid() {
        assert!(WildcardCheck::key(0, 0, 0).validate().is_ok());
    }

    #[test]
    fn protocol_only_is_valid() {
        assert!(WildcardCheck::key(6, 0, 0).validate().is_ok());
    }

    #[test]
    fn full_and_partial_port_are_valid() {
        assert!(WildcardCheck::key(6, 80, 16).validate().is_ok());
        assert!(WildcardCheck::key(6, 80, 15).validate().is_ok());
        assert!(WildcardCheck::key(17, 80, 1).validate().is_ok());
    }

    #[test]
    fn port_without_protocol_rejected() {
        assert_eq!(
            WildcardCheck::key(0, 80, 16).validate(),
            Err(PolicyError::PortWithoutProtocol { port: 80 })
        );
    }

    #[test]
    fn prefix_without_protocol_rejected() {
        assert_eq!(
            WildcardCheck::key(0, 0, 8).validate(),
            Err(PolicyError::PortPrefixWithoutProtocol { prefix_len: 8 })
        );
    }

    #[test]
    fn prefix_without_port_rejected() {
        assert_eq!(
            WildcardCheck::key(6, 0, 16).validate(),
            Err(PolicyError::PortPrefixWithoutPort { prefix_len: 16 })
        );
    }

    #[test]
    fn proxy_without_port_rejected() {
        let check = WildcardCheck {
            protocol: 6,
            proxy_port: 15001,
            ..WildcardCheck::default()
        };
        assert_eq!(
            check.validate(),
            Err(PolicyError::ProxyPortWithoutPort { proxy_port: 15001 })
        );
    }

    #[test]
    fn port_prefix_out_of_range_rejected() {
        assert_eq!(
            WildcardCheck::key(6, 80, 0).validate(),
            Err(PolicyError::PortPrefixOutOfRange { prefix_len: 0 })
        );
        assert_eq!(
            WildcardCheck::key(6, 80, 17).validate(),
            Err(PolicyError::PortPrefixOutOfRange { prefix_len: 17 })
        );
    }

    #[test]
    fn deny_with_proxy_rejected() {
        let check = WildcardCheck {
            protocol: 6,
            port: 80,
            port_prefix_len: 16,
            proxy_port: 15001,
            deny: true,
            ..WildcardCheck::default()
        };
        assert_eq!(
            check.validate(),
            Err(PolicyError::DenyWithProxyPort { proxy_port: 15001 })
        );
    }

    #[test]
    fn deny_with_auth_rejected() {
        let check = WildcardCheck {
            auth_type: 1,
            deny: true,
            ..WildcardCheck::default()
        };
        assert_eq!(
            check.validate(),
            Err(PolicyError::DenyWithAuthType { auth_type: 1 })
        );
    }

    #[test]
    fn allow_with_proxy_and_auth_is_valid() {
        let check = WildcardCheck {
            protocol: 6,
            port: 80,
            port_prefix_len: 16,
            proxy_port: 23767,
            auth_type: 1,
            deny: false,
        };
        assert!(check.validate().is_ok());
    }
}
