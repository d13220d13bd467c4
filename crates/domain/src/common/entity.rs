use serde::{Deserialize, Serialize};

/// IP protocol carried in the `nexthdr` segment of a policy key.
///
/// Equality and hashing follow the protocol number, so `Other(6)` equals
/// `Tcp` and `Other(0)` equals `Any`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    IcmpV6,
    Sctp,
    Any,
    Other(u8),
}

/// Protocol numbers with a display name. Anything not listed renders as `ANY`.
const PROTOCOL_NAMES: [(u8, &str); 5] = [
    (1, "ICMP"),
    (6, "TCP"),
    (17, "UDP"),
    (58, "ICMPv6"),
    (132, "SCTP"),
];

impl Protocol {
    /// Convert to the u8 IP protocol number used in eBPF maps.
    /// Returns 0 for Any (wildcard).
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::Icmp => 1,
            Self::IcmpV6 => 58,
            Self::Sctp => 132,
            Self::Any => 0,
            Self::Other(n) => n,
        }
    }

    /// Create from a raw protocol number.
    pub fn from_u8(n: u8) -> Self {
        match n {
            0 => Self::Any,
            1 => Self::Icmp,
            6 => Self::Tcp,
            17 => Self::Udp,
            58 => Self::IcmpV6,
            132 => Self::Sctp,
            other => Self::Other(other),
        }
    }

    /// Display name for a known protocol number, `None` otherwise.
    pub fn name(self) -> Option<&'static str> {
        let n = self.to_u8();
        PROTOCOL_NAMES
            .iter()
            .find(|(num, _)| *num == n)
            .map(|(_, name)| *name)
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        self.to_u8() == other.to_u8()
    }
}

impl Eq for Protocol {}

impl std::hash::Hash for Protocol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_u8().hash(state);
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name().unwrap_or("ANY"))
    }
}
