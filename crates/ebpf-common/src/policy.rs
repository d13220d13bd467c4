use core::mem::size_of;

/// Traffic direction values stored in `PolicyKey.traffic_direction`.
pub const TRAFFIC_DIRECTION_INGRESS: u8 = 0;
pub const TRAFFIC_DIRECTION_EGRESS: u8 = 1;

/// Entry flag: matching traffic is denied. Absence means allow.
pub const POLICY_FLAG_DENY: u8 = 0x01;

/// Maximum entries in a per-endpoint policy LPM trie.
pub const MAX_POLICY_ENTRIES: u32 = 16_384;

/// Width of the protocol segment once it is specified.
pub const NEXTHDR_BITS: u32 = (size_of::<u8>() * 8) as u32;

/// Width of the destination port segment once fully specified.
pub const DEST_PORT_BITS: u32 = (size_of::<u16>() * 8) as u32;

/// Bits that are significant in every key: identity + traffic direction.
///
/// Derived from the key layout so that the constant follows the struct.
pub const STATIC_PREFIX_BITS: u32 = ((size_of::<PolicyKey>()
    - size_of::<u32>() // prefixlen
    - size_of::<u8>() // nexthdr
    - size_of::<u16>()) // dest_port_network
    * 8) as u32;

/// Prefix length of a key with every segment specified.
pub const FULL_PREFIX_BITS: u32 = STATIC_PREFIX_BITS + NEXTHDR_BITS + DEST_PORT_BITS;

/// LPM trie key for the per-endpoint policy map (12 bytes).
///
/// Segment order after `prefixlen` is fixed: identity, direction, protocol,
/// destination port. `prefixlen` counts the significant bits after itself.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolicyKey {
    /// Number of significant bits, `STATIC_PREFIX_BITS..=FULL_PREFIX_BITS`.
    pub prefixlen: u32,
    /// Peer security identity, stored verbatim. 0 = any identity.
    pub identity: u32,
    /// `TRAFFIC_DIRECTION_INGRESS` or `TRAFFIC_DIRECTION_EGRESS`.
    pub traffic_direction: u8,
    /// IP protocol number. 0 = any protocol.
    pub nexthdr: u8,
    /// Destination port in network byte order. 0 = any port.
    pub dest_port_network: u16,
}

impl PolicyKey {
    /// Build a raw key. `dest_port` is given in host byte order and is
    /// converted to network byte order here; no validation is performed.
    pub const fn new(
        prefixlen: u32,
        identity: u32,
        traffic_direction: u8,
        nexthdr: u8,
        dest_port: u16,
    ) -> Self {
        Self {
            prefixlen,
            identity,
            traffic_direction,
            nexthdr,
            dest_port_network: dest_port.to_be(),
        }
    }

    /// Destination port in host byte order.
    pub const fn dest_port(&self) -> u16 {
        u16::from_be(self.dest_port_network)
    }

    /// The trie data portion of this key (everything after `prefixlen`).
    pub const fn data(&self) -> PolicyKeyData {
        PolicyKeyData {
            identity: self.identity,
            traffic_direction: self.traffic_direction,
            nexthdr: self.nexthdr,
            dest_port_network: self.dest_port_network,
        }
    }

    /// The key with every bit past `prefixlen` cleared.
    ///
    /// Two keys with the same canonical form name the same trie node.
    pub const fn canonical(&self) -> Self {
        let nexthdr_bits = segment_bits(self.prefixlen, STATIC_PREFIX_BITS, NEXTHDR_BITS);
        let port_bits = segment_bits(
            self.prefixlen,
            STATIC_PREFIX_BITS + NEXTHDR_BITS,
            DEST_PORT_BITS,
        );
        let nexthdr_mask = if nexthdr_bits == 0 {
            0
        } else {
            u8::MAX << (NEXTHDR_BITS - nexthdr_bits)
        };
        let port_mask = if port_bits == 0 {
            0
        } else {
            u16::MAX << (DEST_PORT_BITS - port_bits)
        };
        Self {
            prefixlen: self.prefixlen,
            identity: self.identity,
            traffic_direction: self.traffic_direction,
            nexthdr: self.nexthdr & nexthdr_mask,
            dest_port_network: (self.dest_port() & port_mask).to_be(),
        }
    }

    /// Rebuild a key from a prefix length and its trie data.
    pub const fn from_data(prefixlen: u32, data: PolicyKeyData) -> Self {
        Self {
            prefixlen,
            identity: data.identity,
            traffic_direction: data.traffic_direction,
            nexthdr: data.nexthdr,
            dest_port_network: data.dest_port_network,
        }
    }
}

/// Bits of a `width`-bit segment starting at bit `offset` that fall inside
/// `prefixlen`.
const fn segment_bits(prefixlen: u32, offset: u32, width: u32) -> u32 {
    let covered = prefixlen.saturating_sub(offset);
    if covered > width { width } else { covered }
}

/// Data portion of `PolicyKey`, as passed to `aya::maps::lpm_trie::Key`
/// together with the prefix length (8 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolicyKeyData {
    pub identity: u32,
    pub traffic_direction: u8,
    pub nexthdr: u8,
    pub dest_port_network: u16,
}

impl PolicyKeyData {
    /// Bytes as laid out in the trie, most significant segment first.
    pub fn to_bytes(&self) -> [u8; 8] {
        let id = self.identity.to_ne_bytes();
        let port = self.dest_port_network.to_ne_bytes();
        [
            id[0],
            id[1],
            id[2],
            id[3],
            self.traffic_direction,
            self.nexthdr,
            port[0],
            port[1],
        ]
    }
}

/// LPM trie value for the per-endpoint policy map (24 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolicyEntry {
    /// Proxy redirect port in network byte order. 0 = no redirect.
    pub proxy_port_network: u16,
    /// `POLICY_FLAG_*` bitset.
    pub flags: u8,
    /// Required authentication mode for allowed traffic. 0 = none.
    pub auth_type: u8,
    /// Mirror of the paired key's `prefixlen - STATIC_PREFIX_BITS`.
    pub lpm_prefix_length: u8,
    pub _pad: [u8; 3],
    /// Packets matched, maintained by the datapath.
    pub packets: u64,
    /// Bytes matched, maintained by the datapath.
    pub bytes: u64,
}

impl PolicyEntry {
    /// Build a raw entry with zeroed counters. `proxy_port` is given in host
    /// byte order; no validation is performed.
    pub const fn new(flags: u8, auth_type: u8, proxy_port: u16, lpm_prefix_length: u8) -> Self {
        Self {
            proxy_port_network: proxy_port.to_be(),
            flags,
            auth_type,
            lpm_prefix_length,
            _pad: [0; 3],
            packets: 0,
            bytes: 0,
        }
    }

    /// Proxy redirect port in host byte order.
    pub const fn proxy_port(&self) -> u16 {
        u16::from_be(self.proxy_port_network)
    }

    pub const fn is_deny(&self) -> bool {
        self.flags & POLICY_FLAG_DENY != 0
    }

    /// Same entry with the datapath counters cleared.
    pub fn without_counters(&self) -> Self {
        Self {
            packets: 0,
            bytes: 0,
            ..*self
        }
    }
}

// SAFETY: All types are #[repr(C)], Copy, 'static, and contain only primitive types
// with explicit padding. Safe for zero-copy eBPF map operations via aya.
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for PolicyKey {}
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for PolicyKeyData {}
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for PolicyEntry {}
