use std::fmt::Write as _;

use ebpf_common::policy::{DEST_PORT_BITS, NEXTHDR_BITS, PolicyKey, STATIC_PREFIX_BITS};

use crate::common::entity::Protocol;

use super::entity::{PolicyEntryDump, PolicyVerdict, TrafficDirection};

/// Render the port/protocol part of a key, e.g. `"ANY"`, `"TCP"`,
/// `"8080/TCP"` or `"256-511/ANY"` for a partially specified port.
///
/// Works on the prefix length alone and does not validate the key.
pub fn port_proto_string(key: &PolicyKey) -> String {
    let proto = Protocol::from_u8(key.nexthdr);
    let variable_bits = key.prefixlen.saturating_sub(STATIC_PREFIX_BITS);

    if variable_bits == 0 {
        return "ANY".to_string();
    }
    if variable_bits <= NEXTHDR_BITS {
        return proto.to_string();
    }

    let port = key.dest_port();
    let port_bits = (variable_bits - NEXTHDR_BITS).min(DEST_PORT_BITS);
    if port_bits < DEST_PORT_BITS {
        let host_mask = u16::MAX >> port_bits;
        let low = port & !host_mask;
        let high = port | host_mask;
        format!("{low}-{high}/{proto}")
    } else {
        format!("{port}/{proto}")
    }
}

/// One human-readable line for a dumped pair, e.g.
/// `"Ingress identity=42 80/TCP Allow proxy_port=15001 packets=3 bytes=180"`.
pub fn render_dump_line(dump: &PolicyEntryDump) -> String {
    let direction = TrafficDirection::from_u8(dump.key.traffic_direction)
        .map_or("Unknown", TrafficDirection::as_str);

    let mut line = String::with_capacity(64);
    let _ = write!(line, "{direction} identity=");
    if dump.key.identity == 0 {
        line.push_str("ANY");
    } else {
        let _ = write!(line, "{}", dump.key.identity);
    }
    let _ = write!(line, " {}", port_proto_string(&dump.key));

    match dump.verdict() {
        PolicyVerdict::Deny => line.push_str(" Deny"),
        PolicyVerdict::Allow {
            auth_type,
            proxy_port,
        } => {
            line.push_str(" Allow");
            if auth_type != 0 {
                let _ = write!(line, " auth_type={auth_type}");
            }
            if proxy_port != 0 {
                let _ = write!(line, " proxy_port={proxy_port}");
            }
        }
    }

    let _ = write!(
        line,
        " packets={} bytes={}",
        dump.entry.packets, dump.entry.bytes
    );
    line
}

impl std::fmt::Display for PolicyEntryDump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&render_dump_line(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::codec::{build_allow_entry, build_deny_entry, build_key};
    use ebpf_common::policy::{FULL_PREFIX_BITS, TRAFFIC_DIRECTION_INGRESS};

    fn key(prefixlen: u32, nexthdr: u8, port: u16) -> PolicyKey {
        PolicyKey::new(prefixlen, 0, TRAFFIC_DIRECTION_INGRESS, nexthdr, port)
    }

    #[test]
    fn allow_all() {
        assert_eq!(port_proto_string(&key(STATIC_PREFIX_BITS, 0, 0)), "ANY");
    }

    #[test]
    fn fully_specified_port_any_proto() {
        assert_eq!(port_proto_string(&key(FULL_PREFIX_BITS, 0, 8080)), "8080/ANY");
    }

    #[test]
    fn fully_specified_port_and_proto() {
        assert_eq!(port_proto_string(&key(FULL_PREFIX_BITS, 6, 8080)), "8080/TCP");
    }

    #[test]
    fn tcp_wildcarded_port() {
        assert_eq!(
            port_proto_string(&key(STATIC_PREFIX_BITS + NEXTHDR_BITS, 6, 0)),
            "TCP"
        );
    }

    #[test]
    fn wildcard_proto_upper_eight_port_bits() {
        let k = key(
            STATIC_PREFIX_BITS + NEXTHDR_BITS + DEST_PORT_BITS / 2,
            0,
            0x0100,
        );
        assert_eq!(port_proto_string(&k), "256-511/ANY");
    }

    #[test]
    fn partial_port_clears_low_bits() {
        // 80 with a 10-bit prefix covers 64..=127.
        let k = build_key(TrafficDirection::Ingress, 0, Protocol::Tcp, 80, 10).unwrap();
        assert_eq!(port_proto_string(&k), "64-127/TCP");
    }

    #[test]
    fn unmapped_protocol_renders_any() {
        assert_eq!(
            port_proto_string(&key(STATIC_PREFIX_BITS + NEXTHDR_BITS, 47, 0)),
            "ANY"
        );
        assert_eq!(port_proto_string(&key(FULL_PREFIX_BITS, 47, 1723)), "1723/ANY");
    }

    #[test]
    fn dump_line_allow_with_redirect() {
        let k = build_key(TrafficDirection::Ingress, 42, Protocol::Tcp, 80, 16).unwrap();
        let mut entry = build_allow_entry(&k, 1, 23767).unwrap();
        entry.packets = 3;
        entry.bytes = 180;
        assert_eq!(
            render_dump_line(&PolicyEntryDump::new(k, entry)),
            "Ingress identity=42 80/TCP Allow auth_type=1 proxy_port=23767 packets=3 bytes=180"
        );
    }

    #[test]
    fn dump_line_deny_any_identity() {
        let k = build_key(TrafficDirection::Egress, 0, Protocol::Udp, 0, 0).unwrap();
        let dump = PolicyEntryDump::new(k, build_deny_entry(&k).unwrap());
        assert_eq!(dump.to_string(), "Egress identity=ANY UDP Deny packets=0 bytes=0");
    }
}
