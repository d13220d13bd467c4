#![no_main]

use libfuzzer_sys::fuzz_target;

use domain::common::entity::Protocol;
use domain::policy::codec::{
    build_allow_entry, build_deny_entry, build_key, check_pair, validate_key,
};
use domain::policy::entity::{PolicyEntryDump, TrafficDirection};
use domain::policy::ordering::{compare_dump_entries, sort_dump};
use domain::policy::render::{port_proto_string, render_dump_line};
use ebpf_common::policy::{PolicyEntry, PolicyKey};

// Fuzz the policy key/entry codec and the dump helpers.
//
// Layout (12-byte records):
//   [0..4]  = identity
//   [4]     = direction (low bit)
//   [5]     = protocol
//   [6..8]  = port
//   [8]     = port prefix length
//   [9]     = auth type
//   [10]    = proxy port low byte, high byte taken from [8]
//   [11]    = selector (low bit: deny)
//
// A trailing record shorter than 12 bytes is fed as a raw key/entry pair.
fuzz_target!(|data: &[u8]| {
    let mut dump = Vec::new();

    for rec in data.chunks(12) {
        if rec.len() < 12 {
            raw_pair(rec);
            break;
        }

        let identity = u32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]);
        let direction = if rec[4] & 1 == 0 {
            TrafficDirection::Ingress
        } else {
            TrafficDirection::Egress
        };
        let protocol = Protocol::from_u8(rec[5]);
        let port = u16::from_be_bytes([rec[6], rec[7]]);
        let prefix = rec[8];
        let proxy_port = u16::from_be_bytes([rec[8], rec[10]]);
        let deny = rec[11] & 1 == 1;

        let Ok(key) = build_key(direction, identity, protocol, port, prefix) else {
            continue;
        };
        // Every key the builder accepts must re-validate and render.
        assert!(validate_key(&key).is_ok());
        let _ = port_proto_string(&key);

        let entry = if deny {
            build_deny_entry(&key)
        } else {
            build_allow_entry(&key, rec[9], proxy_port)
        };
        if let Ok(entry) = entry {
            assert!(check_pair(&key, &entry).is_ok());
            dump.push(PolicyEntryDump::new(key, entry));
        }
    }

    sort_dump(&mut dump);
    for pair in dump.windows(2) {
        assert!(compare_dump_entries(&pair[0], &pair[1]).is_le());
    }
    for pair in &dump {
        let _ = render_dump_line(pair);
    }
});

/// Arbitrary bytes as a key: must never panic in validation or rendering.
fn raw_pair(rec: &[u8]) {
    let byte = |i: usize| rec.get(i).copied().unwrap_or(0);
    let key = PolicyKey::new(
        u32::from(byte(0)),
        u32::from(byte(1)),
        byte(2),
        byte(3),
        u16::from_be_bytes([byte(4), byte(5)]),
    );
    let entry = PolicyEntry::new(byte(6), byte(7), u16::from(byte(8)), byte(9));
    let _ = validate_key(&key);
    let _ = check_pair(&key, &entry);
    let _ = port_proto_string(&key);
    let _ = render_dump_line(&PolicyEntryDump::new(key, entry));
}
