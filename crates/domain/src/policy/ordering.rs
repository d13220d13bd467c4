use std::cmp::Ordering;

use ebpf_common::policy::PolicyKey;

use super::entity::PolicyEntryDump;

/// Presentation order for dumped policy entries: identity ascending, then
/// traffic direction (ingress before egress), then deny before allow.
///
/// Only those three criteria participate. Pairs that tie on all of them
/// compare equal, so `sort_dump` keeps their input order. This ordering has
/// no effect on which entry the datapath selects for a packet.
pub fn compare_dump_entries(a: &PolicyEntryDump, b: &PolicyEntryDump) -> Ordering {
    a.key
        .identity
        .cmp(&b.key.identity)
        .then(a.key.traffic_direction.cmp(&b.key.traffic_direction))
        .then_with(|| b.entry.is_deny().cmp(&a.entry.is_deny()))
}

/// Strict "sorts before" relation derived from `compare_dump_entries`.
pub fn dump_less(a: &PolicyEntryDump, b: &PolicyEntryDump) -> bool {
    compare_dump_entries(a, b) == Ordering::Less
}

/// Stable in-place sort of a dumped batch.
pub fn sort_dump(entries: &mut [PolicyEntryDump]) {
    entries.sort_by(compare_dump_entries);
}

/// Sort a batch into presentation order with comparator ties broken by the
/// key, so the result does not depend on where the batch came from.
pub fn sort_dump_by_key(entries: &mut [PolicyEntryDump]) {
    entries.sort_by_key(|d| key_order(&d.key));
    sort_dump(entries);
}

/// Total order over trie nodes: identity, direction, prefix length, then the
/// protocol and port bits the prefix covers.
pub fn key_order(key: &PolicyKey) -> (u32, u8, u32, u8, u16) {
    let key = key.canonical();
    (
        key.identity,
        key.traffic_direction,
        key.prefixlen,
        key.nexthdr,
        key.dest_port(),
    )
}
