use std::collections::HashMap;

use ebpf_common::policy::{MAX_POLICY_ENTRIES, PolicyEntry, PolicyKey};

use super::codec;
use super::entity::{PolicyEntryDump, PolicyRule, TrafficDirection};
use super::error::PolicyError;
use super::ordering::{key_order, sort_dump_by_key};
use super::render::port_proto_string;

/// Desired contents of one endpoint's policy map.
///
/// Pairs are indexed by `PolicyKey::canonical`, so keys that differ only in
/// bits past their prefix share one slot, as they share one trie node. The
/// stored pair keeps the key it was inserted with. Every stored pair has
/// passed `codec::check_pair`. Counters are never stored: they belong to the
/// datapath.
#[derive(Debug, Clone)]
pub struct PolicyMapState {
    entries: HashMap<PolicyKey, PolicyEntryDump>,
    max_entries: usize,
}

/// Writes and deletions that turn a dumped map into the desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyMapDiff {
    pub to_update: Vec<PolicyEntryDump>,
    pub to_delete: Vec<PolicyKey>,
}

impl PolicyMapDiff {
    pub fn is_empty(&self) -> bool {
        self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

impl PolicyMapState {
    pub fn new() -> Self {
        Self::with_max_entries(usize::try_from(MAX_POLICY_ENTRIES).unwrap_or(usize::MAX))
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
        }
    }

    /// Insert a pre-built pair.
    ///
    /// A deny already stored for the same trie node wins over an incoming
    /// allow; an incoming deny replaces whatever was stored.
    pub fn insert(&mut self, pair: PolicyEntryDump) -> Result<(), PolicyError> {
        codec::check_pair(&pair.key, &pair.entry)?;

        let slot = pair.key.canonical();
        match self.entries.get(&slot) {
            Some(existing) if existing.is_deny() && !pair.is_deny() => return Ok(()),
            Some(_) => {}
            None if self.entries.len() >= self.max_entries => {
                return Err(PolicyError::MapFull {
                    max: self.max_entries,
                });
            }
            None => {}
        }

        self.entries.insert(
            slot,
            PolicyEntryDump::new(pair.key, pair.entry.without_counters()),
        );
        Ok(())
    }

    pub fn allow(
        &mut self,
        key: PolicyKey,
        auth_type: u8,
        proxy_port: u16,
    ) -> Result<(), PolicyError> {
        let entry = codec::build_allow_entry(&key, auth_type, proxy_port)?;
        self.insert(PolicyEntryDump::new(key, entry))
    }

    pub fn deny(&mut self, key: PolicyKey) -> Result<(), PolicyError> {
        let entry = codec::build_deny_entry(&key)?;
        self.insert(PolicyEntryDump::new(key, entry))
    }

    pub fn remove(&mut self, key: &PolicyKey) -> Result<PolicyEntry, PolicyError> {
        self.entries
            .remove(&key.canonical())
            .map(|pair| pair.entry)
            .ok_or_else(|| PolicyError::EntryNotFound {
                key: describe_key(key),
            })
    }

    /// Replace the whole state from rules. Nothing changes if any rule fails.
    pub fn reload(&mut self, rules: &[PolicyRule]) -> Result<(), PolicyError> {
        let mut next = Self::with_max_entries(self.max_entries);
        for rule in rules {
            next.insert(rule.to_map_pair()?)?;
        }
        *self = next;
        Ok(())
    }

    /// Entry stored for the trie node `key` names.
    pub fn get(&self, key: &PolicyKey) -> Option<&PolicyEntry> {
        self.entries.get(&key.canonical()).map(|pair| &pair.entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// All pairs in presentation order, one per trie node.
    pub fn to_dump(&self) -> Vec<PolicyEntryDump> {
        let mut dump: Vec<PolicyEntryDump> = self.entries.values().copied().collect();
        sort_dump_by_key(&mut dump);
        dump
    }

    /// Compare against pairs dumped from the map.
    ///
    /// Dumped keys are matched by trie node. Stale nodes are deleted through
    /// the key the map reported for them.
    pub fn diff(&self, dumped: &[PolicyEntryDump]) -> PolicyMapDiff {
        let current: HashMap<PolicyKey, PolicyEntryDump> = dumped
            .iter()
            .map(|d| {
                (
                    d.key.canonical(),
                    PolicyEntryDump::new(d.key, d.entry.without_counters()),
                )
            })
            .collect();

        let to_update = self
            .to_dump()
            .into_iter()
            .filter(|d| current.get(&d.key.canonical()).map(|c| c.entry) != Some(d.entry))
            .collect();

        let mut to_delete: Vec<PolicyKey> = current
            .iter()
            .filter(|(slot, _)| !self.entries.contains_key(slot))
            .map(|(_, d)| d.key)
            .collect();
        to_delete.sort_by_key(key_order);

        PolicyMapDiff {
            to_update,
            to_delete,
        }
    }
}

impl Default for PolicyMapState {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_key(key: &PolicyKey) -> String {
    let direction = TrafficDirection::from_u8(key.traffic_direction)
        .map_or("Unknown", TrafficDirection::as_str);
    format!(
        "{direction} identity={} {}",
        key.identity,
        port_proto_string(key)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::entity::Protocol;
    use crate::policy::entity::{PolicyAction, PolicyVerdict};

    fn tcp_key(identity: u32, port: u16) -> PolicyKey {
        codec::build_key(TrafficDirection::Ingress, identity, Protocol::Tcp, port, 16).unwrap()
    }

    fn rule(identity: u32, port: u16, action: PolicyAction) -> PolicyRule {
        PolicyRule {
            identity,
            direction: TrafficDirection::Egress,
            protocol: Protocol::Udp,
            port,
            port_prefix_len: if port == 0 { 0 } else { 16 },
            action,
            auth_type: 0,
            proxy_port: 0,
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    #[test]
    fn new_state_is_empty() {
        let state = PolicyMapState::new();
        assert!(state.is_empty());
        assert_eq!(state.max_entries(), 16_384);
    }

    #[test]
    fn allow_then_get() {
        let mut state = PolicyMapState::new();
        let key = tcp_key(42, 80);
        state.allow(key, 0, 15001).unwrap();
        let entry = state.get(&key).unwrap();
        assert_eq!(entry.proxy_port(), 15001);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn insert_rejects_bad_pair() {
        let mut state = PolicyMapState::new();
        let key = tcp_key(1, 80);
        let mut entry = codec::build_allow_entry(&key, 0, 0).unwrap();
        entry.lpm_prefix_length = 3;
        assert!(matches!(
            state.insert(PolicyEntryDump::new(key, entry)),
            Err(PolicyError::PrefixLengthMismatch { .. })
        ));
        assert!(state.is_empty());
    }

    #[test]
    fn insert_drops_counters() {
        let mut state = PolicyMapState::new();
        let key = tcp_key(1, 80);
        let mut entry = codec::build_allow_entry(&key, 0, 0).unwrap();
        entry.packets = 9;
        entry.bytes = 900;
        state.insert(PolicyEntryDump::new(key, entry)).unwrap();
        assert_eq!(state.get(&key).unwrap().packets, 0);
    }

    // ── Deny precedence ────────────────────────────────────────────

    #[test]
    fn allow_does_not_override_deny() {
        let mut state = PolicyMapState::new();
        let key = tcp_key(7, 443);
        state.deny(key).unwrap();
        state.allow(key, 1, 0).unwrap();
        assert!(state.get(&key).unwrap().is_deny());
    }

    #[test]
    fn deny_overrides_allow() {
        let mut state = PolicyMapState::new();
        let key = tcp_key(7, 443);
        state.allow(key, 0, 15001).unwrap();
        state.deny(key).unwrap();
        let entry = state.get(&key).unwrap();
        assert!(entry.is_deny());
        assert_eq!(entry.proxy_port(), 0);
    }

    #[test]
    fn allow_replaces_allow() {
        let mut state = PolicyMapState::new();
        let key = tcp_key(7, 443);
        state.allow(key, 0, 0).unwrap();
        state.allow(key, 2, 0).unwrap();
        assert_eq!(state.get(&key).unwrap().auth_type, 2);
    }

    // ── Capacity ───────────────────────────────────────────────────

    #[test]
    fn full_map_rejects_new_keys() {
        let mut state = PolicyMapState::with_max_entries(1);
        state.allow(tcp_key(1, 80), 0, 0).unwrap();
        assert_eq!(
            state.allow(tcp_key(2, 80), 0, 0),
            Err(PolicyError::MapFull { max: 1 })
        );
    }

    #[test]
    fn full_map_accepts_existing_key() {
        let mut state = PolicyMapState::with_max_entries(1);
        state.allow(tcp_key(1, 80), 0, 0).unwrap();
        state.deny(tcp_key(1, 80)).unwrap();
        assert_eq!(state.len(), 1);
    }

    // ── Remove / reload ────────────────────────────────────────────

    #[test]
    fn remove_existing_and_missing() {
        let mut state = PolicyMapState::new();
        let key = tcp_key(3, 22);
        state.deny(key).unwrap();
        assert!(state.remove(&key).unwrap().is_deny());

        let err = state.remove(&key).unwrap_err();
        assert_eq!(
            err,
            PolicyError::EntryNotFound {
                key: "Ingress identity=3 22/TCP".to_string()
            }
        );
    }

    #[test]
    fn reload_replaces_state() {
        let mut state = PolicyMapState::new();
        state.allow(tcp_key(1, 80), 0, 0).unwrap();
        state
            .reload(&[rule(5, 53, PolicyAction::Allow), rule(5, 0, PolicyAction::Deny)])
            .unwrap();
        assert_eq!(state.len(), 2);
        assert!(state.get(&tcp_key(1, 80)).is_none());
    }

    #[test]
    fn reload_failure_keeps_previous_state() {
        let mut state = PolicyMapState::new();
        state.allow(tcp_key(1, 80), 0, 0).unwrap();
        let mut bad = rule(5, 53, PolicyAction::Deny);
        bad.proxy_port = 15001;
        assert!(state.reload(&[rule(6, 53, PolicyAction::Allow), bad]).is_err());
        assert_eq!(state.len(), 1);
        assert!(state.get(&tcp_key(1, 80)).is_some());
    }

    #[test]
    fn reload_applies_deny_precedence_across_rules() {
        let mut state = PolicyMapState::new();
        state
            .reload(&[rule(5, 53, PolicyAction::Deny), rule(5, 53, PolicyAction::Allow)])
            .unwrap();
        let dump = state.to_dump();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].verdict(), PolicyVerdict::Deny);
    }

    // ── Dump / diff ────────────────────────────────────────────────

    #[test]
    fn to_dump_is_sorted() {
        let mut state = PolicyMapState::new();
        state.allow(tcp_key(9, 80), 0, 0).unwrap();
        state.allow(tcp_key(1, 443), 0, 0).unwrap();
        state.deny(tcp_key(1, 80)).unwrap();

        let ids: Vec<(u32, u16, bool)> = state
            .to_dump()
            .iter()
            .map(|d| (d.key.identity, d.key.dest_port(), d.is_deny()))
            .collect();
        assert_eq!(ids, vec![(1, 80, true), (1, 443, false), (9, 80, false)]);
    }

    #[test]
    fn diff_against_empty_map_writes_everything() {
        let mut state = PolicyMapState::new();
        state.allow(tcp_key(1, 80), 0, 0).unwrap();
        state.deny(tcp_key(2, 80)).unwrap();
        let diff = state.diff(&[]);
        assert_eq!(diff.to_update.len(), 2);
        assert!(diff.to_delete.is_empty());
    }

    #[test]
    fn diff_ignores_counters() {
        let mut state = PolicyMapState::new();
        state.allow(tcp_key(1, 80), 0, 0).unwrap();
        let mut dumped = state.to_dump();
        dumped[0].entry.packets = 100;
        dumped[0].entry.bytes = 6400;
        assert!(state.diff(&dumped).is_empty());
    }

    #[test]
    fn diff_reports_changed_and_stale() {
        let mut state = PolicyMapState::new();
        state.deny(tcp_key(1, 80)).unwrap();

        let stale = tcp_key(2, 8080);
        let k = tcp_key(1, 80);
        let dumped = vec![
            PolicyEntryDump::new(k, codec::build_allow_entry(&k, 0, 0).unwrap()),
            PolicyEntryDump::new(stale, codec::build_allow_entry(&stale, 0, 0).unwrap()),
        ];

        let diff = state.diff(&dumped);
        assert_eq!(diff.to_update.len(), 1);
        assert!(diff.to_update[0].is_deny());
        assert_eq!(diff.to_delete, vec![stale]);
    }

    // ── Same trie node through different keys ──────────────────────

    fn tcp_range(identity: u32, port: u16) -> PolicyKey {
        codec::build_key(TrafficDirection::Ingress, identity, Protocol::Tcp, port, 10).unwrap()
    }

    #[test]
    fn deny_wins_over_allow_on_same_node() {
        let mut state = PolicyMapState::new();
        // 81/10 and 80/10 both cover 64-127.
        state.deny(tcp_range(5, 81)).unwrap();
        state.allow(tcp_range(5, 80), 0, 0).unwrap();

        assert_eq!(state.len(), 1);
        assert!(state.get(&tcp_range(5, 80)).unwrap().is_deny());
        let dump = state.to_dump();
        assert_eq!(dump.len(), 1);
        assert!(dump[0].is_deny());
        assert_eq!(dump[0].key.dest_port(), 81);

        let diff = state.diff(&[]);
        assert_eq!(diff.to_update.len(), 1);
        assert!(diff.to_update[0].is_deny());
    }

    #[test]
    fn deny_replaces_allow_on_same_node() {
        let mut state = PolicyMapState::new();
        state.allow(tcp_range(5, 80), 0, 15001).unwrap();
        state.deny(tcp_range(5, 100)).unwrap();

        assert_eq!(state.len(), 1);
        let dump = state.to_dump();
        assert!(dump[0].is_deny());
        assert_eq!(dump[0].key.dest_port(), 100);
    }

    #[test]
    fn remove_through_sibling_key() {
        let mut state = PolicyMapState::new();
        state.deny(tcp_range(5, 81)).unwrap();
        assert!(state.remove(&tcp_range(5, 127)).unwrap().is_deny());
        assert!(state.is_empty());
    }

    #[test]
    fn full_map_accepts_sibling_key() {
        let mut state = PolicyMapState::with_max_entries(1);
        state.allow(tcp_range(5, 80), 0, 0).unwrap();
        state.deny(tcp_range(5, 90)).unwrap();
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn diff_matches_dumped_sibling_key() {
        let mut state = PolicyMapState::new();
        state.deny(tcp_range(5, 81)).unwrap();

        // The map reports the node under another key covering the same range.
        let dumped_key = tcp_range(5, 64);
        let dumped = vec![PolicyEntryDump::new(
            dumped_key,
            codec::build_deny_entry(&dumped_key).unwrap(),
        )];
        assert!(state.diff(&dumped).is_empty());

        state.remove(&dumped_key).unwrap();
        assert_eq!(state.diff(&dumped).to_delete, vec![dumped_key]);
    }
}
