use domain::common::error::DomainError;
use domain::policy::entity::PolicyEntryDump;
use ebpf_common::policy::{FULL_PREFIX_BITS, PolicyEntry, PolicyKey};

use crate::secondary::policy_map_port::PolicyMapPort;

/// In-memory stand-in for the kernel policy LPM trie.
///
/// Pairs are kept in insertion order. Keys with the same prefix length and
/// the same leading bits name one element, as in the kernel trie: an update
/// replaces the stored pair, key included. `lookup` applies longest-prefix
/// matching over the key data bytes.
#[derive(Debug, Default)]
pub struct InMemoryPolicyMap {
    entries: Vec<PolicyEntryDump>,
    max_entries: Option<usize>,
}

impl InMemoryPolicyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map that rejects inserts of new keys beyond `max_entries`.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: Some(max_entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count one matched packet of `bytes` against the entry the datapath
    /// would select for `key`.
    pub fn record_hit(&mut self, key: &PolicyKey, bytes: u64) -> bool {
        match self.best_match(key) {
            Some(idx) => {
                let entry = &mut self.entries[idx].entry;
                entry.packets += 1;
                entry.bytes += bytes;
                true
            }
            None => false,
        }
    }

    fn position(&self, key: &PolicyKey) -> Option<usize> {
        let wanted = key.data().to_bytes();
        self.entries.iter().position(|d| {
            d.key.prefixlen == key.prefixlen
                && prefix_matches(&d.key.data().to_bytes(), &wanted, key.prefixlen)
        })
    }

    fn best_match(&self, key: &PolicyKey) -> Option<usize> {
        let wanted = key.data().to_bytes();
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, d)| {
                d.key.prefixlen <= key.prefixlen
                    && prefix_matches(&d.key.data().to_bytes(), &wanted, d.key.prefixlen)
            })
            .max_by_key(|(_, d)| d.key.prefixlen)
            .map(|(idx, _)| idx)
    }
}

fn prefix_matches(stored: &[u8; 8], wanted: &[u8; 8], prefixlen: u32) -> bool {
    let prefixlen = prefixlen.min(FULL_PREFIX_BITS);
    let full_bytes = (prefixlen / 8) as usize;
    let rem_bits = prefixlen % 8;
    if stored[..full_bytes] != wanted[..full_bytes] {
        return false;
    }
    if rem_bits == 0 {
        return true;
    }
    let mask = 0xFFu8 << (8 - rem_bits);
    stored[full_bytes] & mask == wanted[full_bytes] & mask
}

impl PolicyMapPort for InMemoryPolicyMap {
    fn update(&mut self, key: &PolicyKey, entry: &PolicyEntry) -> Result<(), DomainError> {
        if let Some(idx) = self.position(key) {
            self.entries[idx] = PolicyEntryDump::new(*key, *entry);
            return Ok(());
        }
        if let Some(max) = self.max_entries
            && self.entries.len() >= max
        {
            return Err(DomainError::EngineError(format!(
                "policy map full ({max} entries)"
            )));
        }
        self.entries.push(PolicyEntryDump::new(*key, *entry));
        Ok(())
    }

    fn delete(&mut self, key: &PolicyKey) -> Result<(), DomainError> {
        let idx = self
            .position(key)
            .ok_or_else(|| DomainError::RuleNotFound(format!("{key:?}")))?;
        self.entries.remove(idx);
        Ok(())
    }

    fn dump(&self) -> Result<Vec<PolicyEntryDump>, DomainError> {
        Ok(self.entries.clone())
    }

    fn lookup(&self, key: &PolicyKey) -> Result<Option<PolicyEntry>, DomainError> {
        Ok(self.best_match(key).map(|idx| self.entries[idx].entry))
    }

    fn delete_all(&mut self) -> Result<usize, DomainError> {
        let count = self.entries.len();
        self.entries.clear();
        Ok(count)
    }
}
