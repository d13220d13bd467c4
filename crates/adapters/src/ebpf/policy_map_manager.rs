use aya::Ebpf;
use aya::maps::MapData;
use aya::maps::MapError;
use aya::maps::lpm_trie::{Key, LpmTrie};
use domain::common::error::DomainError;
use domain::policy::entity::PolicyEntryDump;
use ebpf_common::policy::{PolicyEntry, PolicyKey, PolicyKeyData};
use ports::secondary::policy_map_port::PolicyMapPort;
use tracing::{debug, info};

/// Manages one endpoint's policy `LpmTrie`.
///
/// The trie key is `Key<PolicyKeyData>`: the aya key carries the prefix
/// length, the data carries identity, direction, protocol and port.
pub struct PolicyMapManager {
    trie: LpmTrie<MapData, PolicyKeyData, PolicyEntry>,
    map_name: String,
}

impl PolicyMapManager {
    /// Take ownership of the policy map `map_name` from the loaded program.
    pub fn new(ebpf: &mut Ebpf, map_name: &str) -> Result<Self, anyhow::Error> {
        let trie = LpmTrie::try_from(
            ebpf.take_map(map_name)
                .ok_or_else(|| anyhow::anyhow!("map '{map_name}' not found"))?,
        )?;

        info!(map = map_name, "policy map acquired");
        Ok(Self {
            trie,
            map_name: map_name.to_string(),
        })
    }
}

fn to_trie_key(key: &PolicyKey) -> Key<PolicyKeyData> {
    Key::new(key.prefixlen, key.data())
}

fn from_trie_key(key: &Key<PolicyKeyData>) -> PolicyKey {
    PolicyKey::from_data(key.prefix_len(), key.data())
}

impl PolicyMapPort for PolicyMapManager {
    fn update(&mut self, key: &PolicyKey, entry: &PolicyEntry) -> Result<(), DomainError> {
        self.trie
            .insert(&to_trie_key(key), *entry, 0)
            .map_err(|e| {
                DomainError::EngineError(format!("{} insert failed: {e}", self.map_name))
            })?;
        debug!(
            identity = key.identity,
            prefixlen = key.prefixlen,
            "policy map entry written"
        );
        Ok(())
    }

    fn delete(&mut self, key: &PolicyKey) -> Result<(), DomainError> {
        match self.trie.remove(&to_trie_key(key)) {
            Ok(()) => Ok(()),
            Err(MapError::KeyNotFound) => Err(DomainError::RuleNotFound(format!(
                "identity={} prefixlen={}",
                key.identity, key.prefixlen
            ))),
            Err(e) => Err(DomainError::EngineError(format!(
                "{} remove failed: {e}",
                self.map_name
            ))),
        }
    }

    fn dump(&self) -> Result<Vec<PolicyEntryDump>, DomainError> {
        self.trie
            .iter()
            .map(|item| {
                item.map(|(k, v)| PolicyEntryDump::new(from_trie_key(&k), v))
                    .map_err(|e| {
                        DomainError::EngineError(format!("{} iteration failed: {e}", self.map_name))
                    })
            })
            .collect()
    }

    fn lookup(&self, key: &PolicyKey) -> Result<Option<PolicyEntry>, DomainError> {
        match self.trie.get(&to_trie_key(key), 0) {
            Ok(entry) => Ok(Some(entry)),
            Err(MapError::KeyNotFound) => Ok(None),
            Err(e) => Err(DomainError::EngineError(format!(
                "{} lookup failed: {e}",
                self.map_name
            ))),
        }
    }

    fn delete_all(&mut self) -> Result<usize, DomainError> {
        let keys: Vec<Key<PolicyKeyData>> = self.trie.keys().filter_map(Result::ok).collect();
        for key in &keys {
            self.trie.remove(key).map_err(|e| {
                DomainError::EngineError(format!("{} remove failed: {e}", self.map_name))
            })?;
        }
        info!(map = %self.map_name, count = keys.len(), "policy map cleared");
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebpf_common::policy::{FULL_PREFIX_BITS, STATIC_PREFIX_BITS};

    #[test]
    fn trie_key_carries_prefix_and_data() {
        let key = PolicyKey::new(FULL_PREFIX_BITS, 42, 1, 6, 8080);
        let trie_key = to_trie_key(&key);
        assert_eq!(trie_key.prefix_len(), FULL_PREFIX_BITS);
        assert_eq!(trie_key.data(), key.data());
        assert_eq!(from_trie_key(&trie_key), key);
    }

    #[test]
    fn trie_key_keeps_wildcarded_port_bits() {
        let key = PolicyKey::new(STATIC_PREFIX_BITS, 7, 0, 0, 0);
        assert_eq!(from_trie_key(&to_trie_key(&key)), key);
    }
}
