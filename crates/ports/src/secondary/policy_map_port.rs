use domain::common::error::DomainError;
use domain::policy::entity::PolicyEntryDump;
use ebpf_common::policy::{PolicyEntry, PolicyKey};

/// Secondary port for the per-endpoint policy LPM map.
///
/// Keys and entries arrive already encoded; implementations only move
/// them in and out of the map.
///
/// Implemented by `PolicyMapManager` in the adapter layer.
pub trait PolicyMapPort: Send + Sync {
    /// Insert or overwrite the entry stored under `key`.
    fn update(&mut self, key: &PolicyKey, entry: &PolicyEntry) -> Result<(), DomainError>;

    /// Remove the entry stored under exactly `key`.
    fn delete(&mut self, key: &PolicyKey) -> Result<(), DomainError>;

    /// Every pair currently in the map, counters included, in map order.
    fn dump(&self) -> Result<Vec<PolicyEntryDump>, DomainError>;

    /// Longest-prefix match of a fully specified key, as the datapath would
    /// resolve it.
    fn lookup(&self, key: &PolicyKey) -> Result<Option<PolicyEntry>, DomainError>;

    /// Remove every entry. Returns how many were deleted.
    fn delete_all(&mut self) -> Result<usize, DomainError>;
}
