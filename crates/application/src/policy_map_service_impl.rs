use domain::common::error::DomainError;
use domain::policy::engine::{PolicyMapDiff, PolicyMapState};
use domain::policy::entity::{PolicyEntryDump, PolicyRule};
use domain::policy::ordering::sort_dump_by_key;
use domain::policy::render::render_dump_line;
use ebpf_common::policy::PolicyKey;
use ports::secondary::policy_map_port::PolicyMapPort;

/// Outcome of one reconcile pass against the kernel map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub updated: usize,
    pub deleted: usize,
}

/// Application-level policy map service.
///
/// Owns the desired map state and pushes it to the kernel map through the
/// port. Every mutation is followed by a diff-based sync; sync failures on
/// mutation are logged and retried by the next `sync`.
pub struct PolicyMapAppService {
    state: PolicyMapState,
    map_port: Option<Box<dyn PolicyMapPort + Send>>,
}

impl PolicyMapAppService {
    pub fn new(state: PolicyMapState, map_port: Option<Box<dyn PolicyMapPort + Send>>) -> Self {
        Self { state, map_port }
    }

    /// Wire the kernel map once the eBPF programs are loaded.
    pub fn set_map_port(&mut self, port: Box<dyn PolicyMapPort + Send>) {
        self.map_port = Some(port);
    }

    pub fn state(&self) -> &PolicyMapState {
        &self.state
    }

    pub fn entry_count(&self) -> usize {
        self.state.len()
    }

    pub fn allow(
        &mut self,
        key: PolicyKey,
        auth_type: u8,
        proxy_port: u16,
    ) -> Result<(), DomainError> {
        self.state.allow(key, auth_type, proxy_port)?;
        tracing::debug!(
            identity = key.identity,
            prefixlen = key.prefixlen,
            auth_type,
            proxy_port,
            "policy allow entry added"
        );
        self.sync_ebpf_map();
        Ok(())
    }

    pub fn deny(&mut self, key: PolicyKey) -> Result<(), DomainError> {
        self.state.deny(key)?;
        tracing::debug!(
            identity = key.identity,
            prefixlen = key.prefixlen,
            "policy deny entry added"
        );
        self.sync_ebpf_map();
        Ok(())
    }

    pub fn remove(&mut self, key: &PolicyKey) -> Result<(), DomainError> {
        self.state.remove(key)?;
        tracing::debug!(
            identity = key.identity,
            prefixlen = key.prefixlen,
            "policy entry removed"
        );
        self.sync_ebpf_map();
        Ok(())
    }

    /// Replace the desired state from rules. On error the previous state and
    /// the kernel map are left untouched.
    pub fn reload_rules(&mut self, rules: &[PolicyRule]) -> Result<(), DomainError> {
        self.state.reload(rules)?;
        tracing::info!(
            rules = rules.len(),
            entries = self.state.len(),
            "policy map rules reloaded"
        );
        self.sync_ebpf_map();
        Ok(())
    }

    /// Pending changes between the desired state and the kernel map.
    pub fn pending_diff(&self) -> Result<PolicyMapDiff, DomainError> {
        let Some(ref map) = self.map_port else {
            return Ok(PolicyMapDiff::default());
        };
        Ok(self.state.diff(&map.dump()?))
    }

    /// Reconcile the kernel map with the desired state.
    ///
    /// Writes go in before stale keys are removed, so traffic covered by a
    /// surviving entry never falls through to a less specific one.
    pub fn sync(&mut self) -> Result<SyncStats, DomainError> {
        let Some(ref mut map) = self.map_port else {
            return Ok(SyncStats::default());
        };

        let diff = self.state.diff(&map.dump()?);
        if diff.is_empty() {
            return Ok(SyncStats::default());
        }

        for pair in &diff.to_update {
            map.update(&pair.key, &pair.entry)?;
        }
        for key in &diff.to_delete {
            map.delete(key)?;
        }

        let stats = SyncStats {
            updated: diff.to_update.len(),
            deleted: diff.to_delete.len(),
        };
        tracing::info!(
            updated = stats.updated,
            deleted = stats.deleted,
            "policy map synchronised"
        );
        Ok(stats)
    }

    /// Map contents in presentation order. Reads the kernel map when one is
    /// wired, the desired state otherwise. Both sources sort the same way.
    pub fn dump_sorted(&self) -> Result<Vec<PolicyEntryDump>, DomainError> {
        let mut dump = match self.map_port {
            Some(ref map) => map.dump()?,
            None => self.state.to_dump(),
        };
        sort_dump_by_key(&mut dump);
        Ok(dump)
    }

    pub fn render_dump(&self) -> Result<Vec<String>, DomainError> {
        Ok(self.dump_sorted()?.iter().map(render_dump_line).collect())
    }

    fn sync_ebpf_map(&mut self) {
        if let Err(e) = self.sync() {
            tracing::warn!("failed to sync policy map: {e}");
        }
    }
}
