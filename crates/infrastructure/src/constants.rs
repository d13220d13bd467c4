// ── eBPF ──────────────────────────────────────────────────────────

/// Name of the per-endpoint policy LPM trie in the loaded object.
pub const DEFAULT_POLICY_MAP_NAME: &str = "POLICY_MAP";

// ── Thresholds ─────────────────────────────────────────────────────

/// Fill ratio of the policy map above which config validation warns.
pub const MAP_CAPACITY_WARN_THRESHOLD: f32 = 0.80;
