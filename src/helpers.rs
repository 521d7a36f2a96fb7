use std::time::Duration;

use sha2::{Digest, Sha256};

// ── Operator configuration (injected via CLI flags / env) ─────────────────────

/// Process-wide settings injected at startup via CLI flags.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Image running the backup and restore tooling inside Jobs.
    pub tools_image: String,
    /// Repository of the Aerospike server image; the tag is the cluster version.
    pub aerospike_image_repo: String,
    /// How long the migration gate waits before failing the pass.
    pub migration_timeout: Duration,
    /// Interval between two migration-status polls.
    pub migration_poll_interval: Duration,
    /// Failed passes per key before the key is dropped from the queue.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            tools_image: "quay.io/travelaudience/aerospike-operator-tools:latest".into(),
            aerospike_image_repo: "aerospike/aerospike-server".into(),
            migration_timeout: Duration::from_secs(60 * 60),
            migration_poll_interval: Duration::from_secs(5),
            max_retries: 15,
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_secs(300),
        }
    }
}

// ── Naming helpers ────────────────────────────────────────────────────────────

/// Maximum length of a DNS-1123 label, which bounds Job and Pod names.
pub const MAX_NAME_LENGTH: usize = 63;

/// SHA-256 hash of a string, returned as hex.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Derive the Job name for a backup or restore request.
///
/// The result is a pure function of its inputs: `<name>-<action>-<hash>`, where
/// `hash` is the first 8 hex chars of the SHA-256 of the request UID.  The name
/// part is shortened so the whole fits in a DNS label.
pub fn job_name(action: &str, name: &str, uid: &str) -> String {
    let hash = &sha256_hex(uid)[..8];
    let suffix = format!("-{action}-{hash}");
    let room = MAX_NAME_LENGTH.saturating_sub(suffix.len());
    let prefix: String = name.chars().take(room).collect();
    format!("{}{suffix}", prefix.trim_end_matches('-'))
}

/// Name of the member pod with the given ordinal.
pub fn pod_name(cluster: &str, ordinal: u32) -> String {
    format!("{cluster}-{ordinal}")
}

/// Name of the client-facing service of a cluster.
pub fn client_service_name(cluster: &str) -> String {
    cluster.to_string()
}

/// Name of the headless service used for mesh heartbeats.
pub fn discovery_service_name(cluster: &str) -> String {
    format!("{cluster}-discovery")
}
