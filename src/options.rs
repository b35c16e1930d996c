//! Validated configuration surface.
//!
//! `Options` is a pure value object; [`Options::validate`] runs every
//! structural rule and returns all violations at once via
//! [`OptionsError::Invalid`] rather than failing on the first one, so a
//! caller can fix a misconfigured replica in a single pass.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::OptionsError;
use crate::folder::FolderLayout;

/// Raft member identity: either a stable node-host id or a network address,
/// depending on the cluster's addressing mode.
pub type MemberTarget = String;

/// Cluster-wide Raft tuning, independent of any single node.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub node_id: u64,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub snapshot_entries_threshold: u64,
    pub snapshot_compaction_overhead: u64,
    /// Members present when starting a brand-new cluster. Empty when
    /// joining an existing one or restarting from persisted state.
    pub initial_members: BTreeMap<u64, MemberTarget>,
    pub is_observer: bool,
    pub is_witness: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: "kvraft".to_string(),
            node_id: 0,
            election_timeout_min_ms: 1_500,
            election_timeout_max_ms: 3_000,
            heartbeat_interval_ms: 500,
            snapshot_entries_threshold: 50_000,
            snapshot_compaction_overhead: 1_000,
            initial_members: BTreeMap::new(),
            is_observer: false,
            is_witness: false,
        }
    }
}

/// Node-host-local configuration: addressing, directories, and transport
/// tunables for the gRPC network layer.
#[derive(Debug, Clone)]
pub struct NodeHostConfig {
    pub raft_address: String,
    pub data_dir: PathBuf,
    pub dir_mode: u32,
    pub gossip_probe_interval: Duration,
    pub deployment_id: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for NodeHostConfig {
    fn default() -> Self {
        Self {
            raft_address: "127.0.0.1:9090".to_string(),
            data_dir: PathBuf::from("./kvraft-data"),
            dir_mode: 0o755,
            gossip_probe_interval: Duration::from_secs(5),
            deployment_id: "default".to_string(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(4),
        }
    }
}

/// Top-level, validated configuration for a replica.
#[derive(Debug, Clone)]
pub struct Options {
    pub node_host: NodeHostConfig,
    pub cluster: ClusterConfig,
    /// Engine tunables passed through to the embedded KV engine.
    pub engine: EngineOptions,
    /// `tracing_subscriber::EnvFilter` directive used once per process by
    /// `logging::init`.
    pub log_filter: String,
}

/// Embedded engine tunables. Field names mirror the concerns the original
/// distilled spec names (segment size, sync, GC, CRC, startup mode) even
/// though `sled` exposes them through its own `Config` builder rather than
/// these exact knobs; validation still rejects nonsensical combinations.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub segment_size_bytes: u64,
    pub sync_on_write: bool,
    pub enable_gc: bool,
    pub verify_crc: bool,
    pub cache_capacity_bytes: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            segment_size_bytes: 512 * 1024 * 1024,
            sync_on_write: true,
            enable_gc: true,
            verify_crc: true,
            cache_capacity_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            node_host: NodeHostConfig::default(),
            cluster: ClusterConfig::default(),
            engine: EngineOptions::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl Options {
    pub fn folder_layout(&self) -> FolderLayout {
        FolderLayout::under(&self.node_host.data_dir)
    }

    /// Runs every structural validation rule, collecting all violations
    /// instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), OptionsError> {
        let mut errors = Vec::new();

        if self.node_host.raft_address.trim().is_empty() {
            errors.push("node_host.raft_address must not be empty".to_string());
        }
        if self.node_host.data_dir.as_os_str().is_empty() {
            errors.push("node_host.data_dir must not be empty".to_string());
        }
        if self.cluster.election_timeout_min_ms >= self.cluster.election_timeout_max_ms {
            errors.push(format!(
                "cluster.election_timeout_min_ms ({}) must be less than election_timeout_max_ms ({})",
                self.cluster.election_timeout_min_ms, self.cluster.election_timeout_max_ms
            ));
        }
        if self.cluster.heartbeat_interval_ms == 0 {
            errors.push("cluster.heartbeat_interval_ms must be greater than zero".to_string());
        }
        if self.cluster.heartbeat_interval_ms * 2 > self.cluster.election_timeout_min_ms {
            errors.push(
                "cluster.heartbeat_interval_ms should be well below election_timeout_min_ms"
                    .to_string(),
            );
        }
        if self.cluster.snapshot_entries_threshold == 0 {
            errors.push("cluster.snapshot_entries_threshold must be greater than zero".to_string());
        }
        if self.cluster.is_witness && self.cluster.is_observer {
            errors.push("cluster.is_witness and cluster.is_observer are mutually exclusive".to_string());
        }
        if (self.cluster.is_witness || self.cluster.is_observer) && !self.cluster.initial_members.is_empty() {
            errors.push(
                "cluster.initial_members must be empty for an observer or witness node: it joins an \
                 existing cluster via NodeHost::add_observer/add_witness instead of self-initializing"
                    .to_string(),
            );
        }
        if !self.cluster.initial_members.is_empty()
            && !self.cluster.initial_members.contains_key(&self.cluster.node_id)
            && self.cluster.node_id != 0
        {
            errors.push(format!(
                "cluster.node_id {} is not present in cluster.initial_members",
                self.cluster.node_id
            ));
        }
        if self.engine.segment_size_bytes == 0 {
            errors.push("engine.segment_size_bytes must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(OptionsError::Invalid(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        let mut opts = Options::default();
        opts.cluster.node_id = 1;
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn collects_multiple_violations() {
        let mut opts = Options::default();
        opts.node_host.raft_address = String::new();
        opts.cluster.election_timeout_min_ms = 5_000;
        opts.cluster.election_timeout_max_ms = 1_000;
        let err = opts.validate().unwrap_err();
        match err {
            OptionsError::Invalid(msgs) => assert_eq!(msgs.len(), 2),
        }
    }

    #[test]
    fn witness_and_observer_conflict() {
        let mut opts = Options::default();
        opts.cluster.node_id = 1;
        opts.cluster.is_witness = true;
        opts.cluster.is_observer = true;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn observer_with_initial_members_is_rejected() {
        let mut opts = Options::default();
        opts.cluster.node_id = 1;
        opts.cluster.is_observer = true;
        opts.cluster.initial_members.insert(1, "127.0.0.1:9090".to_string());
        assert!(opts.validate().is_err());
    }
}
