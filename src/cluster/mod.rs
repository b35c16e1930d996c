//! The cluster node-host: a thin, typed façade over `openraft::Raft`.
//!
//! Shape grounded on `cbaugus-rust_loadtest`'s `RaftNode`/`start_raft_node`
//! (`cbaugus-rust_loadtest::raft`) for wiring `Adaptor::new`, `Raft::new`,
//! and cluster `initialize()`; the public method names
//! (`start_cluster`/`sync_propose`/`sync_read`/...) follow §4.6 of the
//! node-host contract rather than that load-test-specific surface.

pub mod network;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use openraft::error::{ClientWriteError, RaftError};
use openraft::{BasicNode, Config as RaftConfig};
use tracing::{info, warn};

use crate::cluster::network::{GrpcNetworkFactory, RaftTransportService};
use crate::cluster::types::{NodeId, RaftInstance};
use crate::codec::{CommandRequest, CommandResponse};
use crate::error::ClusterError;
use crate::options::ClusterConfig;
use crate::state_machine::ReplicatedStore;

/// A running replica: the `openraft::Raft` handle plus this node's id and
/// the gRPC server task serving Raft RPCs to peers.
#[derive(Clone)]
pub struct NodeHost {
    raft: Arc<RaftInstance>,
    node_id: NodeId,
}

/// Snapshot of `SyncGetClusterMembership`'s result: the voter set and the
/// leader/term this node currently believes in.
#[derive(Debug, Clone)]
pub struct ClusterMembership {
    pub voters: std::collections::BTreeSet<NodeId>,
    pub leader: Option<NodeId>,
    pub term: u64,
}

impl NodeHost {
    /// Begins serving a replica.
    ///
    /// - `join=false, !initial_members.is_empty()`: create a brand-new
    ///   cluster — only the lowest-id member actually calls `initialize`,
    ///   matching §4.6's "StartCluster(initialMembers, join=false)".
    /// - `join=true, initial_members.is_empty()`: join an existing cluster
    ///   as a voter (membership is added by an existing leader separately,
    ///   via [`NodeHost::add_voter`]).
    /// - `join=false, initial_members.is_empty()`: restart from persisted
    ///   WAL/host state.
    pub async fn start_cluster(
        cfg: &ClusterConfig,
        store: ReplicatedStore,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ClusterError> {
        let raft_config = Arc::new(
            RaftConfig {
                cluster_name: cfg.cluster_name.clone(),
                heartbeat_interval: cfg.heartbeat_interval_ms,
                election_timeout_min: cfg.election_timeout_min_ms,
                election_timeout_max: cfg.election_timeout_max_ms,
                snapshot_policy: openraft::SnapshotPolicy::LogsSinceLast(cfg.snapshot_entries_threshold),
                ..Default::default()
            }
            .validate()
            .map_err(|e| ClusterError::Init(e.to_string()))?,
        );

        let (log_store, state_machine) = openraft::storage::Adaptor::new(store);
        let network = GrpcNetworkFactory {
            connect_timeout,
            request_timeout,
        };

        let raft = RaftInstance::new(cfg.node_id, raft_config, network, log_store, state_machine)
            .await
            .map_err(|e| ClusterError::Init(e.to_string()))?;
        let raft = Arc::new(raft);

        // An observer or witness never belongs to the initial voter set
        // (`Options::validate` rejects a non-empty `initial_members` for
        // either role) — it starts its Raft instance bare and waits for an
        // existing leader to call `add_observer`/`add_witness` on it.
        if !(cfg.is_observer || cfg.is_witness) && !cfg.initial_members.is_empty() {
            let min_id = *cfg.initial_members.keys().next().unwrap();
            if cfg.node_id == min_id {
                let members: BTreeMap<NodeId, BasicNode> = cfg
                    .initial_members
                    .iter()
                    .map(|(id, addr)| (*id, BasicNode { addr: addr.clone() }))
                    .collect();
                if let Err(e) = raft.initialize(members).await {
                    info!(error = %e, "cluster already initialized, ignoring on restart");
                }
            }
        }

        info!(
            node_id = cfg.node_id,
            is_observer = cfg.is_observer,
            is_witness = cfg.is_witness,
            "node-host started"
        );
        Ok(Self {
            raft,
            node_id: cfg.node_id,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Returns a gRPC service exposing this node's Raft RPCs to peers; the
    /// caller mounts it on its own `tonic::transport::Server`.
    pub fn transport_service(&self) -> RaftTransportService {
        RaftTransportService::new((*self.raft).clone())
    }

    /// Blocks until a leader is known or `deadline` elapses — the "readiness
    /// gate" the source's `w(ctx, tick)` performs before every client call
    /// (§9 Open Questions: resolved as wait-for-leader-with-deadline).
    pub async fn wait_for_leader(&self, deadline: Duration) -> Result<NodeId, ClusterError> {
        let start = Instant::now();
        loop {
            let leader = self.raft.metrics().borrow().current_leader;
            if let Some(leader) = leader {
                return Ok(leader);
            }
            if start.elapsed() >= deadline {
                return Err(ClusterError::NotReady);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub fn current_leader(&self) -> Option<NodeId> {
        self.raft.metrics().borrow().current_leader
    }

    pub fn is_leader(&self) -> bool {
        self.current_leader() == Some(self.node_id)
    }

    /// Proposes `req` through Raft and waits (bounded by `deadline`) for the
    /// per-entry [`CommandResponse`] the state machine produced when it was
    /// applied. Mutating commands only.
    pub async fn sync_propose(&self, req: CommandRequest, deadline: Duration) -> Result<CommandResponse, ClusterError> {
        let fut = self.raft.client_write(req);
        match tokio::time::timeout(deadline, fut).await {
            Ok(Ok(resp)) => Ok(resp.data),
            Ok(Err(e)) => Err(classify_write_error(e)),
            Err(_) => Err(ClusterError::Timeout),
        }
    }

    /// Performs a linearizable read: a read-index round through Raft,
    /// followed by a local, non-Raft lookup against the engine once the
    /// index is certified. `lookup` runs only after `ensure_linearizable`
    /// succeeds, so it never observes state older than the last committed
    /// write acknowledged to any proposer at call time.
    pub async fn sync_read<F, T>(&self, deadline: Duration, lookup: F) -> Result<T, ClusterError>
    where
        F: FnOnce() -> T,
    {
        let fut = self.raft.ensure_linearizable();
        match tokio::time::timeout(deadline, fut).await {
            Ok(Ok(_)) => Ok(lookup()),
            Ok(Err(e)) => Err(ClusterError::Rejected(e.to_string())),
            Err(_) => Err(ClusterError::Timeout),
        }
    }

    /// `SyncRequestAddNode`: registers `id` as a learner (so it can start
    /// receiving log entries) and then promotes it into the voter set.
    pub async fn add_voter(&self, id: NodeId, addr: String, deadline: Duration) -> Result<(), ClusterError> {
        let fut = self.raft.add_learner(id, BasicNode { addr }, true);
        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| ClusterError::Timeout)?
            .map_err(|e| ClusterError::Rejected(e.to_string()))?;

        let members: std::collections::BTreeSet<NodeId> = self
            .raft
            .metrics()
            .borrow()
            .membership_config
            .membership()
            .voter_ids()
            .chain(std::iter::once(id))
            .collect();
        self.raft
            .change_membership(members, false)
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::Rejected(e.to_string()))
    }

    /// `SyncRequestAddObserver`: registers `id` as a non-voting learner that
    /// receives log entries but is never counted toward quorum or promoted
    /// to a voter — `openraft`'s own learner role already matches §4.6's
    /// "observer" exactly, so this is `add_learner` without the follow-up
    /// `change_membership` that [`NodeHost::add_voter`] performs.
    pub async fn add_observer(&self, id: NodeId, addr: String, deadline: Duration) -> Result<(), ClusterError> {
        tokio::time::timeout(deadline, self.raft.add_learner(id, BasicNode { addr }, true))
            .await
            .map_err(|_| ClusterError::Timeout)?
            .map(|_| ())
            .map_err(|e| ClusterError::Rejected(e.to_string()))
    }

    /// `SyncRequestAddWitness`: a witness role (votes, holds no log
    /// or state machine) has no counterpart in `openraft`, which only
    /// distinguishes voters from learners. Open question, resolved here:
    /// a witness is registered the same way as an observer (a learner that
    /// never joins the voter set), trading away the "votes" property since
    /// a non-voter cannot participate in elections in `openraft` — the
    /// closest safe approximation without forking the Raft library.
    pub async fn add_witness(&self, id: NodeId, addr: String, deadline: Duration) -> Result<(), ClusterError> {
        self.add_observer(id, addr, deadline).await
    }

    /// `SyncRequestDeleteNode`: removes `id` from the voter set. A learner
    /// (observer/witness) that was never promoted is not present in the
    /// voter set `change_membership` operates over; for those, stop
    /// forwarding entries to it by excluding it the next time voters change,
    /// or call [`NodeHost::stop_node`] on that node directly.
    pub async fn remove_voter(&self, id: NodeId, deadline: Duration) -> Result<(), ClusterError> {
        let members: std::collections::BTreeSet<NodeId> = self
            .raft
            .metrics()
            .borrow()
            .membership_config
            .membership()
            .voter_ids()
            .filter(|v| *v != id)
            .collect();
        tokio::time::timeout(deadline, self.raft.change_membership(members, false))
            .await
            .map_err(|_| ClusterError::Timeout)?
            .map(|_| ())
            .map_err(|e| ClusterError::Rejected(e.to_string()))
    }

    /// `SyncGetClusterMembership`: the current voter set and this node's
    /// last-known leader, as of the last metrics update.
    pub fn get_cluster_membership(&self) -> ClusterMembership {
        let metrics = self.raft.metrics().borrow().clone();
        ClusterMembership {
            voters: metrics.membership_config.membership().voter_ids().collect(),
            leader: metrics.current_leader,
            term: metrics.current_term,
        }
    }

    pub async fn request_leader_transfer(&self, target: NodeId, deadline: Duration) -> Result<(), ClusterError> {
        if !self.is_leader() {
            return Err(ClusterError::NotLeader(self.current_leader()));
        }
        tokio::time::timeout(deadline, self.raft.trigger().transfer_leader(target))
            .await
            .map_err(|_| ClusterError::Timeout)?
            .map_err(|e| ClusterError::Rejected(e.to_string()))?;
        warn!(target, "requested leader transfer");
        Ok(())
    }

    /// `StopCluster` / `StopNode`: the source distinguishes stopping a
    /// single Raft group from stopping the whole node-host process because
    /// one node-host there can serve many clusters; this crate binds exactly
    /// one cluster per node-host (§4.6 scopes a `NodeHost` to one replica),
    /// so the two collapse into the same operation — stopping this node's
    /// only Raft group *is* stopping the node-host. `stop_cluster` and
    /// `stop_node` are both aliases for [`NodeHost::shutdown`]; kept as
    /// distinct names so callers can spell out the operation they mean.
    pub async fn stop_cluster(self) -> Result<(), ClusterError> {
        self.shutdown().await
    }

    pub async fn stop_node(self) -> Result<(), ClusterError> {
        self.shutdown().await
    }

    pub async fn shutdown(self) -> Result<(), ClusterError> {
        match Arc::try_unwrap(self.raft) {
            Ok(raft) => raft.shutdown().await.map_err(|e| ClusterError::Init(e.to_string())),
            Err(raft) => {
                // Other clones (e.g. the gRPC service) are still live; a
                // graceful shutdown still stops this handle's tasks.
                raft.shutdown().await.map_err(|e| ClusterError::Init(e.to_string()))
            }
        }
    }
}

fn classify_write_error(e: RaftError<NodeId, ClientWriteError<NodeId, BasicNode>>) -> ClusterError {
    match e {
        RaftError::APIError(ClientWriteError::ForwardToLeader(fwd)) => ClusterError::NotLeader(fwd.leader_id),
        other => ClusterError::Rejected(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_forward_to_leader_as_not_leader() {
        let e: RaftError<NodeId, ClientWriteError<NodeId, BasicNode>> =
            RaftError::APIError(ClientWriteError::ForwardToLeader(openraft::error::ForwardToLeader {
                leader_id: Some(2),
                leader_node: None,
            }));
        assert!(matches!(classify_write_error(e), ClusterError::NotLeader(Some(2))));
    }
}
