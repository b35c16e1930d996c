//! gRPC transport for `openraft`'s `AppendEntries`/`Vote`/`InstallSnapshot`
//! RPCs.
//!
//! `openraft` does not ship a transport, so the core owns a small `tonic`
//! service (`proto::raft_transport_client` / `_server`, generated from
//! `proto/kvraft.proto`) that carries the library's own request/response
//! types as JSON bytes in a `payload` field. Grounded directly on the
//! `GrpcNetwork`/`GrpcNetworkFactory` pattern in `cbaugus-rust_loadtest`.
//!
//! `openraft`'s network traits use plain `async fn` (return-position impl
//! Trait in Trait), not `#[async_trait]` — implementations below must match
//! that signature style exactly.

use std::time::Duration;

use openraft::error::{InstallSnapshotError, RPCError, RaftError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::{AnyError, BasicNode};
use tonic::transport::{Channel, Endpoint};

use crate::cluster::types::{NodeId, TypeConfig};

pub mod proto {
    tonic::include_proto!("kvraft");
}

use proto::raft_transport_client::RaftTransportClient;
use proto::{AppendEntriesEnvelope, SnapshotEnvelope, VoteEnvelope};

/// Per-peer gRPC channel implementing `openraft::RaftNetwork`.
pub struct GrpcNetwork {
    target_addr: String,
    client: Option<RaftTransportClient<Channel>>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl GrpcNetwork {
    fn get_client(&mut self) -> Result<&mut RaftTransportClient<Channel>, String> {
        if self.client.is_none() {
            let uri = if self.target_addr.starts_with("http") {
                self.target_addr.clone()
            } else {
                format!("http://{}", self.target_addr)
            };
            // connect_lazy defers the handshake to the first RPC and
            // reconnects automatically on failure, so a peer that hasn't
            // started yet doesn't block node-host startup.
            let ch = Endpoint::from_shared(uri)
                .map_err(|e| e.to_string())?
                .connect_timeout(self.connect_timeout)
                .timeout(self.request_timeout)
                .connect_lazy();
            self.client = Some(RaftTransportClient::new(ch));
        }
        Ok(self.client.as_mut().unwrap())
    }
}

fn unreachable(msg: impl std::fmt::Display) -> Unreachable {
    Unreachable::new(&AnyError::error(msg.to_string()))
}

impl RaftNetwork<TypeConfig> for GrpcNetwork {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        let payload = serde_json::to_vec(&rpc).map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        let term = rpc.vote.leader_id().term;
        let leader = rpc.vote.leader_id().node_id.to_string();

        let client = self.get_client().map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        let resp = client
            .append_entries(AppendEntriesEnvelope {
                term,
                leader_id: leader,
                payload,
            })
            .await
            .map_err(|e| RPCError::Unreachable(unreachable(e)))?;

        serde_json::from_slice(&resp.into_inner().payload)
            .map_err(|e| RPCError::Unreachable(unreachable(e)))
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        _option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        let payload = serde_json::to_vec(&rpc).map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        let term = rpc.vote.leader_id().term;
        let candidate = rpc.vote.leader_id().node_id.to_string();

        let client = self.get_client().map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        let resp = client
            .request_vote(VoteEnvelope {
                term,
                candidate_id: candidate,
                payload,
            })
            .await
            .map_err(|e| RPCError::Unreachable(unreachable(e)))?;

        serde_json::from_slice(&resp.into_inner().payload)
            .map_err(|e| RPCError::Unreachable(unreachable(e)))
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, BasicNode, RaftError<NodeId, InstallSnapshotError>>,
    > {
        let payload = serde_json::to_vec(&rpc).map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        let term = rpc.vote.leader_id().term;

        let client = self.get_client().map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        let resp = client
            .install_snapshot(SnapshotEnvelope { term, payload })
            .await
            .map_err(|e| RPCError::Unreachable(unreachable(e)))?;

        serde_json::from_slice(&resp.into_inner().payload)
            .map_err(|e| RPCError::Unreachable(unreachable(e)))
    }
}

/// Creates one [`GrpcNetwork`] per target peer, as `openraft` requests them.
pub struct GrpcNetworkFactory {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl RaftNetworkFactory<TypeConfig> for GrpcNetworkFactory {
    type Network = GrpcNetwork;

    async fn new_client(&mut self, _target: NodeId, node: &BasicNode) -> Self::Network {
        GrpcNetwork {
            target_addr: node.addr.clone(),
            client: None,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }
    }
}

/// Server-side implementation of `RaftTransport`, forwarding decoded
/// requests straight into the local `openraft::Raft` instance.
#[derive(Clone)]
pub struct RaftTransportService {
    raft: crate::cluster::types::RaftInstance,
}

impl RaftTransportService {
    pub fn new(raft: crate::cluster::types::RaftInstance) -> Self {
        Self { raft }
    }
}

#[tonic::async_trait]
impl proto::raft_transport_server::RaftTransport for RaftTransportService {
    async fn append_entries(
        &self,
        request: tonic::Request<AppendEntriesEnvelope>,
    ) -> Result<tonic::Response<AppendEntriesEnvelope>, tonic::Status> {
        let payload = request.into_inner().payload;
        let req: AppendEntriesRequest<TypeConfig> = serde_json::from_slice(&payload)
            .map_err(|e| tonic::Status::invalid_argument(e.to_string()))?;

        let resp = self
            .raft
            .append_entries(req)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))?;

        let payload =
            serde_json::to_vec(&resp).map_err(|e| tonic::Status::internal(e.to_string()))?;
        Ok(tonic::Response::new(AppendEntriesEnvelope {
            term: 0,
            leader_id: String::new(),
            payload,
        }))
    }

    async fn request_vote(
        &self,
        request: tonic::Request<VoteEnvelope>,
    ) -> Result<tonic::Response<VoteEnvelope>, tonic::Status> {
        let payload = request.into_inner().payload;
        let req: VoteRequest<NodeId> = serde_json::from_slice(&payload)
            .map_err(|e| tonic::Status::invalid_argument(e.to_string()))?;

        let resp = self
            .raft
            .vote(req)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))?;

        let payload =
            serde_json::to_vec(&resp).map_err(|e| tonic::Status::internal(e.to_string()))?;
        Ok(tonic::Response::new(VoteEnvelope {
            term: 0,
            candidate_id: String::new(),
            payload,
        }))
    }

    async fn install_snapshot(
        &self,
        request: tonic::Request<SnapshotEnvelope>,
    ) -> Result<tonic::Response<SnapshotEnvelope>, tonic::Status> {
        let payload = request.into_inner().payload;
        let req: InstallSnapshotRequest<TypeConfig> = serde_json::from_slice(&payload)
            .map_err(|e| tonic::Status::invalid_argument(e.to_string()))?;

        let resp = self
            .raft
            .install_snapshot(req)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))?;

        let payload =
            serde_json::to_vec(&resp).map_err(|e| tonic::Status::internal(e.to_string()))?;
        Ok(tonic::Response::new(SnapshotEnvelope { term: 0, payload }))
    }
}
