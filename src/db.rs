//! Top-level entry point: opens a replica's on-disk state, starts the
//! cluster node-host and its gRPC transport, and hands back a typed
//! [`Client`].
//!
//! Wiring order follows the usual Raft node bring-up sequence
//! (`cbaugus-rust_loadtest::raft`): folders before engine, engine before
//! storage, storage before `Raft::new`, `Raft::new` before the gRPC
//! server is bound.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tonic::transport::Server;
use tracing::info;

use crate::client::Client;
use crate::cluster::network::proto::raft_transport_server::RaftTransportServer;
use crate::cluster::NodeHost;
use crate::engine::Engine;
use crate::error::{ClusterError, CoreError, CoreResult};
use crate::folder::FolderManager;
use crate::options::Options;
use crate::state_machine::ReplicatedStore;

/// A fully wired replica: node-host, client façade, and the gRPC server
/// task serving this node's Raft RPCs to peers.
pub struct ReplicatedDb {
    pub client: Client,
    pub cluster: NodeHost,
    server_task: JoinHandle<()>,
}

impl ReplicatedDb {
    /// Opens `opts.node_host.data_dir`, starts (or rejoins) the Raft
    /// replica described by `opts.cluster`, and begins serving this node's
    /// gRPC transport on `opts.node_host.raft_address`.
    pub async fn open(opts: Options) -> CoreResult<Self> {
        opts.validate()?;

        let folders = Arc::new(FolderManager::new(opts.folder_layout(), opts.node_host.dir_mode));
        folders.ensure_all()?;

        let engine = Arc::new(Engine::open(&folders.layout().data, &opts.engine)?);

        let wal_db = sled::open(&folders.layout().wal).map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        let host_db = sled::open(&folders.layout().host).map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

        let store = ReplicatedStore::open(Arc::clone(&engine), Arc::clone(&folders), &wal_db, &host_db)?;

        let cluster = NodeHost::start_cluster(
            &opts.cluster,
            store,
            opts.node_host.connect_timeout,
            opts.node_host.request_timeout,
        )
        .await?;

        let transport = cluster.transport_service();
        let bind_addr = opts
            .node_host
            .raft_address
            .parse()
            .map_err(|e: std::net::AddrParseError| CoreError::Cluster(ClusterError::Init(e.to_string())))?;
        let server_task = tokio::spawn(async move {
            if let Err(e) = Server::builder()
                .add_service(RaftTransportServer::new(transport))
                .serve(bind_addr)
                .await
            {
                tracing::error!(error = %e, "raft transport server exited");
            }
        });

        info!(addr = %opts.node_host.raft_address, "replica listening for raft rpcs");

        let client = Client::new(cluster.clone(), engine, opts.node_host.request_timeout);

        Ok(Self {
            client,
            cluster,
            server_task,
        })
    }

    /// Blocks until this replica's cluster knows a leader, or `deadline`
    /// elapses — call before issuing client requests right after startup.
    pub async fn wait_for_leader(&self, deadline: std::time::Duration) -> Result<u64, ClusterError> {
        self.cluster.wait_for_leader(deadline).await
    }

    pub async fn shutdown(self) -> CoreResult<()> {
        self.server_task.abort();
        self.cluster.shutdown().await?;
        Ok(())
    }

    /// `SyncRemoveData`: erases every on-disk directory (`data`, `wal`,
    /// `host`, `backup`) belonging to `opts.node_host.data_dir`. The caller
    /// must have already stopped the replica that owned them (this crate
    /// offers no in-process way to remove a running engine's backing files
    /// out from under it) — the usual sequence, matching §8's snapshot
    /// catch-up scenario, is `db.shutdown()`, then `remove_data(&opts)`,
    /// then `ReplicatedDb::open(opts)` to rejoin as a clean node that
    /// catches up entirely from the leader's log and snapshots.
    pub fn remove_data(opts: &Options) -> CoreResult<()> {
        let layout = opts.folder_layout();
        for dir in [&layout.data, &layout.wal, &layout.host, &layout.backup] {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_data_clears_all_four_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let mut opts = Options::default();
        opts.node_host.data_dir = tmp.path().to_path_buf();
        let folders = FolderManager::new(opts.folder_layout(), opts.node_host.dir_mode);
        folders.ensure_all().unwrap();
        std::fs::write(folders.layout().data.join("marker"), b"x").unwrap();

        ReplicatedDb::remove_data(&opts).unwrap();

        assert!(!folders.layout().data.exists());
        assert!(!folders.layout().wal.exists());
    }
}
