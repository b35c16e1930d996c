//! A replicated, embedded key-value store: Raft consensus
//! ([`openraft`]) over an embedded storage engine ([`sled`]), reachable
//! through a typed [`client::Client`] façade.
//!
//! The crate is organized bottom-up, mirroring how a replica actually
//! starts:
//!
//! - [`error`] — the shared error taxonomy every module returns into.
//! - [`folder`] / [`options`] — on-disk layout and validated configuration.
//! - [`codec`] — the self-describing command request/response wire format.
//! - [`engine`] — the embedded KV engine binding (`sled`) plus TTL and
//!   set/list/sorted-set collection support it doesn't provide natively.
//! - [`state_machine`] — the `CmdCode -> engine call` dispatch table and
//!   the `openraft::RaftStorage` binding built on top of it.
//! - [`snapshot`] — the tar+gzip archive pipeline used by snapshot
//!   install/build.
//! - [`cluster`] — the Raft node-host façade and its gRPC transport.
//! - [`client`] — the typed, per-command client API.
//! - [`db`] — wires all of the above into a runnable replica.

pub mod client;
pub mod cluster;
pub mod codec;
pub mod db;
pub mod engine;
pub mod error;
pub mod folder;
pub mod options;
pub mod snapshot;
pub mod state_machine;

pub use client::Client;
pub use cluster::NodeHost;
pub use db::ReplicatedDb;
pub use error::{CoreError, CoreResult};
pub use options::Options;

/// Initializes the process-wide `tracing` subscriber from
/// [`Options::log_filter`]. Grounded on the corpus's own logging
/// setup (`tracing_subscriber::EnvFilter` + a JSON-formatted layer);
/// call once per process, before [`db::ReplicatedDb::open`].
pub fn init_logging(filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(env_filter).json().try_init();
}
