//! Error taxonomy for the core.
//!
//! Each subsystem owns a focused `thiserror` enum; [`CoreError`] composes
//! them into the single type every public, non-apply-path function returns.
//! Errors that occur *inside* state machine apply are never turned into a
//! `CoreError` — they are captured into a `CommandResponse`'s error field so
//! every replica observes the identical outcome (see `state_machine`).

use std::fmt;

use thiserror::Error;

/// Folder manager errors (directory creation, copy, archive, extract).
#[derive(Error, Debug)]
pub enum FolderError {
    #[error("folder check failed for {path}: {source}")]
    Check {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create folder {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to delete {path}: {source}")]
    Delete {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to archive {path}: {source}")]
    Archive {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compress stream: {0}")]
    Compress(std::io::Error),
    #[error("failed to extract archive into {path}: {source}")]
    Extract {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("archive size {got} bytes outside allowed bounds [{min}, {max}]")]
    ArchiveSize { got: u64, min: u64, max: u64 },
}

/// Options validation aggregates every violation rather than failing fast on
/// the first one, so a caller can fix a config in one pass.
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// Errors from encoding/decoding the command request/response envelope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("unknown command code {0}")]
    UnknownCommand(u32),
    #[error("command {cmd}: expected {expected} args, got {got}")]
    ArityMismatch {
        cmd: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("command {cmd}: argument {index} has wrong type (expected {expected})")]
    TypeMismatch {
        cmd: &'static str,
        index: usize,
        expected: &'static str,
    },
    #[error("payload truncated while decoding {0}")]
    Truncated(&'static str),
    #[error("unsupported element type tag {0}")]
    UnsupportedType(u8),
}

/// Errors raised by the embedded engine while executing a decoded command.
/// These never escape `state_machine::apply` — they are folded into the
/// response's `err` field so every replica sees the same outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("database is closed")]
    DatabaseClosed,
    #[error("key is empty or invalid")]
    KeyInvalid,
    #[error("bucket or key parameters are empty")]
    ParamsEmpty,
    #[error("transaction init failed: {0}")]
    TransactionInit(String),
    #[error("transaction already closed")]
    TransactionClosed,
    #[error("transaction commit failed: {0}")]
    TransactionCommit(String),
    #[error("failed to put key: {0}")]
    TransactionPutKey(String),
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("backup failed: {0}")]
    Backup(String),
    #[error("snapshot failed: {0}")]
    Snapshot(String),
}

/// Errors surfaced by the cluster node-host façade. These originate from the
/// Raft layer itself (timeouts, rejected proposals, unknown leader) and are
/// never stored in a `CommandResponse` — they are always transport/library
/// level failures local to the call that produced them.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("cluster initialization failed: {0}")]
    Init(String),
    #[error("request timed out before a deadline")]
    Timeout,
    #[error("proposal session is no longer valid")]
    InvalidSession,
    #[error("request rejected by raft: {0}")]
    Rejected(String),
    #[error("this node is not the leader; current leader: {0:?}")]
    NotLeader(Option<u64>),
    #[error("cluster is not ready to accept requests")]
    NotReady,
    #[error("network error contacting peer {peer}: {source}")]
    Network {
        peer: String,
        #[source]
        source: tonic::Status,
    },
}

/// Errors surfaced by the typed client façade.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("command is not a recognized client operation")]
    CommandInvalid,
    #[error("wrong number of parameters for this command: {0}")]
    ParamsBadNumber(String),
    #[error("parameter types do not match the command signature: {0}")]
    ParamsMismatching(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("response shape did not match the expected result for this command")]
    ResponseInvalid,
    #[error("the command applied but reported an engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("the command applied but reported an error: {0}")]
    Applied(String),
}

/// Top-level error type returned by every public, non-apply-path function.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Folder(#[from] FolderError),
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// A bounded, cycle-checked chain of causes attached to an [`EngineError`] or
/// [`ClusterError`] produced deep in a call stack, used where a single
/// `#[source]` is not enough to describe a multi-parent failure (for example
/// a snapshot restore that failed both the copy and the rollback). Distinct
/// from `std::error::Error::source` chains: this type is explicitly
/// deduplicated and depth-capped because parents are added programmatically
/// rather than being a fixed compile-time chain.
#[derive(Debug, Default)]
pub struct ErrorChain {
    messages: Vec<String>,
}

const MAX_CHAIN_DEPTH: usize = 16;

impl ErrorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `parent` to the chain unless it is already present or the
    /// chain has reached its depth cap.
    pub fn add(&mut self, parent: impl fmt::Display) {
        if self.messages.len() >= MAX_CHAIN_DEPTH {
            return;
        }
        let msg = parent.to_string();
        if !self.messages.contains(&msg) {
            self.messages.push(msg);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl fmt::Display for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages.join(" <- "))
    }
}
