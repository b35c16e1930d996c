//! The replicated state machine: `openraft`'s `RaftStorage` contract bound
//! to the embedded engine, plus the explicit `CmdCode -> handler` dispatch
//! table that turns a decoded [`CommandRequest`] into engine calls.
//!
//! Storage shape is grounded on `cbaugus-rust_loadtest`'s `MemStorage`
//! (`cbaugus-rust_loadtest::raft`), method-for-method (`save_vote`,
//! `append_to_log`, `delete_conflict_logs_since`, `purge_logs_upto`,
//! `apply_to_state_machine`, `get_snapshot_builder`, ...). Unlike the
//! load-test coordinator's in-memory `BTreeMap`, vote/log/commit metadata here are
//! persisted to dedicated `sled::Tree`s under the node-host's `wal`/`host`
//! directories — durability an ephemeral load-test coordinator
//! does not need but a replicated key-value store does.
//!
//! **Determinism invariant**: [`apply_command`] never reads the wall clock,
//! and neither does [`ReplicatedStore::apply_to_state_machine`] on its
//! behalf. `PutWithTimestamp` carries its timestamp from the proposer;
//! plain `Put` stamps the deterministic constant `ts = 0` rather than
//! sampling time during apply. The client façade always proposes
//! `PutWithTimestamp` under the hood (see `client::Client::put`), stamping
//! the proposer's own wall clock before the command ever enters the log —
//! so every `Put`-family entry a replica actually applies already carries
//! a timestamp fixed at proposal time, not at apply time.

use std::ops::RangeBounds;
use std::sync::{Arc, Mutex};

use openraft::storage::{RaftLogReader, RaftSnapshotBuilder, RaftStorage};
use openraft::{
    LogId, LogState, RaftLogId, Snapshot, SnapshotMeta, StorageError, StoredMembership, Vote,
};
use regex::Regex;
use tracing::{info, warn};

use crate::cluster::types::{NodeId, TypeConfig};
use crate::codec::value::{ScoreOpts, Value};
use crate::codec::{CmdCode, CommandRequest, CommandResponse};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::folder::FolderManager;
use crate::snapshot;

type Entry = openraft::Entry<TypeConfig>;

// ── Command dispatch ─────────────────────────────────────────────────────

fn text(v: &Value) -> &str {
    match v {
        Value::Text(s) => s,
        _ => unreachable!("signature-checked"),
    }
}
fn bytes(v: &Value) -> &bytes::Bytes {
    match v {
        Value::Bytes(b) => b,
        _ => unreachable!("signature-checked"),
    }
}
fn u32v(v: &Value) -> u32 {
    match v {
        Value::U32(n) => *n,
        _ => unreachable!("signature-checked"),
    }
}
fn u64v(v: &Value) -> u64 {
    match v {
        Value::U64(n) => *n,
        _ => unreachable!("signature-checked"),
    }
}
fn i32v(v: &Value) -> i32 {
    match v {
        Value::I32(n) => *n,
        _ => unreachable!("signature-checked"),
    }
}
fn f64v(v: &Value) -> f64 {
    match v {
        Value::F64(n) => *n,
        _ => unreachable!("signature-checked"),
    }
}
fn bytes_list(v: &Value) -> &[bytes::Bytes] {
    match v {
        Value::BytesList(l) => l,
        _ => unreachable!("signature-checked"),
    }
}
fn score_opts(v: &Value) -> &ScoreOpts {
    match v {
        Value::ScoreOpts(o) => o,
        _ => unreachable!("signature-checked"),
    }
}

fn engine_result<T>(r: Result<T, EngineError>, to_value: impl FnOnce(T) -> Vec<Value>) -> CommandResponse {
    match r {
        Ok(v) => CommandResponse::ok(to_value(v)),
        Err(e) => CommandResponse::error(e.to_string()),
    }
}

/// Executes a single, already signature-checked [`CommandRequest`] against
/// `engine`, returning the shaped [`CommandResponse`]. This is the only
/// place a `CmdCode` is matched against engine behavior — every command has
/// exactly one arm.
///
/// `now_ms` is used only by TTL-expiry reads (`Get`, `GetAll`, `RangeScan`,
/// `PrefixScan`, `PrefixSearchScan`): for `Lookup` it is the read's own
/// wall-clock time. Proposed (logged) entries are exclusively the mutating
/// commands, none of which may read `now_ms` — `Put` stamps a deterministic
/// constant and `PutWithTimestamp` carries its own proposer-assigned `ts` —
/// so this function stays a pure function of `(engine state, req)` on the
/// apply path, never sampling the clock itself.
pub fn apply_command(engine: &Engine, req: &CommandRequest, now_ms: u64) -> CommandResponse {
    let a = &req.args;
    let bucket = match engine.bucket(text(&a[0])) {
        Ok(b) => b,
        Err(e) => return CommandResponse::error(e.to_string()),
    };

    match req.cmd {
        // `Put` never samples wall-clock time inside apply (determinism
        // invariant) — it stamps the deterministic constant 0 rather than
        // `now_ms`, which only exists on this signature for the Lookup path.
        // Callers that need a real timestamp use `PutWithTimestamp`, whose
        // `ts` is assigned by the proposer before the command is logged.
        CmdCode::Put => engine_result(bucket.put(bytes(&a[1]), bytes(&a[2]), u32v(&a[3]), 0), |_| vec![]),
        CmdCode::PutWithTimestamp => {
            engine_result(bucket.put(bytes(&a[1]), bytes(&a[2]), u32v(&a[3]), u64v(&a[4])), |_| vec![])
        }
        CmdCode::Get => engine_result(bucket.get(bytes(&a[1]), now_ms), |e| {
            vec![e.map(Value::Entry).unwrap_or(Value::None)]
        }),
        CmdCode::GetAll => engine_result(bucket.get_all(now_ms), |es| vec![Value::EntryList(es)]),
        CmdCode::RangeScan => {
            engine_result(bucket.range_scan(bytes(&a[1]), bytes(&a[2]), now_ms), |es| vec![Value::EntryList(es)])
        }
        CmdCode::PrefixScan => engine_result(
            bucket.prefix_scan(bytes(&a[1]), i32v(&a[2]), i32v(&a[3]), now_ms),
            |(es, next)| vec![Value::EntryList(es), Value::I32(next)],
        ),
        CmdCode::PrefixSearchScan => {
            let pattern = match Regex::new(text(&a[2])) {
                Ok(r) => r,
                Err(e) => return CommandResponse::error(format!("invalid regex: {e}")),
            };
            engine_result(
                bucket.prefix_search_scan(bytes(&a[1]), Some(&pattern), i32v(&a[3]), i32v(&a[4]), now_ms),
                |(es, next)| vec![Value::EntryList(es), Value::I32(next)],
            )
        }
        CmdCode::Delete => engine_result(bucket.delete(bytes(&a[1])), |_| vec![]),

        CmdCode::SAdd => engine_result(bucket.sadd(bytes(&a[1]), bytes_list(&a[2])), |_| vec![]),
        CmdCode::SRem => engine_result(bucket.srem(bytes(&a[1]), bytes_list(&a[2])), |_| vec![]),
        CmdCode::SIsMember => engine_result(bucket.sismember(bytes(&a[1]), bytes(&a[2])), |b| vec![Value::Bool(b)]),
        CmdCode::SMembers => engine_result(bucket.smembers(bytes(&a[1])), |l| vec![Value::BytesList(l)]),
        CmdCode::SCard => engine_result(bucket.scard(bytes(&a[1])), |n| vec![Value::I32(n)]),

        CmdCode::LPush => engine_result(bucket.lpush(bytes(&a[1]), bytes_list(&a[2])), |_| vec![]),
        CmdCode::RPush => engine_result(bucket.rpush(bytes(&a[1]), bytes_list(&a[2])), |_| vec![]),
        CmdCode::LPop => engine_result(bucket.lpop(bytes(&a[1])), |v| vec![v.map(Value::Bytes).unwrap_or(Value::None)]),
        CmdCode::RPop => engine_result(bucket.rpop(bytes(&a[1])), |v| vec![v.map(Value::Bytes).unwrap_or(Value::None)]),
        CmdCode::LRange => engine_result(bucket.lrange(bytes(&a[1]), i32v(&a[2]), i32v(&a[3])), |l| vec![Value::BytesList(l)]),
        CmdCode::LRem => engine_result(bucket.lrem(bytes(&a[1]), i32v(&a[2]), bytes(&a[3])), |n| vec![Value::I32(n)]),
        CmdCode::LLen => engine_result(bucket.llen(bytes(&a[1])), |n| vec![Value::I32(n)]),
        CmdCode::LSet => engine_result(bucket.lset(bytes(&a[1]), i32v(&a[2]), bytes(&a[3])), |_| vec![]),
        CmdCode::LTrim => engine_result(bucket.ltrim(bytes(&a[1]), i32v(&a[2]), i32v(&a[3])), |_| vec![]),
        CmdCode::LIndex => engine_result(bucket.lindex(bytes(&a[1]), i32v(&a[2])), |v| vec![v.map(Value::Bytes).unwrap_or(Value::None)]),

        CmdCode::ZAdd => engine_result(bucket.zadd(bytes(&a[1]), f64v(&a[2]), bytes(&a[3])), |_| vec![]),
        CmdCode::ZRem => engine_result(bucket.zrem(bytes(&a[1]), bytes_list(&a[2])), |_| vec![]),
        CmdCode::ZScore => engine_result(bucket.zscore(bytes(&a[1]), bytes(&a[2])), |v| vec![v.map(Value::F64).unwrap_or(Value::None)]),
        CmdCode::ZCard => engine_result(bucket.zcard(bytes(&a[1])), |n| vec![Value::I32(n)]),
        CmdCode::ZRank => engine_result(bucket.zrank(bytes(&a[1]), bytes(&a[2])), |v| vec![v.map(Value::I32).unwrap_or(Value::None)]),
        CmdCode::ZCount => engine_result(bucket.zcount(bytes(&a[1]), f64v(&a[2]), f64v(&a[3])), |n| vec![Value::I32(n)]),
        CmdCode::ZRangeByScore => {
            let opts = score_opts(&a[4]);
            engine_result(
                bucket.zrange_by_score(bytes(&a[1]), f64v(&a[2]), f64v(&a[3]), opts.limit, opts.exclude_start, opts.exclude_end),
                |l| vec![Value::ZNodeList(l)],
            )
        }
        CmdCode::ZRangeByRank => engine_result(bucket.zrange_by_rank(bytes(&a[1]), i32v(&a[2]), i32v(&a[3])), |l| vec![Value::ZNodeList(l)]),
    }
}

// ── RaftStorage ───────────────────────────────────────────────────────────

fn log_key(index: u64) -> [u8; 8] {
    index.to_be_bytes()
}

/// Combined in-memory-indexed, disk-backed Raft storage: the log and vote
/// live in dedicated `sled::Tree`s (durable), the applied state lives in the
/// embedded [`Engine`] (also durable). Wrapped by
/// `openraft::storage::Adaptor::new(store)` to produce the v2
/// `(RaftLogStorage, RaftStateMachine)` split `Raft::new` requires.
pub struct ReplicatedStore {
    engine: Arc<Engine>,
    folders: Arc<FolderManager>,
    log: sled::Tree,
    meta: sled::Tree,
    last_applied: Option<LogId<NodeId>>,
    last_membership: StoredMembership<NodeId, openraft::BasicNode>,
    current_snapshot: Mutex<Option<Snapshot<TypeConfig>>>,
}

const META_VOTE: &str = "vote";
const META_COMMITTED: &str = "committed";
const META_LAST_PURGED: &str = "last_purged";
const META_LAST_APPLIED: &str = "last_applied";
const META_LAST_MEMBERSHIP: &str = "last_membership";

impl ReplicatedStore {
    pub fn open(engine: Arc<Engine>, folders: Arc<FolderManager>, wal_db: &sled::Db, host_db: &sled::Db) -> Result<Self, EngineError> {
        let log = wal_db
            .open_tree("log")
            .map_err(|e| EngineError::TransactionInit(e.to_string()))?;
        let meta = host_db
            .open_tree("meta")
            .map_err(|e| EngineError::TransactionInit(e.to_string()))?;

        let last_applied = meta
            .get(META_LAST_APPLIED)
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_slice(&v).ok());
        let last_membership = meta
            .get(META_LAST_MEMBERSHIP)
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_slice(&v).ok())
            .unwrap_or_default();

        Ok(Self {
            engine,
            folders,
            log,
            meta,
            last_applied,
            last_membership,
            current_snapshot: Mutex::new(None),
        })
    }

    fn persist_last_applied(&mut self) -> Result<(), StorageError<NodeId>> {
        let bytes = serde_json::to_vec(&self.last_applied).map_err(sm_err)?;
        self.meta.insert(META_LAST_APPLIED, bytes).map_err(sm_err)?;
        let bytes = serde_json::to_vec(&self.last_membership).map_err(sm_err)?;
        self.meta.insert(META_LAST_MEMBERSHIP, bytes).map_err(sm_err)?;
        Ok(())
    }
}

fn sm_err(e: impl std::fmt::Display) -> StorageError<NodeId> {
    StorageError::IO {
        source: openraft::StorageIOError::write(&openraft::AnyError::error(e.to_string())),
    }
}

impl RaftLogReader<TypeConfig> for ReplicatedStore {
    async fn try_get_log_entries<RB>(&mut self, range: RB) -> Result<Vec<Entry>, StorageError<NodeId>>
    where
        RB: RangeBounds<u64> + Clone + std::fmt::Debug + Send,
    {
        let start = match range.start_bound() {
            std::ops::Bound::Included(&n) => n,
            std::ops::Bound::Excluded(&n) => n + 1,
            std::ops::Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            std::ops::Bound::Included(&n) => n + 1,
            std::ops::Bound::Excluded(&n) => n,
            std::ops::Bound::Unbounded => u64::MAX,
        };
        let mut out = Vec::new();
        for item in self.log.range(log_key(start)..log_key(end)) {
            let (_, v) = item.map_err(sm_err)?;
            out.push(serde_json::from_slice(&v).map_err(sm_err)?);
        }
        Ok(out)
    }
}

/// Snapshot of the log at a point in time, handed out by `get_log_reader`.
pub struct ReplicatedLogReader {
    log: sled::Tree,
}

impl RaftLogReader<TypeConfig> for ReplicatedLogReader {
    async fn try_get_log_entries<RB>(&mut self, range: RB) -> Result<Vec<Entry>, StorageError<NodeId>>
    where
        RB: RangeBounds<u64> + Clone + std::fmt::Debug + Send,
    {
        let start = match range.start_bound() {
            std::ops::Bound::Included(&n) => n,
            std::ops::Bound::Excluded(&n) => n + 1,
            std::ops::Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            std::ops::Bound::Included(&n) => n + 1,
            std::ops::Bound::Excluded(&n) => n,
            std::ops::Bound::Unbounded => u64::MAX,
        };
        let mut out = Vec::new();
        for item in self.log.range(log_key(start)..log_key(end)) {
            let (_, v) = item.map_err(sm_err)?;
            out.push(serde_json::from_slice(&v).map_err(sm_err)?);
        }
        Ok(out)
    }
}

/// Builds a snapshot by delegating to the [`crate::snapshot`] archive
/// pipeline: stage a copy of the engine's data directory, tar+gzip it into
/// an in-memory buffer (small clusters) or a staged temp file (large ones).
pub struct ReplicatedSnapshotBuilder {
    engine: Arc<Engine>,
    folders: Arc<FolderManager>,
    last_applied: Option<LogId<NodeId>>,
    last_membership: StoredMembership<NodeId, openraft::BasicNode>,
}

impl RaftSnapshotBuilder<TypeConfig> for ReplicatedSnapshotBuilder {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let data = snapshot::pack(&self.engine, &self.folders)
            .await
            .map_err(sm_err)?;

        let snapshot_id = format!("{}-{}", self.last_applied.map(|l| l.index).unwrap_or(0), data.len());

        Ok(Snapshot {
            meta: SnapshotMeta {
                last_log_id: self.last_applied,
                last_membership: self.last_membership.clone(),
                snapshot_id,
            },
            snapshot: Box::new(std::io::Cursor::new(data)),
        })
    }
}

impl RaftStorage<TypeConfig> for ReplicatedStore {
    type LogReader = ReplicatedLogReader;
    type SnapshotBuilder = ReplicatedSnapshotBuilder;

    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError<NodeId>> {
        let bytes = serde_json::to_vec(vote).map_err(sm_err)?;
        self.meta.insert(META_VOTE, bytes).map_err(sm_err)?;
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError<NodeId>> {
        Ok(self
            .meta
            .get(META_VOTE)
            .map_err(sm_err)?
            .and_then(|v| serde_json::from_slice(&v).ok()))
    }

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
        let last_purged_log_id = self
            .meta
            .get(META_LAST_PURGED)
            .map_err(sm_err)?
            .and_then(|v| serde_json::from_slice(&v).ok());
        let last_log_id = self
            .log
            .iter()
            .next_back()
            .transpose()
            .map_err(sm_err)?
            .map(|(_, v)| serde_json::from_slice::<Entry>(&v).map(|e| *e.get_log_id()))
            .transpose()
            .map_err(sm_err)?;
        Ok(LogState {
            last_purged_log_id,
            last_log_id: last_log_id.or(last_purged_log_id),
        })
    }

    async fn save_committed(&mut self, committed: Option<LogId<NodeId>>) -> Result<(), StorageError<NodeId>> {
        let bytes = serde_json::to_vec(&committed).map_err(sm_err)?;
        self.meta.insert(META_COMMITTED, bytes).map_err(sm_err)?;
        Ok(())
    }

    async fn read_committed(&mut self) -> Result<Option<LogId<NodeId>>, StorageError<NodeId>> {
        Ok(self
            .meta
            .get(META_COMMITTED)
            .map_err(sm_err)?
            .and_then(|v| serde_json::from_slice(&v).ok()))
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        ReplicatedLogReader {
            log: self.log.clone(),
        }
    }

    async fn append_to_log<I>(&mut self, entries: I) -> Result<(), StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry> + Send,
    {
        for entry in entries {
            let idx = entry.get_log_id().index;
            let bytes = serde_json::to_vec(&entry).map_err(sm_err)?;
            self.log.insert(log_key(idx), bytes).map_err(sm_err)?;
        }
        Ok(())
    }

    async fn delete_conflict_logs_since(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        let to_remove: Vec<_> = self
            .log
            .range(log_key(log_id.index)..)
            .keys()
            .collect::<Result<_, _>>()
            .map_err(sm_err)?;
        for k in to_remove {
            self.log.remove(k).map_err(sm_err)?;
        }
        Ok(())
    }

    async fn purge_logs_upto(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        let to_remove: Vec<_> = self
            .log
            .range(..=log_key(log_id.index))
            .keys()
            .collect::<Result<_, _>>()
            .map_err(sm_err)?;
        for k in to_remove {
            self.log.remove(k).map_err(sm_err)?;
        }
        let bytes = serde_json::to_vec(&log_id).map_err(sm_err)?;
        self.meta.insert(META_LAST_PURGED, bytes).map_err(sm_err)?;
        Ok(())
    }

    async fn last_applied_state(
        &mut self,
    ) -> Result<(Option<LogId<NodeId>>, StoredMembership<NodeId, openraft::BasicNode>), StorageError<NodeId>> {
        Ok((self.last_applied, self.last_membership.clone()))
    }

    async fn apply_to_state_machine(&mut self, entries: &[Entry]) -> Result<Vec<CommandResponse>, StorageError<NodeId>> {
        // Apply never samples the wall clock — every logged entry is a
        // mutating command, and none of those arms read `now_ms` (see
        // `apply_command`'s doc comment), so a fixed constant is passed
        // through rather than `now_millis()`.
        let now_ms = 0;
        let mut responses = Vec::with_capacity(entries.len());

        for entry in entries {
            self.last_applied = Some(*entry.get_log_id());

            match &entry.payload {
                openraft::EntryPayload::Blank => {
                    responses.push(CommandResponse::ok(vec![]));
                }
                openraft::EntryPayload::Normal(req) => {
                    let resp = apply_command(&self.engine, req, now_ms);
                    if let Some(err) = &resp.err {
                        warn!(cmd = req.cmd.name(), error = %err, "command applied with engine error");
                    }
                    responses.push(resp);
                }
                openraft::EntryPayload::Membership(m) => {
                    self.last_membership = StoredMembership::new(Some(*entry.get_log_id()), m.clone());
                    responses.push(CommandResponse::ok(vec![]));
                }
            }
        }

        self.persist_last_applied()?;
        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        ReplicatedSnapshotBuilder {
            engine: self.engine.clone(),
            folders: self.folders.clone(),
            last_applied: self.last_applied,
            last_membership: self.last_membership.clone(),
        }
    }

    async fn begin_receiving_snapshot(&mut self) -> Result<Box<std::io::Cursor<Vec<u8>>>, StorageError<NodeId>> {
        Ok(Box::new(std::io::Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, openraft::BasicNode>,
        snapshot: Box<std::io::Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<NodeId>> {
        snapshot::unpack(&self.engine, &self.folders, snapshot.into_inner())
            .await
            .map_err(sm_err)?;

        self.last_applied = meta.last_log_id;
        self.last_membership = meta.last_membership.clone();
        self.persist_last_applied()?;

        *self.current_snapshot.lock().unwrap() = Some(Snapshot {
            meta: meta.clone(),
            snapshot: Box::new(std::io::Cursor::new(Vec::new())),
        });

        info!(index = ?meta.last_log_id, "installed snapshot");
        Ok(())
    }

    async fn get_current_snapshot(&mut self) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        Ok(self.current_snapshot.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;
    use bytes::Bytes;

    fn test_engine() -> (tempfile::TempDir, Arc<Engine>) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(Engine::open(dir.path(), &EngineOptions::default()).unwrap());
        (dir, engine)
    }

    #[test]
    fn put_then_get_roundtrips_through_dispatch() {
        let (_dir, engine) = test_engine();
        let put = CommandRequest::new(
            CmdCode::PutWithTimestamp,
            vec![
                Value::Text("b".into()),
                Value::Bytes(Bytes::from_static(b"k")),
                Value::Bytes(Bytes::from_static(b"v")),
                Value::U32(0),
                Value::U64(1_000),
            ],
        );
        let resp = apply_command(&engine, &put, 1_000);
        assert!(resp.is_ok());

        let get = CommandRequest::new(CmdCode::Get, vec![Value::Text("b".into()), Value::Bytes(Bytes::from_static(b"k"))]);
        let resp = apply_command(&engine, &get, 1_000);
        assert_eq!(resp.values.len(), 1);
        match &resp.values[0] {
            Value::Entry(e) => assert_eq!(e.value.as_ref(), b"v"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn get_on_missing_key_returns_none_not_error() {
        let (_dir, engine) = test_engine();
        let get = CommandRequest::new(CmdCode::Get, vec![Value::Text("b".into()), Value::Bytes(Bytes::from_static(b"missing"))]);
        let resp = apply_command(&engine, &get, 0);
        assert!(resp.is_ok());
        assert_eq!(resp.values, vec![Value::None]);
    }

    #[test]
    fn engine_error_is_captured_in_response_not_panicked() {
        let (_dir, engine) = test_engine();
        // empty bucket name triggers EngineError::ParamsEmpty inside engine.bucket(),
        // which apply_command must fold into the response, never propagate.
        let put = CommandRequest::new(
            CmdCode::PutWithTimestamp,
            vec![
                Value::Text("".into()),
                Value::Bytes(Bytes::from_static(b"k")),
                Value::Bytes(Bytes::from_static(b"v")),
                Value::U32(0),
                Value::U64(0),
            ],
        );
        let resp = apply_command(&engine, &put, 0);
        assert!(!resp.is_ok());
    }
}
