//! The typed client façade: one method per [`CmdCode`], hiding the
//! `CommandRequest`/`CommandResponse` envelope and the propose-vs-read
//! routing decision behind ordinary Rust signatures.
//!
//! Every method here builds its request with a single, literal `CmdCode` —
//! never derived from the method's own name or arguments — matching the
//! codec's own non-reflective dispatch discipline (see `codec::commands`).
//! Mutating methods go through [`NodeHost::sync_propose`]; read methods
//! go through [`NodeHost::sync_read`], whose `lookup` closure re-uses
//! [`state_machine::apply_command`] directly against the local engine —
//! the same dispatch table a replica uses when applying a logged entry,
//! just invoked without ever touching the Raft log.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::cluster::NodeHost;
use crate::codec::value::{Entry, ScoreOpts, Value, ZNode};
use crate::codec::{CmdCode, CommandRequest, CommandResponse};
use crate::engine::ttl::now_millis;
use crate::engine::Engine;
use crate::error::ClientError;
use crate::state_machine::apply_command;

/// A handle bucket names are passed to, backed by one running [`NodeHost`].
#[derive(Clone)]
pub struct Client {
    cluster: NodeHost,
    engine: Arc<Engine>,
    request_timeout: Duration,
}

impl Client {
    pub fn new(cluster: NodeHost, engine: Arc<Engine>, request_timeout: Duration) -> Self {
        Self {
            cluster,
            engine,
            request_timeout,
        }
    }

    /// Blocks until a leader is known, bounded by `request_timeout`. Every
    /// façade call issued before the cluster has elected anyone waits here
    /// rather than surfacing a premature `NotReady`/`Rejected`.
    async fn propose(&self, cmd: CmdCode, args: Vec<Value>) -> Result<CommandResponse, ClientError> {
        let req = CommandRequest::new(cmd, args);
        req.check_signature()?;
        self.cluster.wait_for_leader(self.request_timeout).await?;
        Ok(self.cluster.sync_propose(req, self.request_timeout).await?)
    }

    async fn read(&self, cmd: CmdCode, args: Vec<Value>) -> Result<CommandResponse, ClientError> {
        let req = CommandRequest::new(cmd, args);
        req.check_signature()?;
        self.cluster.wait_for_leader(self.request_timeout).await?;
        let engine = Arc::clone(&self.engine);
        self.cluster
            .sync_read(self.request_timeout, move || apply_command(&engine, &req, now_millis()))
            .await
            .map_err(ClientError::from)
    }

    fn unwrap_unit(resp: CommandResponse) -> Result<(), ClientError> {
        if let Some(msg) = resp.err {
            return Err(ClientError::Applied(msg));
        }
        Ok(())
    }

    fn unwrap_one(resp: CommandResponse) -> Result<Value, ClientError> {
        if let Some(msg) = resp.err {
            return Err(ClientError::Applied(msg));
        }
        resp.values.into_iter().next().ok_or(ClientError::ResponseInvalid)
    }

    // ── transaction family ────────────────────────────────────────────

    /// Proposes a write stamped with the proposer's own wall-clock time
    /// (`PutWithTimestamp` under the hood — see the determinism note in
    /// `state_machine`).
    pub async fn put(&self, bucket: &str, key: Bytes, value: Bytes, ttl: u32) -> Result<(), ClientError> {
        self.put_with_timestamp(bucket, key, value, ttl, now_millis()).await
    }

    pub async fn put_with_timestamp(
        &self,
        bucket: &str,
        key: Bytes,
        value: Bytes,
        ttl: u32,
        ts: u64,
    ) -> Result<(), ClientError> {
        let resp = self
            .propose(
                CmdCode::PutWithTimestamp,
                vec![
                    Value::Text(bucket.to_string()),
                    Value::Bytes(key),
                    Value::Bytes(value),
                    Value::U32(ttl),
                    Value::U64(ts),
                ],
            )
            .await?;
        Self::unwrap_unit(resp)
    }

    pub async fn get(&self, bucket: &str, key: Bytes) -> Result<Option<Entry>, ClientError> {
        let resp = self.read(CmdCode::Get, vec![Value::Text(bucket.to_string()), Value::Bytes(key)]).await?;
        match Self::unwrap_one(resp)? {
            Value::Entry(e) => Ok(Some(e)),
            Value::None => Ok(None),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn get_all(&self, bucket: &str) -> Result<Vec<Entry>, ClientError> {
        let resp = self.read(CmdCode::GetAll, vec![Value::Text(bucket.to_string())]).await?;
        match Self::unwrap_one(resp)? {
            Value::EntryList(list) => Ok(list),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn range_scan(&self, bucket: &str, start: Bytes, end: Bytes) -> Result<Vec<Entry>, ClientError> {
        let resp = self
            .read(
                CmdCode::RangeScan,
                vec![Value::Text(bucket.to_string()), Value::Bytes(start), Value::Bytes(end)],
            )
            .await?;
        match Self::unwrap_one(resp)? {
            Value::EntryList(list) => Ok(list),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn prefix_scan(
        &self,
        bucket: &str,
        prefix: Bytes,
        offset: i32,
        limit: i32,
    ) -> Result<(Vec<Entry>, i32), ClientError> {
        let resp = self
            .read(
                CmdCode::PrefixScan,
                vec![
                    Value::Text(bucket.to_string()),
                    Value::Bytes(prefix),
                    Value::I32(offset),
                    Value::I32(limit),
                ],
            )
            .await?;
        if let Some(msg) = resp.err {
            return Err(ClientError::Applied(msg));
        }
        let mut values = resp.values.into_iter();
        let entries = match values.next() {
            Some(Value::EntryList(l)) => l,
            _ => return Err(ClientError::ResponseInvalid),
        };
        let next_offset = match values.next() {
            Some(Value::I32(n)) => n,
            _ => return Err(ClientError::ResponseInvalid),
        };
        Ok((entries, next_offset))
    }

    pub async fn prefix_search_scan(
        &self,
        bucket: &str,
        prefix: Bytes,
        pattern: &str,
        offset: i32,
        limit: i32,
    ) -> Result<(Vec<Entry>, i32), ClientError> {
        let resp = self
            .read(
                CmdCode::PrefixSearchScan,
                vec![
                    Value::Text(bucket.to_string()),
                    Value::Bytes(prefix),
                    Value::Text(pattern.to_string()),
                    Value::I32(offset),
                    Value::I32(limit),
                ],
            )
            .await?;
        if let Some(msg) = resp.err {
            return Err(ClientError::Applied(msg));
        }
        let mut values = resp.values.into_iter();
        let entries = match values.next() {
            Some(Value::EntryList(l)) => l,
            _ => return Err(ClientError::ResponseInvalid),
        };
        let next_offset = match values.next() {
            Some(Value::I32(n)) => n,
            _ => return Err(ClientError::ResponseInvalid),
        };
        Ok((entries, next_offset))
    }

    pub async fn delete(&self, bucket: &str, key: Bytes) -> Result<(), ClientError> {
        let resp = self.propose(CmdCode::Delete, vec![Value::Text(bucket.to_string()), Value::Bytes(key)]).await?;
        Self::unwrap_unit(resp)
    }

    // ── set family ─────────────────────────────────────────────────────

    pub async fn sadd(&self, bucket: &str, key: Bytes, members: Vec<Bytes>) -> Result<(), ClientError> {
        let resp = self
            .propose(
                CmdCode::SAdd,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::BytesList(members)],
            )
            .await?;
        Self::unwrap_unit(resp)
    }

    pub async fn srem(&self, bucket: &str, key: Bytes, members: Vec<Bytes>) -> Result<(), ClientError> {
        let resp = self
            .propose(
                CmdCode::SRem,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::BytesList(members)],
            )
            .await?;
        Self::unwrap_unit(resp)
    }

    pub async fn sismember(&self, bucket: &str, key: Bytes, member: Bytes) -> Result<bool, ClientError> {
        let resp = self
            .read(
                CmdCode::SIsMember,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::Bytes(member)],
            )
            .await?;
        match Self::unwrap_one(resp)? {
            Value::Bool(b) => Ok(b),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn smembers(&self, bucket: &str, key: Bytes) -> Result<Vec<Bytes>, ClientError> {
        let resp = self.read(CmdCode::SMembers, vec![Value::Text(bucket.to_string()), Value::Bytes(key)]).await?;
        match Self::unwrap_one(resp)? {
            Value::BytesList(l) => Ok(l),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn scard(&self, bucket: &str, key: Bytes) -> Result<i32, ClientError> {
        let resp = self.read(CmdCode::SCard, vec![Value::Text(bucket.to_string()), Value::Bytes(key)]).await?;
        match Self::unwrap_one(resp)? {
            Value::I32(n) => Ok(n),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    // ── list family ────────────────────────────────────────────────────

    pub async fn lpush(&self, bucket: &str, key: Bytes, values: Vec<Bytes>) -> Result<(), ClientError> {
        let resp = self
            .propose(
                CmdCode::LPush,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::BytesList(values)],
            )
            .await?;
        Self::unwrap_unit(resp)
    }

    pub async fn rpush(&self, bucket: &str, key: Bytes, values: Vec<Bytes>) -> Result<(), ClientError> {
        let resp = self
            .propose(
                CmdCode::RPush,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::BytesList(values)],
            )
            .await?;
        Self::unwrap_unit(resp)
    }

    pub async fn lpop(&self, bucket: &str, key: Bytes) -> Result<Option<Bytes>, ClientError> {
        let resp = self.propose(CmdCode::LPop, vec![Value::Text(bucket.to_string()), Value::Bytes(key)]).await?;
        match Self::unwrap_one(resp)? {
            Value::Bytes(b) => Ok(Some(b)),
            Value::None => Ok(None),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn rpop(&self, bucket: &str, key: Bytes) -> Result<Option<Bytes>, ClientError> {
        let resp = self.propose(CmdCode::RPop, vec![Value::Text(bucket.to_string()), Value::Bytes(key)]).await?;
        match Self::unwrap_one(resp)? {
            Value::Bytes(b) => Ok(Some(b)),
            Value::None => Ok(None),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn lrange(&self, bucket: &str, key: Bytes, start: i32, end: i32) -> Result<Vec<Bytes>, ClientError> {
        let resp = self
            .read(
                CmdCode::LRange,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::I32(start), Value::I32(end)],
            )
            .await?;
        match Self::unwrap_one(resp)? {
            Value::BytesList(l) => Ok(l),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn lrem(&self, bucket: &str, key: Bytes, count: i32, value: Bytes) -> Result<i32, ClientError> {
        let resp = self
            .propose(
                CmdCode::LRem,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::I32(count), Value::Bytes(value)],
            )
            .await?;
        match Self::unwrap_one(resp)? {
            Value::I32(n) => Ok(n),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn llen(&self, bucket: &str, key: Bytes) -> Result<i32, ClientError> {
        let resp = self.read(CmdCode::LLen, vec![Value::Text(bucket.to_string()), Value::Bytes(key)]).await?;
        match Self::unwrap_one(resp)? {
            Value::I32(n) => Ok(n),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn lset(&self, bucket: &str, key: Bytes, index: i32, value: Bytes) -> Result<(), ClientError> {
        let resp = self
            .propose(
                CmdCode::LSet,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::I32(index), Value::Bytes(value)],
            )
            .await?;
        Self::unwrap_unit(resp)
    }

    pub async fn ltrim(&self, bucket: &str, key: Bytes, start: i32, end: i32) -> Result<(), ClientError> {
        let resp = self
            .propose(
                CmdCode::LTrim,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::I32(start), Value::I32(end)],
            )
            .await?;
        Self::unwrap_unit(resp)
    }

    pub async fn lindex(&self, bucket: &str, key: Bytes, index: i32) -> Result<Option<Bytes>, ClientError> {
        let resp = self
            .read(CmdCode::LIndex, vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::I32(index)])
            .await?;
        match Self::unwrap_one(resp)? {
            Value::Bytes(b) => Ok(Some(b)),
            Value::None => Ok(None),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    // ── sorted-set family ──────────────────────────────────────────────

    pub async fn zadd(&self, bucket: &str, key: Bytes, score: f64, member: Bytes) -> Result<(), ClientError> {
        let resp = self
            .propose(
                CmdCode::ZAdd,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::F64(score), Value::Bytes(member)],
            )
            .await?;
        Self::unwrap_unit(resp)
    }

    pub async fn zrem(&self, bucket: &str, key: Bytes, members: Vec<Bytes>) -> Result<(), ClientError> {
        let resp = self
            .propose(
                CmdCode::ZRem,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::BytesList(members)],
            )
            .await?;
        Self::unwrap_unit(resp)
    }

    pub async fn zscore(&self, bucket: &str, key: Bytes, member: Bytes) -> Result<Option<f64>, ClientError> {
        let resp = self
            .read(CmdCode::ZScore, vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::Bytes(member)])
            .await?;
        match Self::unwrap_one(resp)? {
            Value::F64(v) => Ok(Some(v)),
            Value::None => Ok(None),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn zcard(&self, bucket: &str, key: Bytes) -> Result<i32, ClientError> {
        let resp = self.read(CmdCode::ZCard, vec![Value::Text(bucket.to_string()), Value::Bytes(key)]).await?;
        match Self::unwrap_one(resp)? {
            Value::I32(n) => Ok(n),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn zrank(&self, bucket: &str, key: Bytes, member: Bytes) -> Result<Option<i32>, ClientError> {
        let resp = self
            .read(CmdCode::ZRank, vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::Bytes(member)])
            .await?;
        match Self::unwrap_one(resp)? {
            Value::I32(n) => Ok(Some(n)),
            Value::None => Ok(None),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn zcount(&self, bucket: &str, key: Bytes, min: f64, max: f64) -> Result<i32, ClientError> {
        let resp = self
            .read(CmdCode::ZCount, vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::F64(min), Value::F64(max)])
            .await?;
        match Self::unwrap_one(resp)? {
            Value::I32(n) => Ok(n),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn zrange_by_score(
        &self,
        bucket: &str,
        key: Bytes,
        min: f64,
        max: f64,
        opts: ScoreOpts,
    ) -> Result<Vec<ZNode>, ClientError> {
        let resp = self
            .read(
                CmdCode::ZRangeByScore,
                vec![
                    Value::Text(bucket.to_string()),
                    Value::Bytes(key),
                    Value::F64(min),
                    Value::F64(max),
                    Value::ScoreOpts(opts),
                ],
            )
            .await?;
        match Self::unwrap_one(resp)? {
            Value::ZNodeList(l) => Ok(l),
            _ => Err(ClientError::ResponseInvalid),
        }
    }

    pub async fn zrange_by_rank(&self, bucket: &str, key: Bytes, start: i32, end: i32) -> Result<Vec<ZNode>, ClientError> {
        let resp = self
            .read(
                CmdCode::ZRangeByRank,
                vec![Value::Text(bucket.to_string()), Value::Bytes(key), Value::I32(start), Value::I32(end)],
            )
            .await?;
        match Self::unwrap_one(resp)? {
            Value::ZNodeList(l) => Ok(l),
            _ => Err(ClientError::ResponseInvalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_unit_surfaces_applied_error() {
        let resp = CommandResponse::error("boom");
        let err = Client::unwrap_unit(resp).unwrap_err();
        assert!(matches!(err, ClientError::Applied(msg) if msg == "boom"));
    }

    #[test]
    fn unwrap_one_rejects_empty_values() {
        let resp = CommandResponse::ok(vec![]);
        assert!(matches!(Client::unwrap_one(resp).unwrap_err(), ClientError::ResponseInvalid));
    }
}
