//! The embedded KV engine binding.
//!
//! Wraps `sled`, the external, transactional, crash-safe embedded engine the
//! core treats as a dependency (per the distilled spec, the engine itself is
//! out of scope). Every logical [`Bucket`] is four physical `sled::Tree`s: a
//! main KV tree plus one tree each for the set, list, and sorted-set
//! families, since those three collection types are not native to `sled`
//! (see `collections` for their key layouts).
//!
//! All methods here are called only from `state_machine::apply`/`lookup`
//! under the concurrency discipline described there: writes are exclusive,
//! reads may run concurrently with each other but never with a write.

pub mod collections;
pub mod ttl;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use regex::Regex;

use crate::codec::value::{Entry, ZNode};
use crate::error::EngineError;
use crate::options::EngineOptions;

/// Owns the single `sled::Db` for a replica and opens per-bucket tree sets
/// on demand.
pub struct Engine {
    db: sled::Db,
}

impl Engine {
    pub fn open(path: &std::path::Path, opts: &EngineOptions) -> Result<Self, EngineError> {
        let db = sled::Config::new()
            .path(path)
            .cache_capacity(opts.cache_capacity_bytes)
            .use_compression(opts.enable_gc)
            .flush_every_ms(if opts.sync_on_write { Some(200) } else { None })
            .open()
            .map_err(|e| EngineError::TransactionInit(e.to_string()))?;
        Ok(Self { db })
    }

    pub fn bucket(&self, name: &str) -> Result<Bucket, EngineError> {
        if name.is_empty() {
            return Err(EngineError::ParamsEmpty);
        }
        let open = |suffix: &str| -> Result<sled::Tree, EngineError> {
            self.db
                .open_tree(format!("{name}{suffix}"))
                .map_err(|e| EngineError::TransactionInit(e.to_string()))
        };
        Ok(Bucket {
            main: open("")?,
            set: open("$set")?,
            list: open("$list")?,
            zset: open("$zset")?,
        })
    }

    /// Non-blocking, consistent point-in-time copy used by the snapshot
    /// pipeline's prepare phase.
    pub fn export(&self) -> sled::Db {
        self.db.clone()
    }

    pub fn flush(&self) -> Result<(), EngineError> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| EngineError::TransactionCommit(e.to_string()))
    }
}

/// The four physical trees backing one logical bucket.
pub struct Bucket {
    main: sled::Tree,
    set: sled::Tree,
    list: sled::Tree,
    zset: sled::Tree,
}

fn encode_entry_bytes(value: &[u8], ttl: u32, ts: u64, meta: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(20 + value.len());
    buf.put_u32(ttl);
    buf.put_u64(ts);
    buf.put_u64(meta);
    buf.put_slice(value);
    buf.freeze()
}

fn decode_entry_bytes(key: &[u8], raw: &[u8]) -> Option<Entry> {
    if raw.len() < 20 {
        return None;
    }
    let mut buf = Bytes::copy_from_slice(raw);
    let ttl = buf.get_u32();
    let ts = buf.get_u64();
    let meta = buf.get_u64();
    Some(Entry {
        key: Bytes::copy_from_slice(key),
        value: buf,
        ttl,
        ts,
        meta,
    })
}

fn require_key(key: &[u8]) -> Result<(), EngineError> {
    if key.is_empty() {
        Err(EngineError::ParamsEmpty)
    } else {
        Ok(())
    }
}

fn norm_index(idx: i32, len: usize) -> i64 {
    if idx < 0 {
        len as i64 + idx as i64
    } else {
        idx as i64
    }
}

impl Bucket {
    // ── transaction family ────────────────────────────────────────────

    pub fn put(&self, key: &[u8], value: &[u8], ttl: u32, ts: u64) -> Result<(), EngineError> {
        require_key(key)?;
        self.main
            .insert(key, encode_entry_bytes(value, ttl, ts, 0).to_vec())
            .map_err(|e| EngineError::TransactionPutKey(e.to_string()))?;
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
        require_key(key)?;
        self.main
            .remove(key)
            .map_err(|e| EngineError::TransactionCommit(e.to_string()))?;
        Ok(())
    }

    pub fn get(&self, key: &[u8], now_ms: u64) -> Result<Option<Entry>, EngineError> {
        require_key(key)?;
        let raw = self
            .main
            .get(key)
            .map_err(|e| EngineError::TransactionInit(e.to_string()))?;
        Ok(raw.and_then(|raw| {
            let entry = decode_entry_bytes(key, &raw)?;
            if ttl::is_expired(entry.ts, entry.ttl, now_ms) {
                None
            } else {
                Some(entry)
            }
        }))
    }

    pub fn get_all(&self, now_ms: u64) -> Result<Vec<Entry>, EngineError> {
        let mut out = Vec::new();
        for item in self.main.iter() {
            let (k, v) = item.map_err(|e| EngineError::TransactionInit(e.to_string()))?;
            if let Some(entry) = decode_entry_bytes(&k, &v) {
                if !ttl::is_expired(entry.ts, entry.ttl, now_ms) {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }

    pub fn range_scan(&self, start: &[u8], end: &[u8], now_ms: u64) -> Result<Vec<Entry>, EngineError> {
        let mut out = Vec::new();
        for item in self.main.range(start.to_vec()..end.to_vec()) {
            let (k, v) = item.map_err(|e| EngineError::TransactionInit(e.to_string()))?;
            if let Some(entry) = decode_entry_bytes(&k, &v) {
                if !ttl::is_expired(entry.ts, entry.ttl, now_ms) {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }

    pub fn prefix_scan(
        &self,
        prefix: &[u8],
        offset: i32,
        limit: i32,
        now_ms: u64,
    ) -> Result<(Vec<Entry>, i32), EngineError> {
        self.prefix_search_scan(prefix, None, offset, limit, now_ms)
    }

    pub fn prefix_search_scan(
        &self,
        prefix: &[u8],
        pattern: Option<&Regex>,
        offset: i32,
        limit: i32,
        now_ms: u64,
    ) -> Result<(Vec<Entry>, i32), EngineError> {
        if limit <= 0 {
            return Ok((Vec::new(), 0));
        }
        let mut matched = Vec::new();
        for item in self.main.scan_prefix(prefix) {
            let (k, v) = item.map_err(|e| EngineError::TransactionInit(e.to_string()))?;
            if let Some(pat) = pattern {
                if !pat.is_match(&String::from_utf8_lossy(&k)) {
                    continue;
                }
            }
            if let Some(entry) = decode_entry_bytes(&k, &v) {
                if !ttl::is_expired(entry.ts, entry.ttl, now_ms) {
                    matched.push(entry);
                }
            }
        }
        let offset = offset.max(0) as usize;
        if offset >= matched.len() {
            return Ok((Vec::new(), 0));
        }
        let end = (offset + limit as usize).min(matched.len());
        let page = matched[offset..end].to_vec();
        let next_off = if end < matched.len() { end as i32 } else { 0 };
        Ok((page, next_off))
    }

    // ── set family ─────────────────────────────────────────────────────

    pub fn sadd(&self, key: &[u8], members: &[Bytes]) -> Result<(), EngineError> {
        require_key(key)?;
        for m in members {
            self.set
                .insert(collections::set_member_key(key, m), &[])
                .map_err(|e| EngineError::TransactionPutKey(e.to_string()))?;
        }
        Ok(())
    }

    pub fn srem(&self, key: &[u8], members: &[Bytes]) -> Result<(), EngineError> {
        require_key(key)?;
        for m in members {
            self.set
                .remove(collections::set_member_key(key, m))
                .map_err(|e| EngineError::TransactionCommit(e.to_string()))?;
        }
        Ok(())
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool, EngineError> {
        require_key(key)?;
        Ok(self
            .set
            .contains_key(collections::set_member_key(key, member))
            .map_err(|e| EngineError::TransactionInit(e.to_string()))?)
    }

    pub fn smembers(&self, key: &[u8]) -> Result<Vec<Bytes>, EngineError> {
        require_key(key)?;
        let (start, end) = collections::set_range(key);
        let prefix_len = start.len();
        let mut out = Vec::new();
        for item in self.set.range(start..end) {
            let (k, _) = item.map_err(|e| EngineError::TransactionInit(e.to_string()))?;
            out.push(Bytes::copy_from_slice(&k[prefix_len..]));
        }
        Ok(out)
    }

    pub fn scard(&self, key: &[u8]) -> Result<i32, EngineError> {
        Ok(self.smembers(key)?.len() as i32)
    }

    // ── list family ────────────────────────────────────────────────────

    fn list_bounds(&self, key: &[u8]) -> Result<(i64, i64), EngineError> {
        let head = self
            .list
            .get(collections::list_head_key(key))
            .map_err(|e| EngineError::TransactionInit(e.to_string()))?
            .map(|v| i64::from_be_bytes(v.as_ref().try_into().unwrap_or_default()))
            .unwrap_or(0);
        let tail = self
            .list
            .get(collections::list_tail_key(key))
            .map_err(|e| EngineError::TransactionInit(e.to_string()))?
            .map(|v| i64::from_be_bytes(v.as_ref().try_into().unwrap_or_default()))
            .unwrap_or(0);
        Ok((head, tail))
    }

    fn set_list_bounds(&self, key: &[u8], head: i64, tail: i64) -> Result<(), EngineError> {
        self.list
            .insert(collections::list_head_key(key), &head.to_be_bytes())
            .map_err(|e| EngineError::TransactionPutKey(e.to_string()))?;
        self.list
            .insert(collections::list_tail_key(key), &tail.to_be_bytes())
            .map_err(|e| EngineError::TransactionPutKey(e.to_string()))?;
        Ok(())
    }

    pub fn lpush(&self, key: &[u8], values: &[Bytes]) -> Result<(), EngineError> {
        require_key(key)?;
        let (mut head, tail) = self.list_bounds(key)?;
        for v in values {
            head -= 1;
            self.list
                .insert(collections::list_elem_key(key, head), v.to_vec())
                .map_err(|e| EngineError::TransactionPutKey(e.to_string()))?;
        }
        self.set_list_bounds(key, head, tail)
    }

    pub fn rpush(&self, key: &[u8], values: &[Bytes]) -> Result<(), EngineError> {
        require_key(key)?;
        let (head, mut tail) = self.list_bounds(key)?;
        for v in values {
            self.list
                .insert(collections::list_elem_key(key, tail), v.to_vec())
                .map_err(|e| EngineError::TransactionPutKey(e.to_string()))?;
            tail += 1;
        }
        self.set_list_bounds(key, head, tail)
    }

    pub fn lpop(&self, key: &[u8]) -> Result<Option<Bytes>, EngineError> {
        require_key(key)?;
        let (head, tail) = self.list_bounds(key)?;
        if head >= tail {
            return Ok(None);
        }
        let elem_key = collections::list_elem_key(key, head);
        let v = self
            .list
            .remove(&elem_key)
            .map_err(|e| EngineError::TransactionCommit(e.to_string()))?;
        self.set_list_bounds(key, head + 1, tail)?;
        Ok(v.map(|v| Bytes::copy_from_slice(&v)))
    }

    pub fn rpop(&self, key: &[u8]) -> Result<Option<Bytes>, EngineError> {
        require_key(key)?;
        let (head, tail) = self.list_bounds(key)?;
        if head >= tail {
            return Ok(None);
        }
        let elem_key = collections::list_elem_key(key, tail - 1);
        let v = self
            .list
            .remove(&elem_key)
            .map_err(|e| EngineError::TransactionCommit(e.to_string()))?;
        self.set_list_bounds(key, head, tail - 1)?;
        Ok(v.map(|v| Bytes::copy_from_slice(&v)))
    }

    pub fn llen(&self, key: &[u8]) -> Result<i32, EngineError> {
        let (head, tail) = self.list_bounds(key)?;
        Ok((tail - head).max(0) as i32)
    }

    fn list_elements(&self, key: &[u8]) -> Result<Vec<Bytes>, EngineError> {
        let (start, end) = collections::list_elem_range(key);
        let mut out = Vec::new();
        for item in self.list.range(start..end) {
            let (_, v) = item.map_err(|e| EngineError::TransactionInit(e.to_string()))?;
            out.push(Bytes::copy_from_slice(&v));
        }
        Ok(out)
    }

    pub fn lrange(&self, key: &[u8], start: i32, end: i32) -> Result<Vec<Bytes>, EngineError> {
        let all = self.list_elements(key)?;
        if all.is_empty() {
            return Ok(Vec::new());
        }
        let len = all.len();
        let s = norm_index(start, len).max(0);
        let e = norm_index(end, len).min(len as i64 - 1);
        if s > e {
            return Ok(Vec::new());
        }
        Ok(all[s as usize..=(e as usize)].to_vec())
    }

    pub fn lindex(&self, key: &[u8], index: i32) -> Result<Option<Bytes>, EngineError> {
        let all = self.list_elements(key)?;
        let idx = norm_index(index, all.len());
        if idx < 0 || idx as usize >= all.len() {
            return Ok(None);
        }
        Ok(Some(all[idx as usize].clone()))
    }

    pub fn lset(&self, key: &[u8], index: i32, value: &[u8]) -> Result<(), EngineError> {
        let (head, tail) = self.list_bounds(key)?;
        let len = (tail - head).max(0) as usize;
        let idx = norm_index(index, len);
        if idx < 0 || idx as usize >= len {
            return Err(EngineError::IndexOutOfRange { index: index as i64, len });
        }
        let pos = head + idx;
        self.list
            .insert(collections::list_elem_key(key, pos), value.to_vec())
            .map_err(|e| EngineError::TransactionPutKey(e.to_string()))?;
        Ok(())
    }

    pub fn ltrim(&self, key: &[u8], start: i32, end: i32) -> Result<(), EngineError> {
        let (head, tail) = self.list_bounds(key)?;
        let len = (tail - head).max(0) as usize;
        if len == 0 {
            return Ok(());
        }
        let s = norm_index(start, len).max(0);
        let e = norm_index(end, len).min(len as i64 - 1);
        if s > e {
            // trim everything
            for pos in head..tail {
                let _ = self.list.remove(collections::list_elem_key(key, pos));
            }
            return self.set_list_bounds(key, 0, 0);
        }
        let keep_start = head + s;
        let keep_end = head + e;
        for pos in head..keep_start {
            let _ = self.list.remove(collections::list_elem_key(key, pos));
        }
        for pos in (keep_end + 1)..tail {
            let _ = self.list.remove(collections::list_elem_key(key, pos));
        }
        self.set_list_bounds(key, keep_start, keep_end + 1)
    }

    pub fn lrem(&self, key: &[u8], count: i32, value: &[u8]) -> Result<i32, EngineError> {
        let (head, tail) = self.list_bounds(key)?;
        let positions: Vec<i64> = (head..tail).collect();
        let mut removed = 0;
        let iter: Box<dyn Iterator<Item = &i64>> = if count < 0 {
            Box::new(positions.iter().rev())
        } else {
            Box::new(positions.iter())
        };
        let limit = if count == 0 { i64::MAX } else { count.unsigned_abs() as i64 };
        for &pos in iter {
            if removed as i64 >= limit {
                break;
            }
            let k = collections::list_elem_key(key, pos);
            if let Some(v) = self
                .list
                .get(&k)
                .map_err(|e| EngineError::TransactionInit(e.to_string()))?
            {
                if v.as_ref() == value {
                    self.list
                        .remove(&k)
                        .map_err(|e| EngineError::TransactionCommit(e.to_string()))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    // ── sorted-set family ──────────────────────────────────────────────

    pub fn zadd(&self, key: &[u8], score: f64, member: &[u8]) -> Result<(), EngineError> {
        require_key(key)?;
        let score_key = collections::zset_score_key(key, member);
        if let Some(old) = self
            .zset
            .get(&score_key)
            .map_err(|e| EngineError::TransactionInit(e.to_string()))?
        {
            let old_score = f64::from_be_bytes(old.as_ref().try_into().unwrap_or_default());
            self.zset
                .remove(collections::zset_rank_key(key, old_score, member))
                .map_err(|e| EngineError::TransactionCommit(e.to_string()))?;
        }
        self.zset
            .insert(&score_key, &score.to_be_bytes())
            .map_err(|e| EngineError::TransactionPutKey(e.to_string()))?;
        self.zset
            .insert(collections::zset_rank_key(key, score, member), &[])
            .map_err(|e| EngineError::TransactionPutKey(e.to_string()))?;
        Ok(())
    }

    pub fn zrem(&self, key: &[u8], members: &[Bytes]) -> Result<(), EngineError> {
        for m in members {
            let score_key = collections::zset_score_key(key, m);
            if let Some(old) = self
                .zset
                .remove(&score_key)
                .map_err(|e| EngineError::TransactionCommit(e.to_string()))?
            {
                let old_score = f64::from_be_bytes(old.as_ref().try_into().unwrap_or_default());
                self.zset
                    .remove(collections::zset_rank_key(key, old_score, m))
                    .map_err(|e| EngineError::TransactionCommit(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>, EngineError> {
        Ok(self
            .zset
            .get(collections::zset_score_key(key, member))
            .map_err(|e| EngineError::TransactionInit(e.to_string()))?
            .map(|v| f64::from_be_bytes(v.as_ref().try_into().unwrap_or_default())))
    }

    fn zset_ordered(&self, key: &[u8]) -> Result<Vec<ZNode>, EngineError> {
        let (start, end) = collections::zset_rank_range(key);
        let prefix_len = start.len();
        let mut out = Vec::new();
        for item in self.zset.range(start..end) {
            let (k, _) = item.map_err(|e| EngineError::TransactionInit(e.to_string()))?;
            let (member, score) = collections::split_rank_key(prefix_len, &k);
            out.push(ZNode { key: member, score });
        }
        Ok(out)
    }

    pub fn zcard(&self, key: &[u8]) -> Result<i32, EngineError> {
        Ok(self.zset_ordered(key)?.len() as i32)
    }

    pub fn zrank(&self, key: &[u8], member: &[u8]) -> Result<Option<i32>, EngineError> {
        let ordered = self.zset_ordered(key)?;
        Ok(ordered.iter().position(|n| n.key.as_ref() == member).map(|p| p as i32))
    }

    pub fn zcount(&self, key: &[u8], min: f64, max: f64) -> Result<i32, EngineError> {
        Ok(self
            .zset_ordered(key)?
            .into_iter()
            .filter(|n| n.score >= min && n.score <= max)
            .count() as i32)
    }

    pub fn zrange_by_score(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
        limit: i32,
        exclude_start: bool,
        exclude_end: bool,
    ) -> Result<Vec<ZNode>, EngineError> {
        let ordered = self.zset_ordered(key)?;
        let mut out: Vec<ZNode> = ordered
            .into_iter()
            .filter(|n| {
                let above_min = if exclude_start { n.score > min } else { n.score >= min };
                let below_max = if exclude_end { n.score < max } else { n.score <= max };
                above_min && below_max
            })
            .collect();
        if limit > 0 {
            out.truncate(limit as usize);
        }
        Ok(out)
    }

    pub fn zrange_by_rank(&self, key: &[u8], start: i32, end: i32) -> Result<Vec<ZNode>, EngineError> {
        let ordered = self.zset_ordered(key)?;
        if ordered.is_empty() {
            return Ok(Vec::new());
        }
        let len = ordered.len();
        let s = norm_index(start, len).max(0);
        let e = norm_index(end, len).min(len as i64 - 1);
        if s > e {
            return Ok(Vec::new());
        }
        Ok(ordered[s as usize..=(e as usize)].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_bucket() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(dir.path(), &EngineOptions::default()).unwrap();
        (dir, engine)
    }

    #[test]
    fn put_get_roundtrip_with_ttl() {
        let (_dir, engine) = open_bucket();
        let bucket = engine.bucket("b").unwrap();
        bucket.put(b"k", b"v", 0, 1_000).unwrap();
        let entry = bucket.get(b"k", 2_000).unwrap().unwrap();
        assert_eq!(entry.value.as_ref(), b"v");
    }

    #[test]
    fn ttl_expiry_hides_entry() {
        let (_dir, engine) = open_bucket();
        let bucket = engine.bucket("b").unwrap();
        bucket.put(b"k", b"v", 1, 1_000).unwrap();
        assert!(bucket.get(b"k", 1_000).unwrap().is_some());
        assert!(bucket.get(b"k", 2_001).unwrap().is_none());
    }

    #[test]
    fn list_push_pop_and_range() {
        let (_dir, engine) = open_bucket();
        let bucket = engine.bucket("b").unwrap();
        bucket
            .lpush(b"L", &[Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")])
            .unwrap();
        // LPush pushes one at a time in order, each new head precedes the last,
        // so pushing a,b,c head-first yields c,b,a.
        assert_eq!(
            bucket.lrange(b"L", 0, -1).unwrap(),
            vec![Bytes::from_static(b"c"), Bytes::from_static(b"b"), Bytes::from_static(b"a")]
        );
        bucket.rpush(b"L", &[Bytes::from_static(b"d")]).unwrap();
        assert_eq!(
            bucket.lrange(b"L", 0, -1).unwrap(),
            vec![
                Bytes::from_static(b"c"),
                Bytes::from_static(b"b"),
                Bytes::from_static(b"a"),
                Bytes::from_static(b"d")
            ]
        );
    }

    #[test]
    fn zadd_updates_score_in_place() {
        let (_dir, engine) = open_bucket();
        let bucket = engine.bucket("b").unwrap();
        bucket.zadd(b"Z", 1.0, b"m1").unwrap();
        bucket.zadd(b"Z", 2.5, b"m2").unwrap();
        bucket.zadd(b"Z", 2.5, b"m3").unwrap();
        assert_eq!(bucket.zcount(b"Z", 2.0, 3.0).unwrap(), 2);
        bucket.zadd(b"Z", 0.5, b"m2").unwrap();
        assert_eq!(bucket.zscore(b"Z", b"m2").unwrap(), Some(0.5));
        assert_eq!(bucket.zrank(b"Z", b"m2").unwrap(), Some(0));
    }

    #[test]
    fn set_membership() {
        let (_dir, engine) = open_bucket();
        let bucket = engine.bucket("b").unwrap();
        bucket.sadd(b"S", &[Bytes::from_static(b"x"), Bytes::from_static(b"y")]).unwrap();
        assert!(bucket.sismember(b"S", b"x").unwrap());
        assert_eq!(bucket.scard(b"S").unwrap(), 2);
        bucket.srem(b"S", &[Bytes::from_static(b"x")]).unwrap();
        assert!(!bucket.sismember(b"S", b"x").unwrap());
    }
}
