//! Key-layout helpers for the list and sorted-set families, which are not
//! native to `sled` and are built atop a dedicated `sled::Tree` per family
//! (see `engine::Bucket`).
//!
//! **List** (`<bucket>$list` tree): each list lives under its key as a
//! header record (`list:head:<key>` -> head index, `list:tail:<key>` ->
//! tail index, both exclusive-future-push positions) plus one record per
//! element at `list:elem:<key>:<position>`, where `position` is encoded so
//! that `sled`'s natural byte-lexicographic key order matches list order
//! even for negative positions (`LPush` decrements below zero).
//!
//! **Sorted set** (`<bucket>$zset` tree): each member is stored twice —
//! once at `zset:score:<key>:<member>` -> score (for `O(1)` score lookup),
//! and once at `zset:rank:<key>:<sortable_score>:<member>` -> `()` (an
//! index letting range-by-score and rank queries walk the tree in score
//! order). `f64` scores are mapped to a byte-order-preserving `u64` via the
//! standard sign/exponent flip so the rank index sorts correctly.

use bytes::{BufMut, Bytes, BytesMut};

/// Maps an `i64` list position to a `u64` whose big-endian byte order
/// matches signed integer order (flips the sign bit).
pub fn encode_position(pos: i64) -> u64 {
    (pos as u64) ^ (1u64 << 63)
}

pub fn decode_position(raw: u64) -> i64 {
    (raw ^ (1u64 << 63)) as i64
}

/// Maps an `f64` score to a `u64` whose big-endian byte order matches IEEE
/// 754 total order for the common case (NaN is not a supported score).
pub fn encode_score(score: f64) -> u64 {
    let bits = score.to_bits();
    if bits & (1u64 << 63) != 0 {
        !bits
    } else {
        bits | (1u64 << 63)
    }
}

pub fn decode_score(raw: u64) -> f64 {
    let bits = if raw & (1u64 << 63) != 0 {
        raw & !(1u64 << 63)
    } else {
        !raw
    };
    f64::from_bits(bits)
}

fn key_prefixed(prefix: &str, key: &[u8]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(prefix.len() + 1 + key.len());
    out.put_slice(prefix.as_bytes());
    out.put_u8(0);
    out.put_slice(key);
    out.to_vec()
}

pub fn list_head_key(key: &[u8]) -> Vec<u8> {
    key_prefixed("list:head", key)
}

pub fn list_tail_key(key: &[u8]) -> Vec<u8> {
    key_prefixed("list:tail", key)
}

/// Key for the element at `position` within the list `key`.
pub fn list_elem_key(key: &[u8], position: i64) -> Vec<u8> {
    let mut out = key_prefixed("list:elem", key);
    out.put_u8(0);
    out.put_u64(encode_position(position));
    out
}

/// Start/end keys (inclusive/exclusive) bounding every element of list
/// `key`, for a full-range scan.
pub fn list_elem_range(key: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut start = key_prefixed("list:elem", key);
    start.push(0);
    let mut end = start.clone();
    *end.last_mut().unwrap() = 1;
    (start, end)
}

pub fn set_member_key(key: &[u8], member: &[u8]) -> Vec<u8> {
    let mut out = key_prefixed("set:member", key);
    out.put_u8(0);
    out.put_slice(member);
    out
}

pub fn set_range(key: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut start = key_prefixed("set:member", key);
    start.push(0);
    let mut end = start.clone();
    *end.last_mut().unwrap() = 1;
    (start, end)
}

pub fn zset_score_key(key: &[u8], member: &[u8]) -> Vec<u8> {
    let mut out = key_prefixed("zset:score", key);
    out.put_u8(0);
    out.put_slice(member);
    out
}

/// Key in the rank index: sorted by `(score, member)`.
pub fn zset_rank_key(key: &[u8], score: f64, member: &[u8]) -> Vec<u8> {
    let mut out = key_prefixed("zset:rank", key);
    out.put_u8(0);
    out.put_u64(encode_score(score));
    out.put_u8(0);
    out.put_slice(member);
    out
}

pub fn zset_rank_range(key: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut start = key_prefixed("zset:rank", key);
    start.push(0);
    let mut end = start.clone();
    *end.last_mut().unwrap() = 1;
    (start, end)
}

/// Splits a `zset:rank` index key back into `(member, score)`.
pub fn split_rank_key(prefix_len: usize, raw: &[u8]) -> (Bytes, f64) {
    let after_score_marker = prefix_len + 8 + 1;
    let score_bytes = &raw[prefix_len..prefix_len + 8];
    let mut arr = [0u8; 8];
    arr.copy_from_slice(score_bytes);
    let score = decode_score(u64::from_be_bytes(arr));
    let member = Bytes::copy_from_slice(&raw[after_score_marker..]);
    (member, score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_encoding_preserves_order() {
        let mut positions = vec![-3i64, -1, 0, 1, 5, -100, 100];
        let mut encoded: Vec<u64> = positions.iter().map(|&p| encode_position(p)).collect();
        encoded.sort();
        positions.sort();
        let decoded: Vec<i64> = encoded.into_iter().map(decode_position).collect();
        assert_eq!(decoded, positions);
    }

    #[test]
    fn score_encoding_preserves_order() {
        let mut scores = vec![-1.5f64, 0.0, 2.5, -100.25, 100.0, 2.5];
        let mut encoded: Vec<u64> = scores.iter().map(|&s| encode_score(s)).collect();
        encoded.sort();
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let decoded: Vec<f64> = encoded.into_iter().map(decode_score).collect();
        assert_eq!(decoded, scores);
    }
}
