//! The tagged, self-describing element type carried inside a command
//! request or response tuple.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// A range-by-score query modifier (`ZRangeByScore`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOpts {
    pub limit: i32,
    pub exclude_start: bool,
    pub exclude_end: bool,
}

/// A single sorted-set member and its score, as returned by `ZRange*`.
#[derive(Debug, Clone, PartialEq)]
pub struct ZNode {
    pub key: Bytes,
    pub score: f64,
}

/// A stored KV entry, as returned by `Get`/`GetAll`/range scans.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: Bytes,
    pub value: Bytes,
    pub ttl: u32,
    pub ts: u64,
    pub meta: u64,
}

/// One self-describing element of a command's argument or result tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F64(f64),
    Bytes(Bytes),
    Text(String),
    BytesList(Vec<Bytes>),
    Entry(Entry),
    EntryList(Vec<Entry>),
    ZNode(ZNode),
    ZNodeList(Vec<ZNode>),
    ScoreOpts(ScoreOpts),
    /// Absence of a value where one was requested (e.g. `Get` on a missing
    /// key), distinct from an empty result list.
    None,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F64(_) => "f64",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::BytesList(_) => "bytes_list",
            Value::Entry(_) => "entry",
            Value::EntryList(_) => "entry_list",
            Value::ZNode(_) => "znode",
            Value::ZNodeList(_) => "znode_list",
            Value::ScoreOpts(_) => "score_opts",
            Value::None => "none",
        }
    }
}

// Type tags. Stable across versions; never reordered, only appended to.
mod tag {
    pub const BOOL: u8 = 0;
    pub const I32: u8 = 1;
    pub const I64: u8 = 2;
    pub const U32: u8 = 3;
    pub const U64: u8 = 4;
    pub const F64: u8 = 5;
    pub const BYTES: u8 = 6;
    pub const TEXT: u8 = 7;
    pub const BYTES_LIST: u8 = 8;
    pub const ENTRY: u8 = 9;
    pub const ENTRY_LIST: u8 = 10;
    pub const ZNODE: u8 = 11;
    pub const ZNODE_LIST: u8 = 12;
    pub const SCORE_OPTS: u8 = 13;
    pub const NONE: u8 = 14;
}

fn put_bytes(buf: &mut BytesMut, b: &[u8]) {
    buf.put_u32(b.len() as u32);
    buf.put_slice(b);
}

fn get_bytes(buf: &mut Bytes, what: &'static str) -> Result<Bytes, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Truncated(what));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(CodecError::Truncated(what));
    }
    Ok(buf.copy_to_bytes(len))
}

fn put_str(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

fn get_str(buf: &mut Bytes, what: &'static str) -> Result<String, CodecError> {
    let bytes = get_bytes(buf, what)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::Truncated(what))
}

fn encode_entry(e: &Entry, buf: &mut BytesMut) {
    put_bytes(buf, &e.key);
    put_bytes(buf, &e.value);
    buf.put_u32(e.ttl);
    buf.put_u64(e.ts);
    buf.put_u64(e.meta);
}

fn decode_entry(buf: &mut Bytes) -> Result<Entry, CodecError> {
    let key = get_bytes(buf, "entry.key")?;
    let value = get_bytes(buf, "entry.value")?;
    if buf.remaining() < 20 {
        return Err(CodecError::Truncated("entry.ttl/ts/meta"));
    }
    let ttl = buf.get_u32();
    let ts = buf.get_u64();
    let meta = buf.get_u64();
    Ok(Entry {
        key,
        value,
        ttl,
        ts,
        meta,
    })
}

pub(crate) fn encode(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Bool(b) => {
            buf.put_u8(tag::BOOL);
            buf.put_u8(if *b { 1 } else { 0 });
        }
        Value::I32(v) => {
            buf.put_u8(tag::I32);
            buf.put_i32(*v);
        }
        Value::I64(v) => {
            buf.put_u8(tag::I64);
            buf.put_i64(*v);
        }
        Value::U32(v) => {
            buf.put_u8(tag::U32);
            buf.put_u32(*v);
        }
        Value::U64(v) => {
            buf.put_u8(tag::U64);
            buf.put_u64(*v);
        }
        Value::F64(v) => {
            buf.put_u8(tag::F64);
            buf.put_f64(*v);
        }
        Value::Bytes(b) => {
            buf.put_u8(tag::BYTES);
            put_bytes(buf, b);
        }
        Value::Text(s) => {
            buf.put_u8(tag::TEXT);
            put_str(buf, s);
        }
        Value::BytesList(list) => {
            buf.put_u8(tag::BYTES_LIST);
            buf.put_u32(list.len() as u32);
            for b in list {
                put_bytes(buf, b);
            }
        }
        Value::Entry(e) => {
            buf.put_u8(tag::ENTRY);
            encode_entry(e, buf);
        }
        Value::EntryList(list) => {
            buf.put_u8(tag::ENTRY_LIST);
            buf.put_u32(list.len() as u32);
            for e in list {
                encode_entry(e, buf);
            }
        }
        Value::ZNode(z) => {
            buf.put_u8(tag::ZNODE);
            put_bytes(buf, &z.key);
            buf.put_f64(z.score);
        }
        Value::ZNodeList(list) => {
            buf.put_u8(tag::ZNODE_LIST);
            buf.put_u32(list.len() as u32);
            for z in list {
                put_bytes(buf, &z.key);
                buf.put_f64(z.score);
            }
        }
        Value::ScoreOpts(opts) => {
            buf.put_u8(tag::SCORE_OPTS);
            buf.put_i32(opts.limit);
            buf.put_u8(opts.exclude_start as u8);
            buf.put_u8(opts.exclude_end as u8);
        }
        Value::None => buf.put_u8(tag::NONE),
    }
}

pub(crate) fn decode(buf: &mut Bytes) -> Result<Value, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::Truncated("value tag"));
    }
    let t = buf.get_u8();
    Ok(match t {
        tag::BOOL => {
            if buf.remaining() < 1 {
                return Err(CodecError::Truncated("bool"));
            }
            Value::Bool(buf.get_u8() != 0)
        }
        tag::I32 => {
            if buf.remaining() < 4 {
                return Err(CodecError::Truncated("i32"));
            }
            Value::I32(buf.get_i32())
        }
        tag::I64 => {
            if buf.remaining() < 8 {
                return Err(CodecError::Truncated("i64"));
            }
            Value::I64(buf.get_i64())
        }
        tag::U32 => {
            if buf.remaining() < 4 {
                return Err(CodecError::Truncated("u32"));
            }
            Value::U32(buf.get_u32())
        }
        tag::U64 => {
            if buf.remaining() < 8 {
                return Err(CodecError::Truncated("u64"));
            }
            Value::U64(buf.get_u64())
        }
        tag::F64 => {
            if buf.remaining() < 8 {
                return Err(CodecError::Truncated("f64"));
            }
            Value::F64(buf.get_f64())
        }
        tag::BYTES => Value::Bytes(get_bytes(buf, "bytes")?),
        tag::TEXT => Value::Text(get_str(buf, "text")?),
        tag::BYTES_LIST => {
            if buf.remaining() < 4 {
                return Err(CodecError::Truncated("bytes_list len"));
            }
            let n = buf.get_u32();
            let mut list = Vec::with_capacity(n as usize);
            for _ in 0..n {
                list.push(get_bytes(buf, "bytes_list element")?);
            }
            Value::BytesList(list)
        }
        tag::ENTRY => Value::Entry(decode_entry(buf)?),
        tag::ENTRY_LIST => {
            if buf.remaining() < 4 {
                return Err(CodecError::Truncated("entry_list len"));
            }
            let n = buf.get_u32();
            let mut list = Vec::with_capacity(n as usize);
            for _ in 0..n {
                list.push(decode_entry(buf)?);
            }
            Value::EntryList(list)
        }
        tag::ZNODE => {
            let key = get_bytes(buf, "znode.key")?;
            if buf.remaining() < 8 {
                return Err(CodecError::Truncated("znode.score"));
            }
            Value::ZNode(ZNode {
                key,
                score: buf.get_f64(),
            })
        }
        tag::ZNODE_LIST => {
            if buf.remaining() < 4 {
                return Err(CodecError::Truncated("znode_list len"));
            }
            let n = buf.get_u32();
            let mut list = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let key = get_bytes(buf, "znode_list.key")?;
                if buf.remaining() < 8 {
                    return Err(CodecError::Truncated("znode_list.score"));
                }
                list.push(ZNode {
                    key,
                    score: buf.get_f64(),
                });
            }
            Value::ZNodeList(list)
        }
        tag::SCORE_OPTS => {
            if buf.remaining() < 6 {
                return Err(CodecError::Truncated("score_opts"));
            }
            Value::ScoreOpts(ScoreOpts {
                limit: buf.get_i32(),
                exclude_start: buf.get_u8() != 0,
                exclude_end: buf.get_u8() != 0,
            })
        }
        tag::NONE => Value::None,
        other => return Err(CodecError::UnsupportedType(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Value) {
        let mut buf = BytesMut::new();
        encode(&v, &mut buf);
        let mut bytes = buf.freeze();
        assert_eq!(decode(&mut bytes).unwrap(), v);
        assert!(!bytes.has_remaining());
    }

    #[test]
    fn scalars_roundtrip() {
        roundtrip(Value::Bool(true));
        roundtrip(Value::I32(-5));
        roundtrip(Value::I64(i64::MIN));
        roundtrip(Value::U32(7));
        roundtrip(Value::U64(u64::MAX));
        roundtrip(Value::F64(1.5));
        roundtrip(Value::None);
    }

    #[test]
    fn composite_values_roundtrip() {
        roundtrip(Value::Bytes(Bytes::from_static(b"hi")));
        roundtrip(Value::Text("hello".into()));
        roundtrip(Value::BytesList(vec![
            Bytes::from_static(b"a"),
            Bytes::from_static(b"b"),
        ]));
        roundtrip(Value::Entry(Entry {
            key: Bytes::from_static(b"k"),
            value: Bytes::from_static(b"v"),
            ttl: 10,
            ts: 1000,
            meta: 0,
        }));
        roundtrip(Value::ZNode(ZNode {
            key: Bytes::from_static(b"m"),
            score: 2.5,
        }));
        roundtrip(Value::ScoreOpts(ScoreOpts {
            limit: 10,
            exclude_start: false,
            exclude_end: true,
        }));
    }

    #[test]
    fn unsupported_tag_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(200);
        let err = decode(&mut buf.freeze()).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedType(200)));
    }
}
