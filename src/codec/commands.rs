//! The closed command set and the explicit `CmdCode -> signature` table.
//!
//! Dispatch here is intentionally *not* reflective: every client façade
//! method builds its [`CommandRequest`](super::CommandRequest) with a
//! literal `CmdCode`, and every `CmdCode` has exactly one entry in
//! [`SIGNATURES`] checked by [`check_args`]. A bug in one command's
//! signature can never corrupt another's.

use crate::codec::value::Value;
use crate::error::CodecError;

/// Whether a command is replicated via the Raft log (`Propose`) or served
/// from a local read-index lookup (`Read`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Propose,
    Read,
}

/// The closed, dense set of commands the state machine understands.
/// `Unknown` is the decode sentinel for any code not in this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CmdCode {
    Put = 1,
    PutWithTimestamp = 2,
    Get = 3,
    GetAll = 4,
    RangeScan = 5,
    PrefixScan = 6,
    PrefixSearchScan = 7,
    Delete = 8,
    SAdd = 9,
    SRem = 10,
    SIsMember = 11,
    SMembers = 12,
    SCard = 13,
    LPush = 14,
    RPush = 15,
    LPop = 16,
    RPop = 17,
    LRange = 18,
    LRem = 19,
    LLen = 20,
    LSet = 21,
    LTrim = 22,
    LIndex = 23,
    ZAdd = 24,
    ZRem = 25,
    ZScore = 26,
    ZCard = 27,
    ZRank = 28,
    ZCount = 29,
    ZRangeByScore = 30,
    ZRangeByRank = 31,
}

impl CmdCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        use CmdCode::*;
        Some(match code {
            1 => Put,
            2 => PutWithTimestamp,
            3 => Get,
            4 => GetAll,
            5 => RangeScan,
            6 => PrefixScan,
            7 => PrefixSearchScan,
            8 => Delete,
            9 => SAdd,
            10 => SRem,
            11 => SIsMember,
            12 => SMembers,
            13 => SCard,
            14 => LPush,
            15 => RPush,
            16 => LPop,
            17 => RPop,
            18 => LRange,
            19 => LRem,
            20 => LLen,
            21 => LSet,
            22 => LTrim,
            23 => LIndex,
            24 => ZAdd,
            25 => ZRem,
            26 => ZScore,
            27 => ZCard,
            28 => ZRank,
            29 => ZCount,
            30 => ZRangeByScore,
            31 => ZRangeByRank,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        signature(self).name
    }

    pub fn kind(self) -> Kind {
        signature(self).kind
    }
}

/// Declared arg-tuple shape for one `CmdCode`.
pub struct Signature {
    pub name: &'static str,
    pub kind: Kind,
    pub args: &'static [&'static str],
}

macro_rules! sig {
    ($name:literal, $kind:expr, [$($t:literal),* $(,)?]) => {
        Signature { name: $name, kind: $kind, args: &[$($t),*] }
    };
}

fn signature(cmd: CmdCode) -> Signature {
    use CmdCode::*;
    use Kind::*;
    match cmd {
        Put => sig!("Put", Propose, ["text", "bytes", "bytes", "u32"]),
        PutWithTimestamp => sig!("PutWithTimestamp", Propose, ["text", "bytes", "bytes", "u32", "u64"]),
        Get => sig!("Get", Read, ["text", "bytes"]),
        GetAll => sig!("GetAll", Read, ["text"]),
        RangeScan => sig!("RangeScan", Read, ["text", "bytes", "bytes"]),
        PrefixScan => sig!("PrefixScan", Read, ["text", "bytes", "i32", "i32"]),
        PrefixSearchScan => sig!("PrefixSearchScan", Read, ["text", "bytes", "text", "i32", "i32"]),
        Delete => sig!("Delete", Propose, ["text", "bytes"]),
        SAdd => sig!("SAdd", Propose, ["text", "bytes", "bytes_list"]),
        SRem => sig!("SRem", Propose, ["text", "bytes", "bytes_list"]),
        SIsMember => sig!("SIsMember", Read, ["text", "bytes", "bytes"]),
        SMembers => sig!("SMembers", Read, ["text", "bytes"]),
        SCard => sig!("SCard", Read, ["text", "bytes"]),
        LPush => sig!("LPush", Propose, ["text", "bytes", "bytes_list"]),
        RPush => sig!("RPush", Propose, ["text", "bytes", "bytes_list"]),
        LPop => sig!("LPop", Propose, ["text", "bytes"]),
        RPop => sig!("RPop", Propose, ["text", "bytes"]),
        LRange => sig!("LRange", Read, ["text", "bytes", "i32", "i32"]),
        LRem => sig!("LRem", Propose, ["text", "bytes", "i32", "bytes"]),
        LLen => sig!("LLen", Read, ["text", "bytes"]),
        LSet => sig!("LSet", Propose, ["text", "bytes", "i32", "bytes"]),
        LTrim => sig!("LTrim", Propose, ["text", "bytes", "i32", "i32"]),
        LIndex => sig!("LIndex", Read, ["text", "bytes", "i32"]),
        ZAdd => sig!("ZAdd", Propose, ["text", "bytes", "f64", "bytes"]),
        ZRem => sig!("ZRem", Propose, ["text", "bytes", "bytes_list"]),
        ZScore => sig!("ZScore", Read, ["text", "bytes", "bytes"]),
        ZCard => sig!("ZCard", Read, ["text", "bytes"]),
        ZRank => sig!("ZRank", Read, ["text", "bytes", "bytes"]),
        ZCount => sig!("ZCount", Read, ["text", "bytes", "f64", "f64"]),
        ZRangeByScore => sig!("ZRangeByScore", Read, ["text", "bytes", "f64", "f64", "score_opts"]),
        ZRangeByRank => sig!("ZRangeByRank", Read, ["text", "bytes", "i32", "i32"]),
    }
}

/// Validates that `args` matches `cmd`'s declared arity and element types.
pub fn check_args(cmd: CmdCode, args: &[Value]) -> Result<(), CodecError> {
    let sig = signature(cmd);
    if args.len() != sig.args.len() {
        return Err(CodecError::ArityMismatch {
            cmd: sig.name,
            expected: sig.args.len(),
            got: args.len(),
        });
    }
    for (i, (arg, expected)) in args.iter().zip(sig.args.iter()).enumerate() {
        if arg.type_name() != *expected {
            return Err(CodecError::TypeMismatch {
                cmd: sig.name,
                index: i,
                expected,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_round_trips_through_from_u32() {
        for code in 1u32..=31 {
            let cmd = CmdCode::from_u32(code).expect("declared code");
            assert_eq!(cmd as u32, code);
        }
    }

    #[test]
    fn unknown_code_returns_none() {
        assert!(CmdCode::from_u32(0).is_none());
        assert!(CmdCode::from_u32(9999).is_none());
    }

    #[test]
    fn put_is_a_propose_command_get_is_a_read() {
        assert_eq!(CmdCode::Put.kind(), Kind::Propose);
        assert_eq!(CmdCode::Get.kind(), Kind::Read);
    }
}
