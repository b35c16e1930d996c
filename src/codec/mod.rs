//! The self-describing command request/response envelope.
//!
//! `CommandRequest`/`CommandResponse` are the only values ever placed on the
//! Raft log or returned from an apply call. Encoding is hand-rolled rather
//! than handed to `bincode`/`serde_json` because the contract requires
//! self-describing element tags (so a decoder never needs an out-of-band
//! schema) and arity checking per [`CmdCode`] — properties a generic
//! serializer does not enforce for us. Every multi-byte integer and float is
//! written big-endian via [`bytes::BufMut`]/[`bytes::Buf`] so encoded bytes
//! are identical across platforms.

pub mod commands;
pub mod value;

pub use commands::CmdCode;
pub use value::Value;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// A typed, ordered command invocation: a [`CmdCode`] plus its argument
/// tuple. Constructed explicitly by the client façade — one literal
/// `CmdCode` per façade method, never inferred by reflection (see
/// `commands::signature`).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub cmd: CmdCode,
    pub args: Vec<Value>,
}

impl CommandRequest {
    pub fn new(cmd: CmdCode, args: Vec<Value>) -> Self {
        Self { cmd, args }
    }

    /// Validates `args` against the command's declared signature.
    pub fn check_signature(&self) -> Result<(), CodecError> {
        commands::check_args(self.cmd, &self.args)
    }
}

/// The outcome of executing a [`CommandRequest`]: either an error, or an
/// ordered tuple of result values matching the command's declared result
/// signature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandResponse {
    pub err: Option<String>,
    pub values: Vec<Value>,
}

impl CommandResponse {
    pub fn ok(values: Vec<Value>) -> Self {
        Self { err: None, values }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: Some(message.into()),
            values: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }
}

const FORMAT_VERSION: u8 = 1;

/// Encodes a request as `[version:u8][cmd:u32][argc:u16][arg...]`.
pub fn encode_request(req: &CommandRequest) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(FORMAT_VERSION);
    buf.put_u32(req.cmd as u32);
    buf.put_u16(req.args.len() as u16);
    for arg in &req.args {
        value::encode(arg, &mut buf);
    }
    buf.freeze()
}

/// Decodes a request previously produced by [`encode_request`], checking
/// arity against the command's declared signature.
pub fn decode_request(mut bytes: Bytes) -> Result<CommandRequest, CodecError> {
    if bytes.remaining() < 1 {
        return Err(CodecError::Truncated("request header"));
    }
    let _version = bytes.get_u8();
    if bytes.remaining() < 4 {
        return Err(CodecError::Truncated("request cmd code"));
    }
    let code = bytes.get_u32();
    let cmd = CmdCode::from_u32(code).ok_or(CodecError::UnknownCommand(code))?;

    if bytes.remaining() < 2 {
        return Err(CodecError::Truncated("request argc"));
    }
    let argc = bytes.get_u16() as usize;
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        args.push(value::decode(&mut bytes)?);
    }

    let req = CommandRequest { cmd, args };
    req.check_signature()?;
    Ok(req)
}

/// Encodes a response as `[version:u8][has_err:u8][err?][valc:u16][value...]`.
pub fn encode_result(resp: &CommandResponse) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(FORMAT_VERSION);
    match &resp.err {
        Some(msg) => {
            buf.put_u8(1);
            value::encode(&Value::Text(msg.clone()), &mut buf);
        }
        None => buf.put_u8(0),
    }
    buf.put_u16(resp.values.len() as u16);
    for v in &resp.values {
        value::encode(v, &mut buf);
    }
    buf.freeze()
}

/// Decodes a response previously produced by [`encode_result`].
pub fn decode_result(mut bytes: Bytes) -> Result<CommandResponse, CodecError> {
    if bytes.remaining() < 2 {
        return Err(CodecError::Truncated("response header"));
    }
    let _version = bytes.get_u8();
    let has_err = bytes.get_u8();
    let err = if has_err == 1 {
        match value::decode(&mut bytes)? {
            Value::Text(s) => Some(s),
            _ => return Err(CodecError::TypeMismatch {
                cmd: "<response>",
                index: 0,
                expected: "text",
            }),
        }
    } else {
        None
    };

    if bytes.remaining() < 2 {
        return Err(CodecError::Truncated("response valc"));
    }
    let valc = bytes.get_u16() as usize;
    let mut values = Vec::with_capacity(valc);
    for _ in 0..valc {
        values.push(value::decode(&mut bytes)?);
    }
    Ok(CommandResponse { err, values })
}

// `openraft`'s `AppData`/`AppDataResponse` bounds require `Serialize` +
// `Deserialize` (entries are persisted to the log and shipped over the wire).
// Rather than giving the Raft layer a second, independent serialization of
// the same data, these impls simply wrap the hand-rolled codec above so the
// one self-describing binary format is the only format a `CommandRequest`
// or `CommandResponse` is ever represented in, on disk or on the wire.
impl serde::Serialize for CommandRequest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&encode_request(self))
    }
}

impl<'de> serde::Deserialize<'de> for CommandRequest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Vec<u8> = serde::Deserialize::deserialize(deserializer)?;
        decode_request(Bytes::from(raw)).map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for CommandResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&encode_result(self))
    }
}

impl<'de> serde::Deserialize<'de> for CommandResponse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Vec<u8> = serde::Deserialize::deserialize(deserializer)?;
        decode_result(Bytes::from(raw)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips() {
        let req = CommandRequest::new(
            CmdCode::Put,
            vec![
                Value::Text("b".into()),
                Value::Bytes(Bytes::from_static(b"k")),
                Value::Bytes(Bytes::from_static(b"v")),
                Value::U32(0),
            ],
        );
        let bytes = encode_request(&req);
        let decoded = decode_request(bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn response_roundtrips_with_error() {
        let resp = CommandResponse::error("boom");
        let bytes = encode_result(&resp);
        assert_eq!(decode_result(bytes).unwrap(), resp);
    }

    #[test]
    fn response_roundtrips_with_values() {
        let resp = CommandResponse::ok(vec![Value::I64(-7), Value::Bool(true)]);
        let bytes = encode_result(&resp);
        assert_eq!(decode_result(bytes).unwrap(), resp);
    }

    #[test]
    fn unknown_command_code_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(FORMAT_VERSION);
        buf.put_u32(0xFFFF_FFFE);
        buf.put_u16(0);
        let err = decode_request(buf.freeze()).unwrap_err();
        assert!(matches!(err, CodecError::UnknownCommand(_)));
    }

    #[test]
    fn serde_bridge_roundtrips_through_json() {
        let req = CommandRequest::new(CmdCode::Get, vec![Value::Text("b".into()), Value::Bytes(Bytes::from_static(b"k"))]);
        let json = serde_json::to_vec(&req).unwrap();
        let back: CommandRequest = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(FORMAT_VERSION);
        buf.put_u32(CmdCode::Put as u32);
        buf.put_u16(1); // Put needs 4 args
        value::encode(&Value::Text("only-one".into()), &mut buf);
        let err = decode_request(buf.freeze()).unwrap_err();
        assert!(matches!(err, CodecError::ArityMismatch { .. }));
    }
}
