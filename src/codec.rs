// ABOUTME: Wire codec — frame headers and the self-describing Value encoding
// ABOUTME: Framing (Session) only ever deals in byte buffers; this module is the only place that interprets them

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::TryFromPrimitive;
use std::io::Cursor;
use thiserror::Error;

use crate::registry::ObjectId;
use crate::value::{ExceptionValue, Value};

/// Constant that opens every frame. Readers resynchronize on this marker
/// after a corrupted or misaligned read.
pub const MAGIC: u16 = 0x4242;

/// Message taxonomy: which wire operation a frame carries.
#[derive(TryFromPrimitive, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    /// Caller expects exactly one terminating reply.
    Request = 0x1001,
    /// Caller expects zero or more YIELD frames followed by one terminating reply.
    RequestBlock = 0x1002,
    /// No reply expected at all.
    Oneway = 0x1003,
    /// Server acknowledges with NULL_MSG before running the call.
    OnewaySync = 0x1004,
    /// Successful terminating reply.
    Retval = 0x2001,
    /// Failing terminating reply.
    Exception = 0x2002,
    /// One block argument delivered mid-call.
    Yield = 0x2003,
    /// Round-trip drain: obj_id 0 is the request, obj_id 1 the response.
    Sync = 0x4001,
    /// Acknowledgement with no payload (used by ONEWAY_SYNC).
    NullMsg = 0x4002,
}

/// Fixed 8-byte frame header: magic, payload length, message type, object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u16,
    pub payload_len: u16,
    pub msg_type: MessageType,
    pub obj_id: ObjectId,
}

impl FrameHeader {
    pub const SIZE: usize = 8;

    pub fn new(msg_type: MessageType, obj_id: ObjectId, payload_len: u16) -> Self {
        FrameHeader {
            magic: MAGIC,
            payload_len,
            msg_type,
            obj_id,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.magic);
        buf.put_u16(self.payload_len);
        buf.put_u16(self.msg_type as u16);
        buf.put_u16(self.obj_id);
    }

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::Incomplete);
        }
        let magic = buf.get_u16();
        let payload_len = buf.get_u16();
        let msg_type_raw = buf.get_u16();
        let obj_id = buf.get_u16();

        let msg_type = MessageType::try_from(msg_type_raw)
            .map_err(|_| CodecError::InvalidMessageType(msg_type_raw))?;

        Ok(FrameHeader {
            magic,
            payload_len,
            msg_type,
            obj_id,
        })
    }
}

/// Errors raised while encoding or decoding wire payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("not enough data buffered yet")]
    Incomplete,

    #[error("bad magic: expected {expected:#06x}, got {actual:#06x}")]
    BadMagic { expected: u16, actual: u16 },

    #[error("invalid message type tag: {0:#06x}")]
    InvalidMessageType(u16),

    #[error("invalid value tag: {0:#04x}")]
    InvalidValueTag(u8),

    #[error("string field is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("resync budget exhausted looking for magic marker")]
    ResyncExhausted,
}

// --- Value tags -----------------------------------------------------------

const TAG_NIL: u8 = 0x00;
const TAG_TRUE: u8 = 0x01;
const TAG_FALSE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_ARRAY: u8 = 0x06;
const TAG_MAP: u8 = 0x07;
const TAG_OBJREF: u8 = 0x08;
const TAG_EXCEPTION: u8 = 0x09;

/// Encodes a [`Value`] into `buf` using the tagged binary format: one tag
/// byte, then a type-specific payload (length-prefixed for anything of
/// variable size).
pub fn encode_value(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Nil => buf.put_u8(TAG_NIL),
        Value::Bool(true) => buf.put_u8(TAG_TRUE),
        Value::Bool(false) => buf.put_u8(TAG_FALSE),
        Value::Int(n) => {
            buf.put_u8(TAG_INT);
            buf.put_i64(*n);
        }
        Value::Str(s) => {
            buf.put_u8(TAG_STR);
            let bytes = s.as_bytes();
            buf.put_u32(bytes.len() as u32);
            buf.put_slice(bytes);
        }
        Value::Bytes(b) => {
            buf.put_u8(TAG_BYTES);
            buf.put_u32(b.len() as u32);
            buf.put_slice(b);
        }
        Value::Array(items) => {
            buf.put_u8(TAG_ARRAY);
            buf.put_u32(items.len() as u32);
            for item in items {
                encode_value(item, buf);
            }
        }
        Value::Map(pairs) => {
            buf.put_u8(TAG_MAP);
            buf.put_u32(pairs.len() as u32);
            for (k, v) in pairs {
                encode_value(k, buf);
                encode_value(v, buf);
            }
        }
        Value::ObjectRef(id) => {
            buf.put_u8(TAG_OBJREF);
            buf.put_u16(*id);
        }
        Value::Exception(exc) => {
            buf.put_u8(TAG_EXCEPTION);
            encode_value(&Value::Str(exc.class_name.clone()), buf);
            encode_value(&Value::Str(exc.message.clone()), buf);
            buf.put_u32(exc.backtrace.len() as u32);
            for frame in &exc.backtrace {
                encode_value(&Value::Str(frame.clone()), buf);
            }
        }
    }
}

/// Decodes one [`Value`] from `buf`. `decode_value(encode_value(v)) == v`
/// for every value this module can produce, except that an `ObjectRef`
/// decoded on the client side is rewritten into a proxy by the client
/// layer, not by this function.
pub fn decode_value(buf: &mut Cursor<&[u8]>) -> Result<Value, CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::Incomplete);
    }
    let tag = buf.get_u8();
    match tag {
        TAG_NIL => Ok(Value::Nil),
        TAG_TRUE => Ok(Value::Bool(true)),
        TAG_FALSE => Ok(Value::Bool(false)),
        TAG_INT => {
            require(buf, 8)?;
            Ok(Value::Int(buf.get_i64()))
        }
        TAG_STR => decode_str_body(buf).map(Value::Str),
        TAG_BYTES => {
            let len = read_u32_len(buf)?;
            require(buf, len)?;
            let mut data = vec![0u8; len];
            buf.copy_to_slice(&mut data);
            Ok(Value::Bytes(Bytes::from(data)))
        }
        TAG_ARRAY => {
            let len = read_u32_len(buf)?;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(decode_value(buf)?);
            }
            Ok(Value::Array(items))
        }
        TAG_MAP => {
            let len = read_u32_len(buf)?;
            let mut pairs = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                let k = decode_value(buf)?;
                let v = decode_value(buf)?;
                pairs.push((k, v));
            }
            Ok(Value::Map(pairs))
        }
        TAG_OBJREF => {
            require(buf, 2)?;
            Ok(Value::ObjectRef(buf.get_u16()))
        }
        TAG_EXCEPTION => {
            let class_name = decode_string(buf)?;
            let message = decode_string(buf)?;
            let count = read_u32_len(buf)?;
            let mut backtrace = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                backtrace.push(decode_string(buf)?);
            }
            Ok(Value::Exception(ExceptionValue {
                class_name,
                message,
                backtrace,
            }))
        }
        other => Err(CodecError::InvalidValueTag(other)),
    }
}

fn require(buf: &Cursor<&[u8]>, n: usize) -> Result<(), CodecError> {
    if buf.remaining() < n {
        Err(CodecError::Incomplete)
    } else {
        Ok(())
    }
}

fn read_u32_len(buf: &mut Cursor<&[u8]>) -> Result<usize, CodecError> {
    require(buf, 4)?;
    Ok(buf.get_u32() as usize)
}

/// Decodes a string's length-prefixed body, assuming the `TAG_STR` byte
/// has already been consumed by the caller.
fn decode_str_body(buf: &mut Cursor<&[u8]>) -> Result<String, CodecError> {
    let len = read_u32_len(buf)?;
    require(buf, len)?;
    let mut data = vec![0u8; len];
    buf.copy_to_slice(&mut data);
    String::from_utf8(data).map_err(CodecError::from)
}

/// Decodes a full tagged string value (tag byte included). Used for
/// exception fields, which are always strings by construction.
fn decode_string(buf: &mut Cursor<&[u8]>) -> Result<String, CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::Incomplete);
    }
    let tag = buf.get_u8();
    if tag != TAG_STR {
        return Err(CodecError::InvalidValueTag(tag));
    }
    decode_str_body(buf)
}
