//! Deterministic cache keys for one call's arguments.
//!
//! Encoding rules:
//! - Every value is prefixed by a one-byte tag, so `Int(1)` and `Str("1")`
//!   never collide.
//! - Strings and containers are length-prefixed (u64 LE); no separators to escape.
//! - Positional arguments come first, then named arguments in call order.
//!   Order is significant: `f(a=1, b=2)` and `f(b=2, a=1)` are distinct keys.
//! - `Opaque` values are rejected with `NotCacheableError`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::call::{Args, Value};
use crate::error::{Error, Result};

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_LIST: u8 = 0x05;
const TAG_RECORD: u8 = 0x06;
const TAG_PRINCIPAL: u8 = 0x07;

/// Opaque, hashable cache key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Bytes);

impl Fingerprint {
    /// Default fingerprint of positional then named arguments.
    pub fn of(args: &Args) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(64);

        put_len(&mut buf, args.positional_values().len());
        for (i, v) in args.positional_values().iter().enumerate() {
            encode_value(&mut buf, v).map_err(|label| reject(format!("args[{i}]"), label))?;
        }

        put_len(&mut buf, args.named_values().len());
        for (k, v) in args.named_values() {
            put_str(&mut buf, k);
            encode_value(&mut buf, v).map_err(|label| reject(k.clone(), label))?;
        }

        Ok(Self(buf.freeze()))
    }

    /// Key produced by a custom key function.
    pub fn from_key(key: impl AsRef<[u8]>) -> Self {
        Self(Bytes::copy_from_slice(key.as_ref()))
    }

    /// Raw encoded key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Fingerprint(")?;
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        f.write_str(")")
    }
}

fn reject(position: String, label: String) -> Error {
    Error::not_cacheable(format!(
        "argument {position} holds {label}, which has identity rather than value semantics"
    ))
    .with_field("position", position)
}

fn put_len(buf: &mut BytesMut, n: usize) {
    buf.put_u64_le(n as u64);
}

fn put_str(buf: &mut BytesMut, s: &str) {
    put_len(buf, s.len());
    buf.put_slice(s.as_bytes());
}

/// Err carries a description of the first value that cannot be encoded.
fn encode_value(buf: &mut BytesMut, v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Null => buf.put_u8(TAG_NULL),
        Value::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(u8::from(*b));
        }
        Value::Int(i) => {
            buf.put_u8(TAG_INT);
            buf.put_i64_le(*i);
        }
        Value::Float(f) => {
            buf.put_u8(TAG_FLOAT);
            // -0.0 == 0.0, so they must share a key.
            let f = if *f == 0.0 { 0.0 } else { *f };
            buf.put_u64_le(f.to_bits());
        }
        Value::Str(s) => {
            buf.put_u8(TAG_STR);
            put_str(buf, s);
        }
        Value::List(items) => {
            buf.put_u8(TAG_LIST);
            put_len(buf, items.len());
            for item in items {
                encode_value(buf, item)?;
            }
        }
        Value::Record(fields) => {
            buf.put_u8(TAG_RECORD);
            put_len(buf, fields.len());
            for (k, item) in fields {
                put_str(buf, k);
                encode_value(buf, item)?;
            }
        }
        Value::Principal(p) => {
            buf.put_u8(TAG_PRINCIPAL);
            put_str(buf, &p.id);
            put_str(buf, &p.role);
        }
        Value::Opaque(o) => return Err(format!("opaque value `{}`", o.label())),
    }
    Ok(())
}
