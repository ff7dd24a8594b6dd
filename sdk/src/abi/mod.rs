//! Schema-driven binary layout for account data and instruction payloads
//!
//! A [`Schema`] is an ordered list of typed fields; field order defines byte
//! offsets. Integers are little-endian at fixed width, booleans a single
//! byte, fixed byte arrays are zero-padded or truncated to their declared
//! width, and variable-length arrays carry a `u32` element-count prefix.
//! Missing values are rejected with [`AbiError::MissingField`] rather than
//! zero-filled.

mod types;
mod value;

pub use types::{FieldType, ADDRESS_WIDTH, LENGTH_PREFIX_WIDTH, MAX_FIELD_WIDTH};
pub use value::{StructValue, Value};

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("Invalid field type: {0:?}")]
    InvalidType(String),

    #[error("Duplicate field key: {0}")]
    DuplicateKey(String),

    #[error("Missing value for field: {0}")]
    MissingField(String),

    #[error("Field {key} expects {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: String,
        found: &'static str,
    },

    #[error("Value {value} out of range for field {key} ({ty})")]
    OutOfRange { key: String, ty: String, value: i128 },

    #[error("Field {0} has no fixed width")]
    Unsized(String),

    #[error("Truncated buffer: expected at least {expected} bytes, got {actual}")]
    TruncatedBuffer { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, AbiError>;

/// A named, typed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

impl Field {
    pub fn new(key: impl Into<String>, ty: FieldType) -> Self {
        Self { key: key.into(), ty }
    }

    /// Build a field from a textual type tag such as `"u64"` or `"[u8;32]"`.
    pub fn parse(key: impl Into<String>, tag: &str) -> Result<Self> {
        Ok(Self::new(key, tag.parse()?))
    }
}

/// Ordered sequence of uniquely keyed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.key.as_str()) {
                return Err(AbiError::DuplicateKey(field.key.clone()));
            }
            field.ty.validate()?;
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total encoded width of a schema made of fixed-width fields.
    pub fn span(&self) -> Result<usize> {
        self.fields.iter().try_fold(0usize, |acc, field| {
            let width = field
                .ty
                .width()
                .ok_or_else(|| AbiError::Unsized(field.key.clone()))?;
            acc.checked_add(width)
                .ok_or_else(|| AbiError::InvalidType(field.ty.to_string()))
        })
    }

    /// Current encoded width of `values`, including variable-length fields.
    pub fn encoded_len(&self, values: &StructValue) -> Result<usize> {
        self.encode(values).map(|bytes| bytes.len())
    }

    pub fn encode(&self, values: &StructValue) -> Result<Vec<u8>> {
        let capacity = self.span().unwrap_or_default().min(MAX_FIELD_WIDTH);
        let mut out = Vec::with_capacity(capacity);
        for field in &self.fields {
            let value = values
                .get(&field.key)
                .ok_or_else(|| AbiError::MissingField(field.key.clone()))?;
            encode_value(&field.key, &field.ty, value, &mut out)?;
        }
        Ok(out)
    }

    /// Decode the leading bytes of `data`. Trailing bytes are ignored.
    pub fn decode(&self, data: &[u8]) -> Result<StructValue> {
        if let Ok(span) = self.span() {
            if data.len() < span {
                return Err(AbiError::TruncatedBuffer {
                    expected: span,
                    actual: data.len(),
                });
            }
        }

        let mut reader = Reader { data, offset: 0 };
        let mut values = StructValue::new();
        for field in &self.fields {
            let value = decode_value(&field.ty, &mut reader)?;
            values.insert(field.key.clone(), value);
        }
        Ok(values)
    }
}

impl TryFrom<Vec<Field>> for Schema {
    type Error = AbiError;

    fn try_from(fields: Vec<Field>) -> Result<Self> {
        Schema::new(fields)
    }
}

impl From<Schema> for Vec<Field> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

/// Concatenate independently encoded segments, e.g. an opcode byte followed
/// by a struct payload.
pub fn pack<S: AsRef<[u8]>>(segments: &[S]) -> Vec<u8> {
    let total = segments.iter().map(|s| s.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for segment in segments {
        out.extend_from_slice(segment.as_ref());
    }
    out
}

fn encode_value(key: &str, ty: &FieldType, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    let mismatch = || AbiError::TypeMismatch {
        key: key.to_string(),
        expected: ty.to_string(),
        found: value.kind(),
    };

    if let Some((min, max)) = ty.int_range() {
        let v = value.as_int().ok_or_else(mismatch)?;
        if v < min || v > max {
            return Err(AbiError::OutOfRange {
                key: key.to_string(),
                ty: ty.to_string(),
                value: v,
            });
        }
        let width = ty.width().unwrap_or_default();
        let bytes = if ty.is_signed() {
            (v as i64).to_le_bytes()
        } else {
            (v as u64).to_le_bytes()
        };
        out.extend_from_slice(&bytes[..width]);
        return Ok(());
    }

    match (ty, value) {
        (FieldType::Bool, Value::Bool(b)) => out.push(u8::from(*b)),
        (FieldType::Address, Value::Address(address)) => out.extend_from_slice(address.as_ref()),
        (FieldType::Bytes(len), Value::Bytes(bytes)) => {
            let copied = bytes.len().min(*len);
            out.extend_from_slice(&bytes[..copied]);
            out.resize(out.len() + (*len - copied), 0);
        }
        (FieldType::Array(inner), Value::Array(items)) => {
            let count = u32::try_from(items.len()).map_err(|_| AbiError::OutOfRange {
                key: key.to_string(),
                ty: ty.to_string(),
                value: items.len() as i128,
            })?;
            out.extend_from_slice(&count.to_le_bytes());
            for (i, item) in items.iter().enumerate() {
                encode_value(&format!("{}[{}]", key, i), inner, item, out)?;
            }
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(AbiError::TruncatedBuffer {
                expected: self.offset.saturating_add(len),
                actual: self.data.len(),
            })?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

fn decode_value(ty: &FieldType, reader: &mut Reader<'_>) -> Result<Value> {
    if ty.int_range().is_some() {
        let width = ty.width().unwrap_or_default();
        let bytes = reader.take(width)?;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(bytes);
        if ty.is_signed() && bytes[width - 1] & 0x80 != 0 {
            buf[width..].fill(0xff);
        }
        let v = if ty.is_signed() {
            i64::from_le_bytes(buf) as i128
        } else {
            u64::from_le_bytes(buf) as i128
        };
        return Ok(Value::Int(v));
    }

    let value = match ty {
        FieldType::Bool => Value::Bool(reader.take(1)?[0] != 0),
        FieldType::Address => {
            let mut address = [0u8; ADDRESS_WIDTH];
            address.copy_from_slice(reader.take(ADDRESS_WIDTH)?);
            Value::Address(Pubkey::new_from_array(address))
        }
        FieldType::Bytes(len) => Value::Bytes(reader.take(*len)?.to_vec()),
        FieldType::Array(inner) => {
            let mut prefix = [0u8; LENGTH_PREFIX_WIDTH];
            prefix.copy_from_slice(reader.take(LENGTH_PREFIX_WIDTH)?);
            let count = u32::from_le_bytes(prefix) as usize;
            // Every element occupies at least one byte
            if count > reader.remaining() {
                return Err(AbiError::TruncatedBuffer {
                    expected: reader.offset.saturating_add(count),
                    actual: reader.data.len(),
                });
            }
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_value(inner, reader)?);
            }
            Value::Array(items)
        }
        // integer types handled above
        _ => return Err(AbiError::InvalidType(ty.to_string())),
    };
    Ok(value)
}
