//! Field types understood by the account layout codec

use super::AbiError;
use serde::{Deserialize, Serialize};
use solana_sdk::system_instruction::MAX_PERMITTED_DATA_LENGTH;
use std::fmt;
use std::str::FromStr;

/// Width in bytes of an address field.
pub const ADDRESS_WIDTH: usize = 32;

/// Width in bytes of the element-count prefix of a variable-length array.
pub const LENGTH_PREFIX_WIDTH: usize = 4;

/// Largest fixed byte array a field may declare; no account holds more.
pub const MAX_FIELD_WIDTH: usize = MAX_PERMITTED_DATA_LENGTH as usize;

/// Closed set of field types.
///
/// Serialised as the textual tag used in register schema files, e.g.
/// `"u64"`, `"bool"`, `"pub"`, `"[u8;32]"` or `"[u16]"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Bool,
    /// 32-byte ledger address
    Address,
    /// Fixed-length byte array
    Bytes(usize),
    /// Variable-length array, prefixed by a little-endian `u32` element count
    Array(Box<FieldType>),
}

impl FieldType {
    /// Encoded width, or `None` when the width depends on the value.
    pub fn width(&self) -> Option<usize> {
        match self {
            FieldType::U8 | FieldType::I8 | FieldType::Bool => Some(1),
            FieldType::U16 | FieldType::I16 => Some(2),
            FieldType::U32 | FieldType::I32 => Some(4),
            FieldType::U64 | FieldType::I64 => Some(8),
            FieldType::Address => Some(ADDRESS_WIDTH),
            FieldType::Bytes(len) => Some(*len),
            FieldType::Array(_) => None,
        }
    }

    /// Reject layouts the codec cannot handle: byte arrays wider than any
    /// account, and array elements that occupy no bytes.
    pub fn validate(&self) -> Result<(), AbiError> {
        match self {
            FieldType::Bytes(len) if *len > MAX_FIELD_WIDTH => {
                Err(AbiError::InvalidType(self.to_string()))
            }
            FieldType::Array(inner) => {
                if inner.width() == Some(0) {
                    return Err(AbiError::InvalidType(self.to_string()));
                }
                inner.validate()
            }
            _ => Ok(()),
        }
    }

    /// Inclusive integer range for integer types.
    pub(crate) fn int_range(&self) -> Option<(i128, i128)> {
        match self {
            FieldType::U8 => Some((0, u8::MAX as i128)),
            FieldType::U16 => Some((0, u16::MAX as i128)),
            FieldType::U32 => Some((0, u32::MAX as i128)),
            FieldType::U64 => Some((0, u64::MAX as i128)),
            FieldType::I8 => Some((i8::MIN as i128, i8::MAX as i128)),
            FieldType::I16 => Some((i16::MIN as i128, i16::MAX as i128)),
            FieldType::I32 => Some((i32::MIN as i128, i32::MAX as i128)),
            FieldType::I64 => Some((i64::MIN as i128, i64::MAX as i128)),
            _ => None,
        }
    }

    pub(crate) fn is_signed(&self) -> bool {
        matches!(
            self,
            FieldType::I8 | FieldType::I16 | FieldType::I32 | FieldType::I64
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::U8 => write!(f, "u8"),
            FieldType::U16 => write!(f, "u16"),
            FieldType::U32 => write!(f, "u32"),
            FieldType::U64 => write!(f, "u64"),
            FieldType::I8 => write!(f, "i8"),
            FieldType::I16 => write!(f, "i16"),
            FieldType::I32 => write!(f, "i32"),
            FieldType::I64 => write!(f, "i64"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Address => write!(f, "pub"),
            FieldType::Bytes(len) => write!(f, "[u8;{}]", len),
            FieldType::Array(inner) => write!(f, "[{}]", inner),
        }
    }
}

impl FromStr for FieldType {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        let parsed = match tag {
            "u8" => FieldType::U8,
            "u16" => FieldType::U16,
            "u32" => FieldType::U32,
            "u64" => FieldType::U64,
            "i8" => FieldType::I8,
            "i16" => FieldType::I16,
            "i32" => FieldType::I32,
            "i64" => FieldType::I64,
            "bool" => FieldType::Bool,
            "pub" => FieldType::Address,
            _ => {
                let inner = tag
                    .strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                    .ok_or_else(|| AbiError::InvalidType(s.to_string()))?;

                if inner.starts_with('[') {
                    FieldType::Array(Box::new(inner.parse()?))
                } else {
                    match inner.split_once(';') {
                        Some((elem, len)) => {
                            if elem.trim() != "u8" {
                                return Err(AbiError::InvalidType(s.to_string()));
                            }
                            let len = len
                                .trim()
                                .parse::<usize>()
                                .map_err(|_| AbiError::InvalidType(s.to_string()))?;
                            FieldType::Bytes(len)
                        }
                        None => FieldType::Array(Box::new(inner.parse()?)),
                    }
                }
            }
        };
        parsed.validate().map_err(|_| AbiError::InvalidType(s.to_string()))?;
        Ok(parsed)
    }
}

impl TryFrom<String> for FieldType {
    type Error = AbiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.to_string()
    }
}
