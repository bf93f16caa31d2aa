//! Registry value encoding, decoding and expansion.
//!
//! Application data enters as [`RegData`], one of four input shapes, and
//! leaves as [`ValueData`]. The raw representation in between is the
//! `(type code, bytes)` pair the OS stores.

use crate::backend::RegistryBackend;
use crate::error::{RegistryError, Result};
use crate::types::ValueType;
use crate::utils::{decode_utf16_lossy, read_utf16_string, utf16_bytes_with_null};
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use tracing::{debug, warn};

/// Application data to be written.
///
/// Inference follows the variant order: text, integer, bytes, text list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegData {
    /// Text.
    Text(String),
    /// Any integer; range is checked against the target encoding.
    Integer(i128),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered list of text.
    TextList(Vec<String>),
}

impl RegData {
    fn shape(&self) -> &'static str {
        match self {
            RegData::Text(_) => "text",
            RegData::Integer(_) => "integer",
            RegData::Bytes(_) => "bytes",
            RegData::TextList(_) => "text list",
        }
    }
}

impl From<&str> for RegData {
    fn from(value: &str) -> Self {
        RegData::Text(value.to_string())
    }
}

impl From<String> for RegData {
    fn from(value: String) -> Self {
        RegData::Text(value)
    }
}

impl From<&String> for RegData {
    fn from(value: &String) -> Self {
        RegData::Text(value.clone())
    }
}

macro_rules! integer_reg_data {
    ($($t:ty),*) => {
        $(
            impl From<$t> for RegData {
                fn from(value: $t) -> Self {
                    RegData::Integer(value as i128)
                }
            }
        )*
    };
}

integer_reg_data!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl From<Vec<u8>> for RegData {
    fn from(value: Vec<u8>) -> Self {
        RegData::Bytes(value)
    }
}

impl From<&[u8]> for RegData {
    fn from(value: &[u8]) -> Self {
        RegData::Bytes(value.to_vec())
    }
}

impl From<Vec<String>> for RegData {
    fn from(value: Vec<String>) -> Self {
        RegData::TextList(value)
    }
}

impl From<Vec<&str>> for RegData {
    fn from(value: Vec<&str>) -> Self {
        RegData::TextList(value.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for RegData {
    fn from(value: &[&str]) -> Self {
        RegData::TextList(value.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[String]> for RegData {
    fn from(value: &[String]) -> Self {
        RegData::TextList(value.to_vec())
    }
}

/// Decoded registry value data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueData {
    /// `REG_SZ`
    String(String),
    /// `REG_EXPAND_SZ`, unexpanded.
    ExpandString(String),
    /// `REG_BINARY`
    Binary(Vec<u8>),
    /// `REG_DWORD`
    Dword(u32),
    /// `REG_MULTI_SZ`
    MultiString(Vec<String>),
    /// `REG_QWORD`
    Qword(u64),
    /// Raw bytes of an encoding this crate does not interpret.
    Unsupported(Vec<u8>),
}

impl ValueData {
    /// Re-encodes the data into its raw byte form.
    ///
    /// `Unsupported` data is returned unchanged.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            ValueData::String(s) => encode_text(s),
            ValueData::ExpandString(s) => encode_text(s),
            ValueData::Binary(b) | ValueData::Unsupported(b) => Ok(b.clone()),
            ValueData::Dword(d) => Ok(d.to_le_bytes().to_vec()),
            ValueData::MultiString(items) => encode_multi_string(items),
            ValueData::Qword(q) => Ok(q.to_le_bytes().to_vec()),
        }
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueData::String(s) | ValueData::ExpandString(s) => f.write_str(s),
            ValueData::Binary(b) | ValueData::Unsupported(b) => f.write_str(&hex::encode(b)),
            ValueData::Dword(d) => write!(f, "{} (0x{:08X})", d, d),
            ValueData::Qword(q) => write!(f, "{} (0x{:016X})", q, q),
            ValueData::MultiString(strings) => f.write_str(&strings.join(", ")),
        }
    }
}

/// Picks the encoding for data written without an explicit type.
pub fn infer_value_type(data: &RegData) -> Result<ValueType> {
    let inferred = match data {
        RegData::Text(_) => ValueType::String,
        RegData::Integer(v) => {
            if u32::try_from(*v).is_err() {
                return Err(RegistryError::validation(format!(
                    "Integer {} is outside the REG_DWORD range (0 to 2^32-1); \
                     request REG_QWORD explicitly for 64-bit data",
                    v
                )));
            }
            ValueType::Dword
        }
        RegData::Bytes(_) => ValueType::Binary,
        RegData::TextList(_) => ValueType::MultiString,
    };
    debug!(shape = data.shape(), inferred = %inferred, "Inferred registry type");
    Ok(inferred)
}

/// Encodes application data into `(type, bytes)`.
///
/// With `value_type` unset the type is inferred from the data's shape.
/// An explicit type must match the data's shape.
///
/// # Errors
///
/// Returns [`RegistryError::Validation`] when the data does not fit the
/// encoding: integer out of range, shape mismatch, embedded nulls, empty
/// list items, or an encoding the codec does not write.
pub fn encode(value_type: Option<ValueType>, data: &RegData) -> Result<(ValueType, Vec<u8>)> {
    let value_type = match value_type {
        Some(value_type) => value_type,
        None => infer_value_type(data)?,
    };

    let bytes = match (value_type, data) {
        (ValueType::String | ValueType::ExpandString, RegData::Text(s)) => encode_text(s)?,
        (ValueType::Dword, RegData::Integer(v)) => {
            let v = u32::try_from(*v).map_err(|_| {
                RegistryError::validation(format!("Integer {} is out of range for REG_DWORD", v))
            })?;
            v.to_le_bytes().to_vec()
        }
        (ValueType::Qword, RegData::Integer(v)) => {
            let v = u64::try_from(*v).map_err(|_| {
                RegistryError::validation(format!("Integer {} is out of range for REG_QWORD", v))
            })?;
            v.to_le_bytes().to_vec()
        }
        (ValueType::Binary, RegData::Bytes(b)) => b.clone(),
        (ValueType::MultiString, RegData::TextList(items)) => encode_multi_string(items)?,
        (ValueType::Other(code), _) => {
            return Err(RegistryError::validation(format!(
                "Writing {} values is not supported",
                ValueType::Other(code).name()
            )))
        }
        (value_type, data) => {
            return Err(RegistryError::validation(format!(
                "{} data cannot be stored as {}",
                data.shape(),
                value_type
            )))
        }
    };

    Ok((value_type, bytes))
}

/// Decodes raw bytes for the given type code.
///
/// Never fails: short integers are zero-extended, malformed text is decoded
/// lossily, and unknown encodings come back as [`ValueData::Unsupported`].
pub fn decode(type_code: u32, raw: &[u8]) -> ValueData {
    match ValueType::from_u32(type_code) {
        ValueType::String => ValueData::String(read_utf16_string(raw)),
        ValueType::ExpandString => ValueData::ExpandString(read_utf16_string(raw)),
        ValueType::Binary => ValueData::Binary(raw.to_vec()),
        ValueType::Dword => {
            let mut buf = [0u8; 4];
            let len = raw.len().min(4);
            buf[..len].copy_from_slice(&raw[..len]);
            ValueData::Dword(LittleEndian::read_u32(&buf))
        }
        ValueType::Qword => {
            let mut buf = [0u8; 8];
            let len = raw.len().min(8);
            buf[..len].copy_from_slice(&raw[..len]);
            ValueData::Qword(LittleEndian::read_u64(&buf))
        }
        ValueType::MultiString => ValueData::MultiString(decode_multi_string(raw)),
        ValueType::Other(_) => ValueData::Unsupported(raw.to_vec()),
    }
}

/// Expands `%VAR%` references through the backend.
///
/// # Errors
///
/// Returns [`RegistryError::Expansion`] if the backend call fails.
pub fn expand<B: RegistryBackend + ?Sized>(backend: &B, text: &str) -> Result<String> {
    backend
        .expand_environment_strings(text)
        .map_err(|code| RegistryError::Expansion {
            text: text.to_string(),
            code: code.0,
        })
}

fn encode_text(s: &str) -> Result<Vec<u8>> {
    if s.contains('\0') {
        return Err(RegistryError::validation("Text data must not contain null characters"));
    }
    Ok(utf16_bytes_with_null(s))
}

fn encode_multi_string(items: &[String]) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for item in items {
        if item.is_empty() {
            return Err(RegistryError::validation(
                "REG_MULTI_SZ items must not be empty; an empty item terminates the list",
            ));
        }
        bytes.extend(encode_text(item)?);
    }
    bytes.extend_from_slice(&[0, 0]);
    Ok(bytes)
}

fn decode_multi_string(raw: &[u8]) -> Vec<String> {
    decode_utf16_lossy(raw)
        .split('\0')
        .take_while(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// A value read from the registry.
///
/// An immutable snapshot; it holds no link back to the key it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegistryValue {
    name: String,
    data: ValueData,
    type_code: u32,
    expanded: Option<String>,
}

impl RegistryValue {
    /// Creates a value without expansion.
    pub fn new(name: impl Into<String>, data: ValueData, type_code: u32) -> Self {
        Self {
            name: name.into(),
            data,
            type_code,
            expanded: None,
        }
    }

    /// Decodes raw bytes and, for `REG_EXPAND_SZ`, expands the text through
    /// the backend. If expansion fails the unexpanded text is kept.
    ///
    /// Expansion happens here, at read time, so the snapshot reflects the
    /// environment when the value was read. Every expandable value in a
    /// listing is expanded, whether or not the caller asks for it.
    pub fn from_raw<B: RegistryBackend + ?Sized>(
        backend: &B,
        name: impl Into<String>,
        type_code: u32,
        raw: &[u8],
    ) -> Self {
        let name = name.into();
        let data = decode(type_code, raw);
        let expanded = match &data {
            ValueData::ExpandString(text) => match expand(backend, text) {
                Ok(expanded) => Some(expanded),
                Err(e) => {
                    warn!(value = %name, error = %e, "Expansion failed, keeping unexpanded data");
                    Some(text.clone())
                }
            },
            _ => None,
        };

        Self {
            name,
            data,
            type_code,
            expanded,
        }
    }

    /// Value name (`""` is the default value).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decoded data.
    pub fn data(&self) -> &ValueData {
        &self.data
    }

    /// Raw type code.
    pub fn type_code(&self) -> u32 {
        self.type_code
    }

    /// Value type.
    pub fn value_type(&self) -> ValueType {
        ValueType::from_u32(self.type_code)
    }

    /// Type name such as `"REG_SZ"`.
    pub fn type_name(&self) -> String {
        self.value_type().name()
    }

    /// Expanded text for `REG_EXPAND_SZ` values, `None` for every other type.
    pub fn expanded_data(&self) -> Option<&str> {
        self.expanded.as_deref()
    }

    /// Text of a `REG_SZ` or `REG_EXPAND_SZ` value.
    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            ValueData::String(s) | ValueData::ExpandString(s) => Some(s),
            _ => None,
        }
    }

    /// Integer of a `REG_DWORD` value.
    pub fn as_u32(&self) -> Option<u32> {
        match self.data {
            ValueData::Dword(d) => Some(d),
            _ => None,
        }
    }

    /// Integer of a `REG_DWORD` or `REG_QWORD` value.
    pub fn as_u64(&self) -> Option<u64> {
        match self.data {
            ValueData::Dword(d) => Some(u64::from(d)),
            ValueData::Qword(q) => Some(q),
            _ => None,
        }
    }

    /// Bytes of a `REG_BINARY` or uninterpreted value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ValueData::Binary(b) | ValueData::Unsupported(b) => Some(b),
            _ => None,
        }
    }

    /// Items of a `REG_MULTI_SZ` value.
    pub fn as_strings(&self) -> Option<&[String]> {
        match &self.data {
            ValueData::MultiString(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {} ({})", self.name, self.data, self.type_name())
    }
}
