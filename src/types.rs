//! Root hive and value type identifiers.
//!
//! Both accept flexible input (names in any case, or native numeric values)
//! and resolve to a canonical enum. Unrecognized input fails with
//! [`RegistryError::InvalidIdentifier`].

use crate::error::{RegistryError, Result};
use std::fmt;

/// Well-known root hives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RootKey {
    /// `HKEY_CLASSES_ROOT`
    ClassesRoot,
    /// `HKEY_CURRENT_USER`
    CurrentUser,
    /// `HKEY_LOCAL_MACHINE`
    LocalMachine,
    /// `HKEY_USERS`
    Users,
    /// `HKEY_PERFORMANCE_DATA`
    PerformanceData,
    /// `HKEY_CURRENT_CONFIG`
    CurrentConfig,
    /// `HKEY_DYN_DATA`
    DynData,
}

/// Recognized root names, in lookup order. Short forms come first.
pub const ROOT_KEY_NAMES: [(&str, RootKey); 12] = [
    ("HKCR", RootKey::ClassesRoot),
    ("HKCU", RootKey::CurrentUser),
    ("HKLM", RootKey::LocalMachine),
    ("HKU", RootKey::Users),
    ("HKCC", RootKey::CurrentConfig),
    ("HKEY_CLASSES_ROOT", RootKey::ClassesRoot),
    ("HKEY_CURRENT_USER", RootKey::CurrentUser),
    ("HKEY_LOCAL_MACHINE", RootKey::LocalMachine),
    ("HKEY_USERS", RootKey::Users),
    ("HKEY_PERFORMANCE_DATA", RootKey::PerformanceData),
    ("HKEY_CURRENT_CONFIG", RootKey::CurrentConfig),
    ("HKEY_DYN_DATA", RootKey::DynData),
];

impl RootKey {
    /// All root hives, ordered by native handle value.
    pub const ALL: [RootKey; 7] = [
        RootKey::ClassesRoot,
        RootKey::CurrentUser,
        RootKey::LocalMachine,
        RootKey::Users,
        RootKey::PerformanceData,
        RootKey::CurrentConfig,
        RootKey::DynData,
    ];

    /// Native predefined handle value (`HKEY_*`).
    pub fn handle(&self) -> u32 {
        match self {
            RootKey::ClassesRoot => 0x8000_0000,
            RootKey::CurrentUser => 0x8000_0001,
            RootKey::LocalMachine => 0x8000_0002,
            RootKey::Users => 0x8000_0003,
            RootKey::PerformanceData => 0x8000_0004,
            RootKey::CurrentConfig => 0x8000_0005,
            RootKey::DynData => 0x8000_0006,
        }
    }

    /// Resolves a native predefined handle value.
    pub fn from_handle(handle: u32) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|root| root.handle() == handle)
            .ok_or_else(|| {
                RegistryError::invalid_identifier(format!("Unknown root key handle: {:#x}", handle))
            })
    }

    /// Full `HKEY_*` name.
    pub fn name(&self) -> &'static str {
        match self {
            RootKey::ClassesRoot => "HKEY_CLASSES_ROOT",
            RootKey::CurrentUser => "HKEY_CURRENT_USER",
            RootKey::LocalMachine => "HKEY_LOCAL_MACHINE",
            RootKey::Users => "HKEY_USERS",
            RootKey::PerformanceData => "HKEY_PERFORMANCE_DATA",
            RootKey::CurrentConfig => "HKEY_CURRENT_CONFIG",
            RootKey::DynData => "HKEY_DYN_DATA",
        }
    }

    /// Abbreviated name where one exists, the full name otherwise.
    pub fn short_name(&self) -> &'static str {
        match self {
            RootKey::ClassesRoot => "HKCR",
            RootKey::CurrentUser => "HKCU",
            RootKey::LocalMachine => "HKLM",
            RootKey::Users => "HKU",
            RootKey::CurrentConfig => "HKCC",
            other => other.name(),
        }
    }

    /// True for hives where writes typically require elevation.
    pub fn requires_elevation(&self) -> bool {
        matches!(
            self,
            RootKey::LocalMachine | RootKey::Users | RootKey::ClassesRoot | RootKey::CurrentConfig
        )
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for RootKey {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        ROOT_KEY_NAMES
            .iter()
            .find(|(name, _)| *name == upper)
            .map(|(_, root)| *root)
            .ok_or_else(|| {
                let valid: Vec<&str> = ROOT_KEY_NAMES.iter().map(|(name, _)| *name).collect();
                RegistryError::invalid_identifier(format!(
                    "Unknown root key: {}. Valid keys are: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

/// A root hive given by name or by native handle value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootIdentifier {
    /// Name such as `"HKCU"` or `"hkey_local_machine"`.
    Name(String),
    /// Native predefined handle value such as `0x80000001`.
    Handle(u32),
    /// Already resolved.
    Key(RootKey),
}

impl From<&str> for RootIdentifier {
    fn from(name: &str) -> Self {
        RootIdentifier::Name(name.to_string())
    }
}

impl From<String> for RootIdentifier {
    fn from(name: String) -> Self {
        RootIdentifier::Name(name)
    }
}

impl From<u32> for RootIdentifier {
    fn from(handle: u32) -> Self {
        RootIdentifier::Handle(handle)
    }
}

impl From<RootKey> for RootIdentifier {
    fn from(root: RootKey) -> Self {
        RootIdentifier::Key(root)
    }
}

/// Resolves a root hive name or handle to its canonical [`RootKey`].
///
/// # Examples
///
/// ```rust
/// use reg_env::{normalize_root_key, RootKey};
///
/// assert_eq!(normalize_root_key("hkcu").unwrap(), RootKey::CurrentUser);
/// assert_eq!(normalize_root_key(0x8000_0002u32).unwrap(), RootKey::LocalMachine);
/// assert!(normalize_root_key("HKXX").is_err());
/// ```
pub fn normalize_root_key(identifier: impl Into<RootIdentifier>) -> Result<RootKey> {
    match identifier.into() {
        RootIdentifier::Name(name) => name.parse(),
        RootIdentifier::Handle(handle) => RootKey::from_handle(handle),
        RootIdentifier::Key(root) => Ok(root),
    }
}

/// Registry value encodings.
///
/// Five encodings are fully interpreted, plus 64-bit integers. Everything
/// else is carried as [`ValueType::Other`] with its raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueType {
    /// `REG_SZ`
    String,
    /// `REG_EXPAND_SZ`
    ExpandString,
    /// `REG_BINARY`
    Binary,
    /// `REG_DWORD`
    Dword,
    /// `REG_MULTI_SZ`
    MultiString,
    /// `REG_QWORD`
    Qword,
    /// Any encoding this crate does not interpret.
    Other(u32),
}

/// `REG_NONE`
pub const REG_NONE: u32 = 0;
/// `REG_SZ`
pub const REG_SZ: u32 = 1;
/// `REG_EXPAND_SZ`
pub const REG_EXPAND_SZ: u32 = 2;
/// `REG_BINARY`
pub const REG_BINARY: u32 = 3;
/// `REG_DWORD`
pub const REG_DWORD: u32 = 4;
/// `REG_DWORD_BIG_ENDIAN`
pub const REG_DWORD_BIG_ENDIAN: u32 = 5;
/// `REG_LINK`
pub const REG_LINK: u32 = 6;
/// `REG_MULTI_SZ`
pub const REG_MULTI_SZ: u32 = 7;
/// `REG_RESOURCE_LIST`
pub const REG_RESOURCE_LIST: u32 = 8;
/// `REG_FULL_RESOURCE_DESCRIPTOR`
pub const REG_FULL_RESOURCE_DESCRIPTOR: u32 = 9;
/// `REG_RESOURCE_REQUIREMENTS_LIST`
pub const REG_RESOURCE_REQUIREMENTS_LIST: u32 = 10;
/// `REG_QWORD`
pub const REG_QWORD: u32 = 11;

/// Recognized type names, ordered by code. Lookup also accepts the
/// `REG_DWORD_LITTLE_ENDIAN` and `REG_QWORD_LITTLE_ENDIAN` aliases.
pub const REGISTRY_TYPE_NAMES: [(&str, u32); 12] = [
    ("REG_NONE", REG_NONE),
    ("REG_SZ", REG_SZ),
    ("REG_EXPAND_SZ", REG_EXPAND_SZ),
    ("REG_BINARY", REG_BINARY),
    ("REG_DWORD", REG_DWORD),
    ("REG_DWORD_BIG_ENDIAN", REG_DWORD_BIG_ENDIAN),
    ("REG_LINK", REG_LINK),
    ("REG_MULTI_SZ", REG_MULTI_SZ),
    ("REG_RESOURCE_LIST", REG_RESOURCE_LIST),
    ("REG_FULL_RESOURCE_DESCRIPTOR", REG_FULL_RESOURCE_DESCRIPTOR),
    ("REG_RESOURCE_REQUIREMENTS_LIST", REG_RESOURCE_REQUIREMENTS_LIST),
    ("REG_QWORD", REG_QWORD),
];

impl ValueType {
    /// Maps a raw type code. Never fails; unknown codes become `Other`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            REG_SZ => ValueType::String,
            REG_EXPAND_SZ => ValueType::ExpandString,
            REG_BINARY => ValueType::Binary,
            REG_DWORD => ValueType::Dword,
            REG_MULTI_SZ => ValueType::MultiString,
            REG_QWORD => ValueType::Qword,
            other => ValueType::Other(other),
        }
    }

    /// Canonical type code.
    pub fn code(&self) -> u32 {
        match self {
            ValueType::String => REG_SZ,
            ValueType::ExpandString => REG_EXPAND_SZ,
            ValueType::Binary => REG_BINARY,
            ValueType::Dword => REG_DWORD,
            ValueType::MultiString => REG_MULTI_SZ,
            ValueType::Qword => REG_QWORD,
            ValueType::Other(code) => *code,
        }
    }

    /// Canonical type name, e.g. `"REG_SZ"`.
    pub fn name(&self) -> String {
        let code = self.code();
        REGISTRY_TYPE_NAMES
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| format!("UnknownType({})", code))
    }

    /// True if the codec can encode and decode this type.
    pub fn is_supported(&self) -> bool {
        !matches!(self, ValueType::Other(_))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl std::str::FromStr for ValueType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let code = match upper.as_str() {
            "REG_DWORD_LITTLE_ENDIAN" => Some(REG_DWORD),
            "REG_QWORD_LITTLE_ENDIAN" => Some(REG_QWORD),
            _ => REGISTRY_TYPE_NAMES
                .iter()
                .find(|(name, _)| *name == upper)
                .map(|(_, code)| *code),
        };

        code.map(ValueType::from_u32).ok_or_else(|| {
            RegistryError::invalid_identifier(format!(
                "'{}' is not a recognized registry type name (e.g. 'REG_SZ', 'REG_DWORD')",
                s
            ))
        })
    }
}

/// A value type given by name or by code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeIdentifier {
    /// Name such as `"REG_SZ"`.
    Name(String),
    /// Raw code such as `4`.
    Code(u32),
    /// Already resolved.
    Type(ValueType),
}

impl From<&str> for TypeIdentifier {
    fn from(name: &str) -> Self {
        TypeIdentifier::Name(name.to_string())
    }
}

impl From<String> for TypeIdentifier {
    fn from(name: String) -> Self {
        TypeIdentifier::Name(name)
    }
}

impl From<u32> for TypeIdentifier {
    fn from(code: u32) -> Self {
        TypeIdentifier::Code(code)
    }
}

impl From<ValueType> for TypeIdentifier {
    fn from(value_type: ValueType) -> Self {
        TypeIdentifier::Type(value_type)
    }
}

/// Resolves a type name or code to its canonical [`ValueType`].
///
/// Codes outside the twelve standard `REG_*` types are rejected.
pub fn normalize_registry_type(identifier: impl Into<TypeIdentifier>) -> Result<ValueType> {
    match identifier.into() {
        TypeIdentifier::Name(name) => name.parse(),
        TypeIdentifier::Code(code) if code <= REG_QWORD => Ok(ValueType::from_u32(code)),
        TypeIdentifier::Code(code) => Err(RegistryError::invalid_identifier(format!(
            "{} does not correspond to a known registry type (REG_*)",
            code
        ))),
        TypeIdentifier::Type(value_type) => Ok(value_type),
    }
}
