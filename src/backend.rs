//! The OS capability set consumed by the access layer.
//!
//! [`RegistryBackend`] is the only seam between this crate and the operating
//! system. Implementations return raw [`OsCode`]s and never interpret them;
//! translation into [`crate::RegistryError`] happens above this boundary.

use crate::types::RootKey;
use std::fmt;
use std::time::Duration;

/// Result of a single backend call.
pub type OsResult<T> = std::result::Result<T, OsCode>;

/// Raw OS failure code (a Win32 `ERROR_*` value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsCode(pub u32);

impl fmt::Display for OsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WinError {}", self.0)
    }
}

/// Opaque key handle issued by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawKey(pub isize);

/// Desired access when opening a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `KEY_READ`
    Read,
    /// `KEY_READ | KEY_WRITE`
    ReadWrite,
}

impl Access {
    /// `KEY_READ`
    pub const KEY_READ: u32 = 0x0002_0019;
    /// `KEY_WRITE`
    pub const KEY_WRITE: u32 = 0x0002_0006;

    /// Native access mask.
    pub fn mask(&self) -> u32 {
        match self {
            Access::Read => Self::KEY_READ,
            Access::ReadWrite => Self::KEY_READ | Self::KEY_WRITE,
        }
    }

    /// True if the access allows mutation.
    pub fn is_write(&self) -> bool {
        matches!(self, Access::ReadWrite)
    }
}

/// Registry view to address on 64-bit hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum View {
    /// The view native to the host.
    #[default]
    Native,
    /// The 32-bit redirected view (`KEY_WOW64_32KEY`).
    Registry32,
}

impl View {
    /// `KEY_WOW64_32KEY`
    pub const KEY_WOW64_32KEY: u32 = 0x0200;

    /// Selects the view from a "use 32-bit view" flag.
    pub fn from_flag(access_32bit_view: bool) -> Self {
        if access_32bit_view {
            View::Registry32
        } else {
            View::Native
        }
    }

    /// Bits to OR into an access mask.
    pub fn flags(&self) -> u32 {
        match self {
            View::Native => 0,
            View::Registry32 => Self::KEY_WOW64_32KEY,
        }
    }
}

/// One entry produced by value enumeration: name, type code, raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawValue {
    /// Value name (`""` is the default value).
    pub name: String,
    /// Raw type code.
    pub type_code: u32,
    /// Raw data bytes.
    pub data: Vec<u8>,
}

/// Key metadata as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyInfo {
    /// Number of immediate subkeys.
    pub subkey_count: u32,
    /// Number of values.
    pub value_count: u32,
    /// Last write time as a Windows FILETIME.
    pub last_write_time: u64,
}

/// The registry, environment and process-security primitives this crate is
/// built on.
///
/// Paths passed here are absolute below `root`, backslash-separated, and may
/// be empty to address the root itself. Every handle returned by
/// [`open_key`](Self::open_key) or [`create_key`](Self::create_key) must be
/// released with [`close_key`](Self::close_key); [`crate::handle::KeyScope`]
/// is the only caller that does so.
pub trait RegistryBackend {
    /// Opens an existing key.
    fn open_key(&self, root: RootKey, path: &str, view: View, access: Access) -> OsResult<RawKey>;

    /// Opens a key, creating it and any missing ancestors.
    fn create_key(&self, root: RootKey, path: &str, view: View, access: Access) -> OsResult<RawKey>;

    /// Reads a value's type code and raw bytes.
    fn query_value(&self, key: RawKey, name: &str) -> OsResult<(u32, Vec<u8>)>;

    /// Writes a value.
    fn set_value(&self, key: RawKey, name: &str, type_code: u32, data: &[u8]) -> OsResult<()>;

    /// Removes a value.
    fn delete_value(&self, key: RawKey, name: &str) -> OsResult<()>;

    /// Removes the empty subkey `name` of `parent`.
    fn delete_key(&self, parent: RawKey, name: &str, view: View) -> OsResult<()>;

    /// Returns the value at `index`, or `None` past the end.
    fn enum_value(&self, key: RawKey, index: u32) -> OsResult<Option<RawValue>>;

    /// Returns the subkey name at `index`, or `None` past the end.
    fn enum_key(&self, key: RawKey, index: u32) -> OsResult<Option<String>>;

    /// Reads subkey count, value count and last write time.
    fn query_info_key(&self, key: RawKey) -> OsResult<RawKeyInfo>;

    /// Releases a handle.
    fn close_key(&self, key: RawKey) -> OsResult<()>;

    /// Replaces `%VAR%` references with the current environment.
    fn expand_environment_strings(&self, text: &str) -> OsResult<String>;

    /// Returns the integrity RID of the current process token.
    ///
    /// `Ok(None)` means the token held no usable integrity SID.
    fn integrity_level(&self) -> OsResult<Option<u32>>;

    /// Broadcasts `WM_SETTINGCHANGE` for `area` to all top-level windows.
    fn broadcast_setting_change(&self, area: Option<&str>, timeout: Duration) -> OsResult<()>;
}

impl<B: RegistryBackend + ?Sized> RegistryBackend for &B {
    fn open_key(&self, root: RootKey, path: &str, view: View, access: Access) -> OsResult<RawKey> {
        (**self).open_key(root, path, view, access)
    }

    fn create_key(
        &self,
        root: RootKey,
        path: &str,
        view: View,
        access: Access,
    ) -> OsResult<RawKey> {
        (**self).create_key(root, path, view, access)
    }

    fn query_value(&self, key: RawKey, name: &str) -> OsResult<(u32, Vec<u8>)> {
        (**self).query_value(key, name)
    }

    fn set_value(&self, key: RawKey, name: &str, type_code: u32, data: &[u8]) -> OsResult<()> {
        (**self).set_value(key, name, type_code, data)
    }

    fn delete_value(&self, key: RawKey, name: &str) -> OsResult<()> {
        (**self).delete_value(key, name)
    }

    fn delete_key(&self, parent: RawKey, name: &str, view: View) -> OsResult<()> {
        (**self).delete_key(parent, name, view)
    }

    fn enum_value(&self, key: RawKey, index: u32) -> OsResult<Option<RawValue>> {
        (**self).enum_value(key, index)
    }

    fn enum_key(&self, key: RawKey, index: u32) -> OsResult<Option<String>> {
        (**self).enum_key(key, index)
    }

    fn query_info_key(&self, key: RawKey) -> OsResult<RawKeyInfo> {
        (**self).query_info_key(key)
    }

    fn close_key(&self, key: RawKey) -> OsResult<()> {
        (**self).close_key(key)
    }

    fn expand_environment_strings(&self, text: &str) -> OsResult<String> {
        (**self).expand_environment_strings(text)
    }

    fn integrity_level(&self) -> OsResult<Option<u32>> {
        (**self).integrity_level()
    }

    fn broadcast_setting_change(&self, area: Option<&str>, timeout: Duration) -> OsResult<()> {
        (**self).broadcast_setting_change(area, timeout)
    }
}
