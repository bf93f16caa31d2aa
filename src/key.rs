//! Registry key metadata.

use crate::backend::RawKeyInfo;
use crate::utils::filetime_to_datetime;
use chrono::{DateTime, Utc};

/// Metadata snapshot of a single key at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegistryKeyInfo {
    /// Number of immediate subkeys.
    pub subkey_count: u32,

    /// Number of values, including the default value if set.
    pub value_count: u32,

    /// Last write time.
    pub last_write_time: DateTime<Utc>,
}

impl RegistryKeyInfo {
    /// Returns true if this key has subkeys.
    pub fn has_subkeys(&self) -> bool {
        self.subkey_count > 0
    }

    /// Returns true if this key has values.
    pub fn has_values(&self) -> bool {
        self.value_count > 0
    }

    /// Returns true if the key can be deleted.
    pub fn is_empty(&self) -> bool {
        !self.has_subkeys() && !self.has_values()
    }
}

impl From<RawKeyInfo> for RegistryKeyInfo {
    fn from(raw: RawKeyInfo) -> Self {
        Self {
            subkey_count: raw.subkey_count,
            value_count: raw.value_count,
            last_write_time: filetime_to_datetime(raw.last_write_time),
        }
    }
}
