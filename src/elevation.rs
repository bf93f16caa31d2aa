//! Process integrity level and elevation.
//!
//! Nothing is cached: each call re-queries the process token.

use crate::backend::RegistryBackend;
use crate::error::{Operation, RegistryError, Result};
use std::fmt;
use tracing::debug;

/// Mandatory integrity level RID of a process token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntegrityLevel(pub u32);

impl IntegrityLevel {
    /// `SECURITY_MANDATORY_UNTRUSTED_RID`
    pub const UNTRUSTED: Self = Self(0x0000);
    /// `SECURITY_MANDATORY_LOW_RID`
    pub const LOW: Self = Self(0x1000);
    /// `SECURITY_MANDATORY_MEDIUM_RID`
    pub const MEDIUM: Self = Self(0x2000);
    /// `SECURITY_MANDATORY_MEDIUM_PLUS_RID`
    pub const MEDIUM_PLUS: Self = Self(0x2100);
    /// `SECURITY_MANDATORY_HIGH_RID`
    pub const HIGH: Self = Self(0x3000);
    /// `SECURITY_MANDATORY_SYSTEM_RID`
    pub const SYSTEM: Self = Self(0x4000);
    /// `SECURITY_MANDATORY_PROTECTED_PROCESS_RID`
    pub const PROTECTED_PROCESS: Self = Self(0x5000);

    /// Raw RID.
    pub fn rid(&self) -> u32 {
        self.0
    }

    /// True at `HIGH` or above.
    pub fn is_elevated(&self) -> bool {
        *self >= Self::HIGH
    }

    /// Descriptive name for known levels.
    pub fn name(&self) -> Option<&'static str> {
        match *self {
            Self::UNTRUSTED => Some("Untrusted"),
            Self::LOW => Some("Low"),
            Self::MEDIUM => Some("Medium"),
            Self::MEDIUM_PLUS => Some("Medium Plus"),
            Self::HIGH => Some("High"),
            Self::SYSTEM => Some("System"),
            Self::PROTECTED_PROCESS => Some("Protected Process"),
            _ => None,
        }
    }
}

impl fmt::Display for IntegrityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Unknown ({:#x})", self.0),
        }
    }
}

/// Queries the integrity level of the current process.
///
/// # Errors
///
/// [`RegistryError::Os`] if the token query fails, or
/// [`RegistryError::InvalidIdentifier`] if the token holds no usable
/// integrity SID.
pub fn get_integrity_level<B: RegistryBackend + ?Sized>(backend: &B) -> Result<IntegrityLevel> {
    let rid = backend
        .integrity_level()
        .map_err(|code| RegistryError::Os {
            operation: Operation::IntegrityLevel,
            path: "process token".to_string(),
            code: code.0,
        })?
        .ok_or_else(|| RegistryError::invalid_identifier("Integrity SID data appears invalid"))?;
    let level = IntegrityLevel(rid);
    debug!(%level, rid, "Queried process integrity level");
    Ok(level)
}

/// Returns true if the current process runs at `HIGH` integrity or above.
pub fn is_elevated<B: RegistryBackend + ?Sized>(backend: &B) -> Result<bool> {
    Ok(get_integrity_level(backend)?.is_elevated())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;

    #[test]
    fn test_threshold() {
        assert!(!IntegrityLevel::MEDIUM.is_elevated());
        assert!(!IntegrityLevel(0x2FFF).is_elevated());
        assert!(IntegrityLevel::HIGH.is_elevated());
        assert!(IntegrityLevel::SYSTEM.is_elevated());
    }

    #[test]
    fn test_names() {
        assert_eq!(IntegrityLevel::HIGH.to_string(), "High");
        assert_eq!(IntegrityLevel(0x1234).to_string(), "Unknown (0x1234)");
    }

    #[test]
    fn test_queries_backend_every_time() {
        let registry = MemoryRegistry::new();
        registry.set_integrity_level(Some(IntegrityLevel::MEDIUM.rid()));
        assert!(!is_elevated(&registry).unwrap());
        registry.set_integrity_level(Some(IntegrityLevel::HIGH.rid()));
        assert!(is_elevated(&registry).unwrap());
    }

    #[test]
    fn test_malformed_sid() {
        let registry = MemoryRegistry::new();
        registry.set_integrity_level(None);
        assert!(matches!(get_integrity_level(&registry), Err(RegistryError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_os_failure() {
        let registry = MemoryRegistry::new();
        registry.fail_integrity_query(Some(5));
        let err = is_elevated(&registry).unwrap_err();
        assert_eq!(err.code(), Some(5));

        for code in [2, 5, 1314] {
            registry.fail_integrity_query(Some(code));
            assert!(matches!(
                get_integrity_level(&registry),
                Err(RegistryError::Os {
                    operation: Operation::IntegrityLevel,
                    code: c,
                    ..
                }) if c == code
            ));
        }
    }
}
