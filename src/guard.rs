//! Write policy checked before any mutating call reaches the OS.
//!
//! The guard never grants anything. It only refuses early those writes that
//! are expected to fail, and the OS remains the final authority.

use crate::backend::RegistryBackend;
use crate::elevation::is_elevated;
use crate::error::{RegistryError, Result};
use crate::types::RootKey;
use tracing::debug;

/// Refuses a write or delete when the root is read-only, or when the hive
/// requires elevation, the process is not elevated, and the check is not
/// bypassed.
///
/// # Errors
///
/// [`RegistryError::PermissionDenied`] in the cases above, including when
/// the elevation query itself fails.
pub fn check_write_allowed<B: RegistryBackend + ?Sized>(
    backend: &B,
    root: RootKey,
    read_only: bool,
    ignore_elevation_check: bool,
) -> Result<()> {
    if read_only {
        return Err(RegistryError::permission_denied(
            "Cannot perform write/delete operation in read-only mode",
        ));
    }

    if !root.requires_elevation() || ignore_elevation_check {
        return Ok(());
    }

    let elevated = is_elevated(backend).map_err(|e| {
        RegistryError::permission_denied(format!(
            "Failed to determine process elevation status required for write/delete \
             operations on '{}': {}",
            root, e
        ))
    })?;

    if !elevated {
        debug!(
            root = root.short_name(),
            "Refusing write on sensitive hive from non-elevated process"
        );
        return Err(RegistryError::permission_denied(format!(
            "Write/delete operation on '{}' requires elevated (administrator) privileges, \
             but the current process is not elevated",
            root
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::IntegrityLevel;
    use crate::memory::MemoryRegistry;

    fn medium() -> MemoryRegistry {
        let registry = MemoryRegistry::new();
        registry.set_integrity_level(Some(IntegrityLevel::MEDIUM.rid()));
        registry
    }

    #[test]
    fn test_read_only_always_denied() {
        let registry = MemoryRegistry::new();
        registry.set_integrity_level(Some(IntegrityLevel::SYSTEM.rid()));
        assert!(check_write_allowed(&registry, RootKey::CurrentUser, true, true).is_err());
        assert_eq!(registry.call_count(), 0);
    }

    #[test]
    fn test_user_hive_needs_no_elevation() {
        let registry = medium();
        assert!(check_write_allowed(&registry, RootKey::CurrentUser, false, false).is_ok());
        assert_eq!(registry.call_count(), 0);
    }

    #[test]
    fn test_sensitive_hives_need_elevation() {
        let registry = medium();
        for root in [
            RootKey::LocalMachine,
            RootKey::Users,
            RootKey::ClassesRoot,
            RootKey::CurrentConfig,
        ] {
            let err = check_write_allowed(&registry, root, false, false).unwrap_err();
            assert!(matches!(err, RegistryError::PermissionDenied { code: None, .. }));
        }
    }

    #[test]
    fn test_bypass_skips_query() {
        let registry = medium();
        assert!(check_write_allowed(&registry, RootKey::LocalMachine, false, true).is_ok());
        assert_eq!(registry.call_count(), 0);
    }

    #[test]
    fn test_elevated_passes() {
        let registry = MemoryRegistry::new();
        registry.set_integrity_level(Some(IntegrityLevel::HIGH.rid()));
        assert!(check_write_allowed(&registry, RootKey::LocalMachine, false, false).is_ok());
    }

    #[test]
    fn test_query_failure_is_permission_denied() {
        let registry = MemoryRegistry::new();
        registry.fail_integrity_query(Some(1));
        let err = check_write_allowed(&registry, RootKey::LocalMachine, false, false).unwrap_err();
        assert_eq!(err.kind(), "PermissionDenied");
    }
}
