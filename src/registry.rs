//! Path-relative registry access bound to one root hive.
//!
//! [`RegistryRoot`] is the public entry point. It holds configuration only;
//! every operation opens its own [`KeyScope`] and releases it before
//! returning, so no OS handle outlives a call.
//!
//! ## Examples
//!
//! ```rust
//! use reg_env::{MemoryRegistry, RegistryRoot, ValueData};
//!
//! # fn main() -> reg_env::Result<()> {
//! let root = RegistryRoot::new(MemoryRegistry::new(), "HKCU")?
//!     .with_prefix("Software/ExampleApp");
//!
//! root.put_registry_value("Config", "Name", "Widget", None)?;
//! let value = root.get_registry_value("Config", "Name")?;
//! assert_eq!(value.data(), &ValueData::String("Widget".into()));
//! # Ok(())
//! # }
//! ```

use crate::backend::{Access, RegistryBackend, View};
use crate::error::{RegistryError, Result};
use crate::guard::check_write_allowed;
use crate::handle::KeyScope;
use crate::key::RegistryKeyInfo;
use crate::notify::{broadcast_setting_change, ENVIRONMENT_AREA};
use crate::path::KeyPath;
use crate::types::{normalize_registry_type, RootIdentifier, RootKey, TypeIdentifier, ValueType};
use crate::value::{encode, RegData, RegistryValue};
use std::time::Duration;
use tracing::{debug, instrument};

/// Serializable construction parameters for a [`RegistryRoot`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegistryConfig {
    /// Root hive name, such as `"HKCU"` or `"HKEY_LOCAL_MACHINE"`.
    pub root: String,
    /// Path prefix under the root, using either separator.
    pub prefix: String,
    /// Address the 32-bit view on 64-bit hosts.
    pub access_32bit_view: bool,
    /// Refuse every write and delete.
    pub read_only: bool,
    /// Skip the elevation pre-check for sensitive hives.
    pub ignore_elevation_check: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: RootKey::CurrentUser.short_name().to_string(),
            prefix: String::new(),
            access_32bit_view: false,
            read_only: false,
            ignore_elevation_check: false,
        }
    }
}

/// Registry operations relative to a root hive and optional prefix.
#[derive(Debug)]
pub struct RegistryRoot<B: RegistryBackend> {
    backend: B,
    root: RootKey,
    prefix: KeyPath,
    view: View,
    read_only: bool,
    ignore_elevation_check: bool,
}

impl<B: RegistryBackend> RegistryRoot<B> {
    /// Binds a backend to a root hive given by name, handle value or
    /// [`RootKey`].
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidIdentifier`] for an unknown root.
    pub fn new(backend: B, root: impl Into<RootIdentifier>) -> Result<Self> {
        let root = crate::types::normalize_root_key(root)?;
        Ok(Self {
            backend,
            root,
            prefix: KeyPath::root(),
            view: View::Native,
            read_only: false,
            ignore_elevation_check: false,
        })
    }

    /// Builds a root from a [`RegistryConfig`].
    pub fn from_config(backend: B, config: &RegistryConfig) -> Result<Self> {
        Ok(Self::new(backend, config.root.as_str())?
            .with_prefix(config.prefix.as_str())
            .with_32bit_view(config.access_32bit_view)
            .read_only(config.read_only)
            .ignore_elevation_check(config.ignore_elevation_check))
    }

    /// Resolves all paths below `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<KeyPath>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Selects the 32-bit registry view.
    pub fn with_32bit_view(mut self, enabled: bool) -> Self {
        self.view = View::from_flag(enabled);
        self
    }

    /// Refuses every write and delete when set.
    pub fn read_only(mut self, enabled: bool) -> Self {
        self.read_only = enabled;
        self
    }

    /// Skips the elevation pre-check when set. The OS still enforces ACLs.
    pub fn ignore_elevation_check(mut self, enabled: bool) -> Self {
        self.ignore_elevation_check = enabled;
        self
    }

    /// The resolved root hive.
    pub fn root_key(&self) -> RootKey {
        self.root
    }

    /// Short name of the root hive, such as `"HKCU"`.
    pub fn root_key_name(&self) -> &'static str {
        self.root.short_name()
    }

    /// The path prefix.
    pub fn prefix(&self) -> &KeyPath {
        &self.prefix
    }

    /// The registry view in use.
    pub fn view(&self) -> View {
        self.view
    }

    /// True if writes and deletes are refused.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// True if the elevation pre-check is skipped.
    pub fn ignores_elevation_check(&self) -> bool {
        self.ignore_elevation_check
    }

    /// The backend this root delegates to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current settings as a [`RegistryConfig`].
    pub fn config(&self) -> RegistryConfig {
        RegistryConfig {
            root: self.root.short_name().to_string(),
            prefix: self.prefix.to_native(),
            access_32bit_view: self.view == View::Registry32,
            read_only: self.read_only,
            ignore_elevation_check: self.ignore_elevation_check,
        }
    }

    fn absolute(&self, path: &str) -> KeyPath {
        self.prefix.join(&KeyPath::parse(path))
    }

    fn check_write(&self) -> Result<()> {
        check_write_allowed(
            &self.backend,
            self.root,
            self.read_only,
            self.ignore_elevation_check,
        )
    }

    fn open_scope(&self, path: &KeyPath, access: Access) -> Result<KeyScope<'_, B>> {
        KeyScope::open(&self.backend, self.root, path, self.view, access)
    }

    fn create_scope(&self, path: &KeyPath) -> Result<KeyScope<'_, B>> {
        KeyScope::create(&self.backend, self.root, path, self.view, Access::ReadWrite)
    }

    /// Creates or replaces a value, creating `path` and its ancestors as needed.
    ///
    /// With `value_type` unset the encoding is inferred from `data`. The data
    /// is encoded before any key is touched, so a validation failure leaves
    /// the registry unchanged.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::PermissionDenied`] from the write guard or the OS
    /// * [`RegistryError::Validation`] if `data` does not fit the encoding
    #[instrument(skip(self, data), fields(root = %self.root.short_name()))]
    pub fn put_registry_value(
        &self,
        path: &str,
        name: &str,
        data: impl Into<RegData>,
        value_type: Option<ValueType>,
    ) -> Result<()> {
        self.check_write()?;
        let (value_type, bytes) = encode(value_type, &data.into())?;

        let full = self.absolute(path);
        let scope = self.create_scope(&full)?;
        scope.set_value(name, value_type.code(), &bytes)?;
        debug!(path = %full, value_type = %value_type, size = bytes.len(), "Wrote registry value");
        Ok(())
    }

    /// Like [`put_registry_value`](Self::put_registry_value) with the type
    /// given as a name (`"REG_EXPAND_SZ"`) or code.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidIdentifier`] for an unknown type, otherwise as
    /// [`put_registry_value`](Self::put_registry_value).
    pub fn put_registry_value_as(
        &self,
        path: &str,
        name: &str,
        data: impl Into<RegData>,
        value_type: impl Into<TypeIdentifier>,
    ) -> Result<()> {
        let value_type = normalize_registry_type(value_type)?;
        self.put_registry_value(path, name, data, Some(value_type))
    }

    /// Creates `path\subkey_name` and any missing ancestors. Existing keys
    /// are left untouched.
    #[instrument(skip(self), fields(root = %self.root.short_name()))]
    pub fn put_registry_subkey(&self, path: &str, subkey_name: &str) -> Result<()> {
        self.check_write()?;
        let subkey = KeyPath::parse(subkey_name);
        if subkey.is_empty() {
            return Err(RegistryError::validation("Subkey name must not be empty"));
        }

        let full = self.absolute(path).join(&subkey);
        drop(self.create_scope(&full)?);
        debug!(path = %full, "Ensured registry key exists");
        Ok(())
    }

    /// Reads one value.
    ///
    /// # Errors
    ///
    /// [`RegistryError::KeyNotFound`] if `path` is missing,
    /// [`RegistryError::ValueNotFound`] if the key exists without `name`.
    #[instrument(skip(self), fields(root = %self.root.short_name()))]
    pub fn get_registry_value(&self, path: &str, name: &str) -> Result<RegistryValue> {
        let scope = self.open_scope(&self.absolute(path), Access::Read)?;
        let (type_code, raw) = scope.query_value(name)?;
        Ok(RegistryValue::from_raw(&self.backend, name, type_code, &raw))
    }

    /// Reads every value of a key in index order.
    #[instrument(skip(self), fields(root = %self.root.short_name()))]
    pub fn list_registry_values(&self, path: &str) -> Result<Vec<RegistryValue>> {
        let scope = self.open_scope(&self.absolute(path), Access::Read)?;
        let values: Vec<RegistryValue> = scope
            .values()?
            .into_iter()
            .map(|raw| RegistryValue::from_raw(&self.backend, raw.name, raw.type_code, &raw.data))
            .collect();
        debug!(count = values.len(), "Listed registry values");
        Ok(values)
    }

    /// Names of the immediate subkeys in index order.
    #[instrument(skip(self), fields(root = %self.root.short_name()))]
    pub fn list_registry_subkeys(&self, path: &str) -> Result<Vec<String>> {
        let scope = self.open_scope(&self.absolute(path), Access::Read)?;
        let names = scope.subkeys()?;
        debug!(count = names.len(), "Listed registry subkeys");
        Ok(names)
    }

    /// Subkey count, value count and last write time of a key.
    #[instrument(skip(self), fields(root = %self.root.short_name()))]
    pub fn head_registry_key(&self, path: &str) -> Result<RegistryKeyInfo> {
        let scope = self.open_scope(&self.absolute(path), Access::Read)?;
        Ok(scope.info()?.into())
    }

    /// Removes a value. A missing value is success.
    ///
    /// # Errors
    ///
    /// [`RegistryError::KeyNotFound`] if the key holding the value is missing.
    #[instrument(skip(self), fields(root = %self.root.short_name()))]
    pub fn delete_registry_value(&self, path: &str, name: &str) -> Result<()> {
        self.check_write()?;

        let full = self.absolute(path);
        let scope = self.open_scope(&full, Access::ReadWrite)?;

        if scope.delete_value(name)? {
            debug!(path = %full, "Deleted registry value");
        } else {
            debug!(path = %full, "Value already absent");
        }
        Ok(())
    }

    /// Removes an empty key. A missing key, or a missing ancestor, is success.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::KeyNotEmpty`] if the key has subkeys or values
    /// * [`RegistryError::Validation`] when asked to delete the root hive
    #[instrument(skip(self), fields(root = %self.root.short_name()))]
    pub fn delete_registry_key(&self, path: &str) -> Result<()> {
        self.check_write()?;

        let full = self.absolute(path);
        let (parent, leaf) = full
            .split_leaf()
            .ok_or_else(|| RegistryError::validation("Cannot delete the root registry key"))?;

        let parent_scope = match self.open_scope(&parent, Access::ReadWrite) {
            Ok(scope) => scope,
            Err(RegistryError::KeyNotFound { .. }) => {
                debug!(path = %full, "Parent key already absent");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let info = match self.open_scope(&full, Access::Read) {
            Ok(target) => target.info()?,
            Err(RegistryError::KeyNotFound { .. }) => {
                debug!(path = %full, "Key already absent");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if info.subkey_count > 0 || info.value_count > 0 {
            return Err(RegistryError::KeyNotEmpty {
                path: full.to_native(),
                subkeys: info.subkey_count,
                values: info.value_count,
                code: None,
            });
        }

        if parent_scope.delete_subkey(leaf)? {
            debug!(path = %full, "Deleted registry key");
        } else {
            debug!(path = %full, "Key already absent");
        }
        Ok(())
    }

    /// Tells running applications that environment variables changed.
    ///
    /// Call after editing `Environment` values so new processes started by
    /// the shell see them.
    pub fn broadcast_environment_change(&self, timeout: Duration) -> Result<()> {
        broadcast_setting_change(&self.backend, Some(ENVIRONMENT_AREA), timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;
    use crate::value::ValueData;

    fn app() -> RegistryRoot<MemoryRegistry> {
        RegistryRoot::new(MemoryRegistry::new(), "HKCU")
            .unwrap()
            .with_prefix("Software/ExampleApp")
    }

    #[test]
    fn test_builder() {
        let root = RegistryRoot::new(MemoryRegistry::new(), 0x8000_0002u32)
            .unwrap()
            .with_prefix(r"Software\Vendor")
            .with_32bit_view(true)
            .read_only(true);
        assert_eq!(root.root_key(), RootKey::LocalMachine);
        assert_eq!(root.root_key_name(), "HKLM");
        assert_eq!(root.view(), View::Registry32);
        assert!(root.is_read_only());
        assert!(!root.ignores_elevation_check());
        assert_eq!(root.config().prefix, r"Software\Vendor");
    }

    #[test]
    fn test_unknown_root() {
        assert!(matches!(
            RegistryRoot::new(MemoryRegistry::new(), "HKEY_NOWHERE"),
            Err(RegistryError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_from_config_round_trip() {
        let config = RegistryConfig {
            root: "hkey_current_user".into(),
            prefix: "Software/ExampleApp".into(),
            ..RegistryConfig::default()
        };
        let root = RegistryRoot::from_config(MemoryRegistry::new(), &config).unwrap();
        assert_eq!(root.root_key(), RootKey::CurrentUser);
        assert_eq!(root.config().prefix, r"Software\ExampleApp");
        assert_eq!(root.config().root, "HKCU");
    }

    #[test]
    fn test_prefix_applies_to_every_operation() {
        let root = app();
        root.put_registry_value("Config", "Name", "Widget", None).unwrap();

        let bare = RegistryRoot::new(root.backend(), RootKey::CurrentUser).unwrap();
        let value = bare.get_registry_value(r"Software\ExampleApp\Config", "Name").unwrap();
        assert_eq!(value.data(), &ValueData::String("Widget".into()));
        assert_eq!(bare.list_registry_subkeys("Software").unwrap(), vec!["ExampleApp"]);
    }

    #[test]
    fn test_validation_failure_creates_nothing() {
        let root = app();
        let err = root.put_registry_value("Config", "Bad", -1i32, None).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert!(matches!(root.head_registry_key(""), Err(RegistryError::KeyNotFound { .. })));
    }

    #[test]
    fn test_put_value_as_named_type() {
        let root = app();
        root.put_registry_value_as("", "Big", 1u64 << 33, "REG_QWORD").unwrap();
        assert_eq!(root.get_registry_value("", "Big").unwrap().as_u64(), Some(1 << 33));
        assert!(matches!(
            root.put_registry_value_as("", "x", 1u32, "REG_BOGUS"),
            Err(RegistryError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_put_subkey() {
        let root = app();
        root.put_registry_subkey("Plugins", "First").unwrap();
        root.put_registry_subkey("Plugins", "Second/Nested").unwrap();
        assert_eq!(root.list_registry_subkeys("Plugins").unwrap(), vec!["First", "Second"]);
        assert!(matches!(
            root.put_registry_subkey("Plugins", "//"),
            Err(RegistryError::Validation(_))
        ));
    }

    #[test]
    fn test_delete_root_hive_rejected() {
        let root = RegistryRoot::new(MemoryRegistry::new(), "HKCU").unwrap();
        assert!(matches!(root.delete_registry_key(""), Err(RegistryError::Validation(_))));
    }

    #[test]
    fn test_delete_prefix_key_itself() {
        let root = app();
        root.put_registry_subkey("", "Child").unwrap();
        root.delete_registry_key("Child").unwrap();
        root.delete_registry_key("").unwrap();
        let bare = RegistryRoot::new(root.backend(), "HKCU").unwrap();
        assert!(bare.list_registry_subkeys("Software").unwrap().is_empty());
    }

    #[test]
    fn test_key_not_empty_carries_counts() {
        let root = app();
        root.put_registry_value("Config", "a", 1u32, None).unwrap();
        root.put_registry_subkey("Config", "Child").unwrap();
        match root.delete_registry_key("Config").unwrap_err() {
            RegistryError::KeyNotEmpty { subkeys, values, path, .. } => {
                assert_eq!((subkeys, values), (1, 1));
                assert_eq!(path, r"Software\ExampleApp\Config");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_environment_change() {
        let root = RegistryRoot::new(MemoryRegistry::new(), "HKCU").unwrap();
        root.broadcast_environment_change(Duration::from_millis(100)).unwrap();
        assert_eq!(root.backend().broadcasts(), vec![Some("Environment".to_string())]);
    }
}
