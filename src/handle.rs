//! Scoped key handles.
//!
//! A [`KeyScope`] owns exactly one open key handle and closes it when
//! dropped, so the handle is released on every exit path: normal return,
//! early `?` return, or unwinding.

use crate::backend::{Access, RawKey, RawKeyInfo, RawValue, RegistryBackend, View};
use crate::error::{Operation, RegistryError, Result};
use crate::path::KeyPath;
use crate::types::RootKey;
use tracing::{debug, warn};

/// An open key handle bound to the backend that issued it.
pub struct KeyScope<'a, B: RegistryBackend + ?Sized> {
    backend: &'a B,
    key: RawKey,
    path: String,
    view: View,
}

impl<'a, B: RegistryBackend + ?Sized> KeyScope<'a, B> {
    /// Opens an existing key.
    ///
    /// # Errors
    ///
    /// [`RegistryError::KeyNotFound`] if any segment is missing, or the
    /// translated OS error.
    pub fn open(
        backend: &'a B,
        root: RootKey,
        path: &KeyPath,
        view: View,
        access: Access,
    ) -> Result<Self> {
        let native = path.to_native();
        let key = backend
            .open_key(root, &native, view, access)
            .map_err(|code| RegistryError::from_os(Operation::OpenKey, code, &native, None))?;
        debug!(root = root.short_name(), path = %native, ?access, ?view, "Opened key");
        Ok(Self {
            backend,
            key,
            path: native,
            view,
        })
    }

    /// Opens a key, creating it and any missing ancestors first.
    ///
    /// An existing key is opened as-is; its values and subkeys are untouched.
    pub fn create(
        backend: &'a B,
        root: RootKey,
        path: &KeyPath,
        view: View,
        access: Access,
    ) -> Result<Self> {
        let native = path.to_native();
        let key = backend
            .create_key(root, &native, view, access)
            .map_err(|code| RegistryError::from_os(Operation::CreateKey, code, &native, None))?;
        debug!(root = root.short_name(), path = %native, ?view, "Opened or created key");
        Ok(Self {
            backend,
            key,
            path: native,
            view,
        })
    }

    /// Absolute native path of the key.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reads a value's type code and raw bytes.
    pub fn query_value(&self, name: &str) -> Result<(u32, Vec<u8>)> {
        self.backend
            .query_value(self.key, name)
            .map_err(|code| {
                RegistryError::from_os(Operation::QueryValue, code, &self.path, Some(name))
            })
    }

    /// Writes a value.
    pub fn set_value(&self, name: &str, type_code: u32, data: &[u8]) -> Result<()> {
        self.backend
            .set_value(self.key, name, type_code, data)
            .map_err(|code| {
                RegistryError::from_os(Operation::SetValue, code, &self.path, Some(name))
            })
    }

    /// Removes a value. Returns `false` if it did not exist.
    pub fn delete_value(&self, name: &str) -> Result<bool> {
        match self.backend.delete_value(self.key, name) {
            Ok(()) => Ok(true),
            Err(code) => {
                match RegistryError::from_os(Operation::DeleteValue, code, &self.path, Some(name)) {
                    RegistryError::ValueNotFound { .. } => Ok(false),
                    other => Err(other),
                }
            }
        }
    }

    /// Removes the empty subkey `name`. Returns `false` if it did not exist.
    pub fn delete_subkey(&self, name: &str) -> Result<bool> {
        let full = format!("{}\\{}", self.path, name);
        let child = full.trim_start_matches('\\');
        match self.backend.delete_key(self.key, name, self.view) {
            Ok(()) => Ok(true),
            Err(code) => match RegistryError::from_os(Operation::DeleteKey, code, child, None) {
                RegistryError::KeyNotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }

    /// All values in index order.
    pub fn values(&self) -> Result<Vec<RawValue>> {
        let mut values = Vec::new();
        let mut index = 0;
        while let Some(value) = self
            .backend
            .enum_value(self.key, index)
            .map_err(|code| RegistryError::from_os(Operation::EnumValues, code, &self.path, None))?
        {
            values.push(value);
            index += 1;
        }
        Ok(values)
    }

    /// All subkey names in index order.
    pub fn subkeys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut index = 0;
        while let Some(name) = self
            .backend
            .enum_key(self.key, index)
            .map_err(|code| RegistryError::from_os(Operation::EnumSubkeys, code, &self.path, None))?
        {
            names.push(name);
            index += 1;
        }
        Ok(names)
    }

    /// Subkey count, value count and last write time.
    pub fn info(&self) -> Result<RawKeyInfo> {
        self.backend
            .query_info_key(self.key)
            .map_err(|code| RegistryError::from_os(Operation::QueryInfo, code, &self.path, None))
    }
}

impl<B: RegistryBackend + ?Sized> Drop for KeyScope<'_, B> {
    fn drop(&mut self) {
        match self.backend.close_key(self.key) {
            Ok(()) => debug!(path = %self.path, "Closed key"),
            Err(code) => {
                let error = RegistryError::from_os(Operation::CloseKey, code, &self.path, None);
                warn!(%error, "Failed to close registry key handle");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;

    fn create_user_key<'a>(
        registry: &'a MemoryRegistry,
        path: &str,
    ) -> Result<KeyScope<'a, MemoryRegistry>> {
        let path = KeyPath::parse(path);
        KeyScope::create(registry, RootKey::CurrentUser, &path, View::Native, Access::ReadWrite)
    }

    #[test]
    fn test_open_missing_key() {
        let registry = MemoryRegistry::new();
        let path = KeyPath::parse("Software/Missing");
        let result =
            KeyScope::open(&registry, RootKey::CurrentUser, &path, View::Native, Access::Read);
        assert!(matches!(result, Err(RegistryError::KeyNotFound { .. })));
        assert_eq!(registry.open_handles(), 0);
    }

    #[test]
    fn test_handle_closed_on_drop() {
        let registry = MemoryRegistry::new();
        {
            let scope = create_user_key(&registry, "A/B/C").unwrap();
            assert_eq!(scope.path(), r"A\B\C");
            assert_eq!(registry.open_handles(), 1);
        }
        assert_eq!(registry.open_handles(), 0);
    }

    #[test]
    fn test_handle_closed_on_error_path() {
        fn read_missing(registry: &MemoryRegistry) -> Result<(u32, Vec<u8>)> {
            let scope = create_user_key(registry, "A")?;
            scope.query_value("missing")
        }

        let registry = MemoryRegistry::new();
        assert!(matches!(read_missing(&registry), Err(RegistryError::ValueNotFound { .. })));
        assert_eq!(registry.open_handles(), 0);
    }

    #[test]
    fn test_create_keeps_existing_content() {
        let registry = MemoryRegistry::new();
        {
            let scope = create_user_key(&registry, "A").unwrap();
            scope.set_value("x", 4, &[1, 0, 0, 0]).unwrap();
        }
        let scope = create_user_key(&registry, "A").unwrap();
        assert_eq!(scope.query_value("x").unwrap(), (4, vec![1, 0, 0, 0]));
    }

    #[test]
    fn test_views_are_separate() {
        let registry = MemoryRegistry::new();
        let path = KeyPath::parse("Software/App");
        let hive = RootKey::LocalMachine;
        let created = KeyScope::create(&registry, hive, &path, View::Registry32, Access::ReadWrite);
        drop(created.unwrap());
        assert!(KeyScope::open(&registry, hive, &path, View::Native, Access::Read).is_err());
        assert!(KeyScope::open(&registry, hive, &path, View::Registry32, Access::Read).is_ok());
    }
}
