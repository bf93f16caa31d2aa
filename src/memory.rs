//! In-process registry backend.
//!
//! [`MemoryRegistry`] implements [`RegistryBackend`] over a tree held in
//! memory, one tree per root hive and view. It behaves like the OS where the
//! access layer depends on it: names are case-insensitive but keep their
//! original case, subkeys enumerate alphabetically, values enumerate in
//! insertion order, and failures are reported with the same Win32 codes.
//!
//! It runs on every platform, so the whole access layer can be exercised
//! without touching a real registry.

use crate::backend::{Access, OsCode, OsResult, RawKey, RawKeyInfo, RawValue, RegistryBackend, View};
use crate::elevation::IntegrityLevel;
use crate::error::{
    ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_INVALID_HANDLE, ERROR_KEY_DELETED,
};
use crate::types::RootKey;
use crate::utils::datetime_to_filetime;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone)]
struct StoredValue {
    name: String,
    type_code: u32,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    // Keyed by lowercase name.
    subkeys: BTreeMap<String, Node>,
    values: Vec<StoredValue>,
    last_write: u64,
}

impl Node {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subkeys: BTreeMap::new(),
            values: Vec::new(),
            last_write: now(),
        }
    }

    fn touch(&mut self) {
        self.last_write = now();
    }

    fn find(&self, path: &[String]) -> Option<&Node> {
        path.iter().try_fold(self, |node, segment| node.subkeys.get(segment))
    }

    fn find_mut(&mut self, path: &[String]) -> Option<&mut Node> {
        path.iter().try_fold(self, |node, segment| node.subkeys.get_mut(segment))
    }

    fn value_index(&self, name: &str) -> Option<usize> {
        let folded = fold(name);
        self.values.iter().position(|v| fold(&v.name) == folded)
    }
}

#[derive(Debug, Clone)]
struct OpenKey {
    root: RootKey,
    view: View,
    // Lowercase segments.
    path: Vec<String>,
    writable: bool,
}

#[derive(Debug)]
struct State {
    trees: HashMap<(RootKey, View), Node>,
    handles: HashMap<isize, OpenKey>,
    next_handle: isize,
    calls: usize,
    integrity_level: Option<u32>,
    integrity_failure: Option<u32>,
    expansion_failure: Option<u32>,
    broadcast_failure: Option<u32>,
    broadcasts: Vec<Option<String>>,
    environment: HashMap<String, String>,
    denied: Vec<(RootKey, Vec<String>)>,
}

impl State {
    fn tree(&mut self, root: RootKey, view: View) -> &mut Node {
        self.trees.entry((root, view)).or_insert_with(|| Node::new(root.name()))
    }

    fn resolve(&self, key: RawKey) -> OsResult<OpenKey> {
        self.handles.get(&key.0).cloned().ok_or(OsCode(ERROR_INVALID_HANDLE))
    }

    fn node(&self, open: &OpenKey) -> OsResult<&Node> {
        self.trees
            .get(&(open.root, open.view))
            .and_then(|tree| tree.find(&open.path))
            .ok_or(OsCode(ERROR_KEY_DELETED))
    }

    fn node_mut(&mut self, open: &OpenKey) -> OsResult<&mut Node> {
        self.trees
            .get_mut(&(open.root, open.view))
            .and_then(|tree| tree.find_mut(&open.path))
            .ok_or(OsCode(ERROR_KEY_DELETED))
    }

    fn is_denied(&self, root: RootKey, path: &[String]) -> bool {
        self.denied
            .iter()
            .any(|(denied_root, prefix)| *denied_root == root && path.starts_with(prefix))
    }

    fn issue(&mut self, open: OpenKey) -> RawKey {
        self.next_handle += 1;
        let handle = self.next_handle;
        self.handles.insert(handle, open);
        RawKey(handle)
    }
}

/// A registry held entirely in memory.
///
/// Safe to share between threads; every call takes an internal lock.
#[derive(Debug)]
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    /// Creates an empty registry. The simulated process runs at medium
    /// integrity with an empty environment.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                trees: HashMap::new(),
                handles: HashMap::new(),
                next_handle: 0,
                calls: 0,
                integrity_level: Some(IntegrityLevel::MEDIUM.rid()),
                integrity_failure: None,
                expansion_failure: None,
                broadcast_failure: None,
                broadcasts: Vec::new(),
                environment: HashMap::new(),
                denied: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_call(&self, operation: &'static str) -> MutexGuard<'_, State> {
        let mut state = self.lock();
        state.calls += 1;
        trace!(operation, "Memory registry call");
        state
    }

    /// Number of registry calls made so far. Environment, integrity and
    /// broadcast queries are not counted.
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    /// Number of key handles currently open.
    pub fn open_handles(&self) -> usize {
        self.lock().handles.len()
    }

    /// Sets the integrity RID reported for the process. `None` simulates a
    /// token without a usable integrity SID.
    pub fn set_integrity_level(&self, rid: Option<u32>) {
        self.lock().integrity_level = rid;
    }

    /// Makes the integrity query fail with `code`, or succeed again with `None`.
    pub fn fail_integrity_query(&self, code: Option<u32>) {
        self.lock().integrity_failure = code;
    }

    /// Makes environment expansion fail with `code`, or succeed again with `None`.
    pub fn fail_expansion(&self, code: Option<u32>) {
        self.lock().expansion_failure = code;
    }

    /// Makes setting-change broadcasts fail with `code`, or succeed again with `None`.
    pub fn fail_broadcast(&self, code: Option<u32>) {
        self.lock().broadcast_failure = code;
    }

    /// Areas of every successful broadcast, oldest first.
    pub fn broadcasts(&self) -> Vec<Option<String>> {
        self.lock().broadcasts.clone()
    }

    /// Sets an environment variable used by `%VAR%` expansion.
    pub fn set_env(&self, name: &str, value: &str) {
        self.lock().environment.insert(name.to_uppercase(), value.to_string());
    }

    /// Removes an environment variable.
    pub fn remove_env(&self, name: &str) {
        self.lock().environment.remove(&name.to_uppercase());
    }

    /// Denies write access to `path` below `root` and everything under it,
    /// in both views. Opening for write, creating, and deleting there fail
    /// with `ERROR_ACCESS_DENIED`.
    pub fn deny_access(&self, root: RootKey, path: &str) {
        self.lock().denied.push((root, segments(path)));
    }
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

fn segments(path: &str) -> Vec<String> {
    path.split(['\\', '/'])
        .filter(|segment| !segment.is_empty())
        .map(fold)
        .collect()
}

fn now() -> u64 {
    datetime_to_filetime(Utc::now())
}

impl RegistryBackend for MemoryRegistry {
    fn open_key(&self, root: RootKey, path: &str, view: View, access: Access) -> OsResult<RawKey> {
        let mut state = self.registry_call("open_key");
        let folded = segments(path);
        if access.is_write() && state.is_denied(root, &folded) {
            return Err(OsCode(ERROR_ACCESS_DENIED));
        }
        if state.tree(root, view).find(&folded).is_none() {
            return Err(OsCode(ERROR_FILE_NOT_FOUND));
        }
        Ok(state.issue(OpenKey {
            root,
            view,
            path: folded,
            writable: access.is_write(),
        }))
    }

    fn create_key(
        &self,
        root: RootKey,
        path: &str,
        view: View,
        access: Access,
    ) -> OsResult<RawKey> {
        let mut state = self.registry_call("create_key");
        let folded = segments(path);
        if state.is_denied(root, &folded) {
            return Err(OsCode(ERROR_ACCESS_DENIED));
        }

        let mut node = state.tree(root, view);
        for original in path.split(['\\', '/']).filter(|segment| !segment.is_empty()) {
            let key = fold(original);
            if !node.subkeys.contains_key(&key) {
                node.touch();
            }
            node = node.subkeys.entry(key).or_insert_with(|| Node::new(original));
        }

        Ok(state.issue(OpenKey {
            root,
            view,
            path: folded,
            writable: access.is_write(),
        }))
    }

    fn query_value(&self, key: RawKey, name: &str) -> OsResult<(u32, Vec<u8>)> {
        let state = self.registry_call("query_value");
        let open = state.resolve(key)?;
        let node = state.node(&open)?;
        node.value_index(name)
            .map(|i| (node.values[i].type_code, node.values[i].data.clone()))
            .ok_or(OsCode(ERROR_FILE_NOT_FOUND))
    }

    fn set_value(&self, key: RawKey, name: &str, type_code: u32, data: &[u8]) -> OsResult<()> {
        let mut state = self.registry_call("set_value");
        let open = state.resolve(key)?;
        if !open.writable {
            return Err(OsCode(ERROR_ACCESS_DENIED));
        }
        let node = state.node_mut(&open)?;
        match node.value_index(name) {
            Some(i) => {
                node.values[i].type_code = type_code;
                node.values[i].data = data.to_vec();
            }
            None => node.values.push(StoredValue {
                name: name.to_string(),
                type_code,
                data: data.to_vec(),
            }),
        }
        node.touch();
        Ok(())
    }

    fn delete_value(&self, key: RawKey, name: &str) -> OsResult<()> {
        let mut state = self.registry_call("delete_value");
        let open = state.resolve(key)?;
        if !open.writable {
            return Err(OsCode(ERROR_ACCESS_DENIED));
        }
        let node = state.node_mut(&open)?;
        let index = node.value_index(name).ok_or(OsCode(ERROR_FILE_NOT_FOUND))?;
        node.values.remove(index);
        node.touch();
        Ok(())
    }

    fn delete_key(&self, parent: RawKey, name: &str, _view: View) -> OsResult<()> {
        let mut state = self.registry_call("delete_key");
        let open = state.resolve(parent)?;
        let child = fold(name);

        let mut child_path = open.path.clone();
        child_path.push(child.clone());
        if !open.writable || state.is_denied(open.root, &child_path) {
            return Err(OsCode(ERROR_ACCESS_DENIED));
        }

        let node = state.node_mut(&open)?;
        match node.subkeys.get(&child) {
            None => return Err(OsCode(ERROR_FILE_NOT_FOUND)),
            // RegDeleteKeyEx refuses keys that still have subkeys.
            Some(target) if !target.subkeys.is_empty() => return Err(OsCode(ERROR_ACCESS_DENIED)),
            Some(_) => {}
        }
        node.subkeys.remove(&child);
        node.touch();
        Ok(())
    }

    fn enum_value(&self, key: RawKey, index: u32) -> OsResult<Option<RawValue>> {
        let state = self.registry_call("enum_value");
        let open = state.resolve(key)?;
        let node = state.node(&open)?;
        Ok(node.values.get(index as usize).map(|v| RawValue {
            name: v.name.clone(),
            type_code: v.type_code,
            data: v.data.clone(),
        }))
    }

    fn enum_key(&self, key: RawKey, index: u32) -> OsResult<Option<String>> {
        let state = self.registry_call("enum_key");
        let open = state.resolve(key)?;
        let node = state.node(&open)?;
        Ok(node.subkeys.values().nth(index as usize).map(|child| child.name.clone()))
    }

    fn query_info_key(&self, key: RawKey) -> OsResult<RawKeyInfo> {
        let state = self.registry_call("query_info_key");
        let open = state.resolve(key)?;
        let node = state.node(&open)?;
        Ok(RawKeyInfo {
            subkey_count: node.subkeys.len() as u32,
            value_count: node.values.len() as u32,
            last_write_time: node.last_write,
        })
    }

    fn close_key(&self, key: RawKey) -> OsResult<()> {
        let mut state = self.registry_call("close_key");
        state
            .handles
            .remove(&key.0)
            .map(|_| ())
            .ok_or(OsCode(ERROR_INVALID_HANDLE))
    }

    fn expand_environment_strings(&self, text: &str) -> OsResult<String> {
        let state = self.lock();
        if let Some(code) = state.expansion_failure {
            return Err(OsCode(code));
        }

        // Unknown or unterminated references are left untouched.
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('%') {
                Some(end) => {
                    let name = &after[..end];
                    match state.environment.get(&name.to_uppercase()) {
                        Some(value) if !name.is_empty() => {
                            out.push_str(value);
                            rest = &after[end + 1..];
                        }
                        _ => {
                            out.push('%');
                            rest = after;
                        }
                    }
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    fn integrity_level(&self) -> OsResult<Option<u32>> {
        let state = self.lock();
        match state.integrity_failure {
            Some(code) => Err(OsCode(code)),
            None => Ok(state.integrity_level),
        }
    }

    fn broadcast_setting_change(&self, area: Option<&str>, _timeout: Duration) -> OsResult<()> {
        let mut state = self.lock();
        if let Some(code) = state.broadcast_failure {
            return Err(OsCode(code));
        }
        state.broadcasts.push(area.map(str::to_string));
        Ok(())
    }
}
