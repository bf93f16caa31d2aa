//! Live registry backend over the Win32 API.

use crate::backend::{Access, OsCode, OsResult, RawKey, RawKeyInfo, RawValue, RegistryBackend, View};
use crate::error::{ERROR_INSUFFICIENT_BUFFER, ERROR_MORE_DATA, ERROR_NO_MORE_ITEMS};
use crate::types::RootKey;
use crate::utils::to_wide_null;
use std::ptr;
use std::time::Duration;
use tracing::trace;
use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, ERROR_SUCCESS, FILETIME, HANDLE};
use windows_sys::Win32::Security::{
    GetSidSubAuthority, GetSidSubAuthorityCount, GetTokenInformation, IsValidSid,
    TokenIntegrityLevel, TOKEN_MANDATORY_LABEL, TOKEN_QUERY,
};
use windows_sys::Win32::System::Environment::ExpandEnvironmentStringsW;
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegDeleteKeyExW, RegDeleteValueW, RegEnumKeyExW, RegEnumValueW,
    RegOpenKeyExW, RegQueryInfoKeyW, RegQueryValueExW, RegSetValueExW, HKEY,
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};
use windows_sys::Win32::UI::WindowsAndMessaging::SendMessageTimeoutW;

const HWND_BROADCAST: isize = 0xFFFF;
const WM_SETTINGCHANGE: u32 = 0x001A;
const SMTO_ABORTIFHUNG: u32 = 0x0002;
const REG_OPTION_NON_VOLATILE: u32 = 0;

// Longest value name plus terminator.
const MAX_VALUE_NAME: usize = 16_384;
// Longest key name plus terminator.
const MAX_KEY_NAME: usize = 256;
const INITIAL_EXPAND_CHARS: usize = 1024;

fn check(status: u32) -> OsResult<()> {
    if status == ERROR_SUCCESS {
        Ok(())
    } else {
        Err(OsCode(status))
    }
}

fn last_error() -> OsCode {
    // SAFETY: reads thread-local state only.
    OsCode(unsafe { GetLastError() })
}

fn root_hkey(root: RootKey) -> HKEY {
    // Predefined handles are sign-extended 32-bit values.
    root.handle() as i32 as HKEY
}

/// Closes a process token on drop.
struct TokenHandle(HANDLE);

impl Drop for TokenHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from OpenProcessToken and is closed once.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// The registry of the running Windows host.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsRegistry;

impl WindowsRegistry {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

impl RegistryBackend for WindowsRegistry {
    fn open_key(&self, root: RootKey, path: &str, view: View, access: Access) -> OsResult<RawKey> {
        let path = to_wide_null(path);
        let mut key: HKEY = 0;
        // SAFETY: `path` is NUL-terminated and outlives the call.
        let status = unsafe {
            RegOpenKeyExW(root_hkey(root), path.as_ptr(), 0, access.mask() | view.flags(), &mut key)
        };
        check(status)?;
        trace!(handle = key, "RegOpenKeyExW");
        Ok(RawKey(key))
    }

    fn create_key(
        &self,
        root: RootKey,
        path: &str,
        view: View,
        access: Access,
    ) -> OsResult<RawKey> {
        let path = to_wide_null(path);
        let mut key: HKEY = 0;
        let mut disposition = 0u32;
        // SAFETY: all pointers are valid for the duration of the call.
        let status = unsafe {
            RegCreateKeyExW(
                root_hkey(root),
                path.as_ptr(),
                0,
                ptr::null(),
                REG_OPTION_NON_VOLATILE,
                access.mask() | view.flags(),
                ptr::null(),
                &mut key,
                &mut disposition,
            )
        };
        check(status)?;
        trace!(handle = key, disposition, "RegCreateKeyExW");
        Ok(RawKey(key))
    }

    fn query_value(&self, key: RawKey, name: &str) -> OsResult<(u32, Vec<u8>)> {
        let name = to_wide_null(name);
        let mut type_code = 0u32;
        let mut size = 0u32;
        // SAFETY: a null data pointer asks for the size only.
        let status = unsafe {
            RegQueryValueExW(
                key.0,
                name.as_ptr(),
                ptr::null(),
                &mut type_code,
                ptr::null_mut(),
                &mut size,
            )
        };
        check(status)?;

        // The value may grow between the two calls.
        loop {
            let mut data = vec![0u8; size as usize];
            let mut len = size;
            // SAFETY: `data` holds `len` writable bytes.
            let status = unsafe {
                RegQueryValueExW(
                    key.0,
                    name.as_ptr(),
                    ptr::null(),
                    &mut type_code,
                    data.as_mut_ptr(),
                    &mut len,
                )
            };
            if status == ERROR_MORE_DATA {
                size = len.max(size.saturating_mul(2)).max(1);
                continue;
            }
            check(status)?;
            data.truncate(len as usize);
            return Ok((type_code, data));
        }
    }

    fn set_value(&self, key: RawKey, name: &str, type_code: u32, data: &[u8]) -> OsResult<()> {
        let name = to_wide_null(name);
        let len = u32::try_from(data.len()).map_err(|_| OsCode(ERROR_INSUFFICIENT_BUFFER))?;
        // SAFETY: `data` is readable for `len` bytes.
        check(unsafe { RegSetValueExW(key.0, name.as_ptr(), 0, type_code, data.as_ptr(), len) })
    }

    fn delete_value(&self, key: RawKey, name: &str) -> OsResult<()> {
        let name = to_wide_null(name);
        // SAFETY: `name` is NUL-terminated.
        check(unsafe { RegDeleteValueW(key.0, name.as_ptr()) })
    }

    fn delete_key(&self, parent: RawKey, name: &str, view: View) -> OsResult<()> {
        let name = to_wide_null(name);
        // SAFETY: `name` is NUL-terminated.
        check(unsafe { RegDeleteKeyExW(parent.0, name.as_ptr(), view.flags(), 0) })
    }

    fn enum_value(&self, key: RawKey, index: u32) -> OsResult<Option<RawValue>> {
        let mut name_capacity = 256usize;
        let mut data_capacity = 1024usize;
        loop {
            let mut name = vec![0u16; name_capacity];
            let mut name_len = name_capacity as u32;
            let mut data = vec![0u8; data_capacity];
            let mut data_len = data_capacity as u32;
            let mut type_code = 0u32;
            // SAFETY: buffers hold the lengths passed alongside them.
            let status = unsafe {
                RegEnumValueW(
                    key.0,
                    index,
                    name.as_mut_ptr(),
                    &mut name_len,
                    ptr::null(),
                    &mut type_code,
                    data.as_mut_ptr(),
                    &mut data_len,
                )
            };
            match status {
                ERROR_NO_MORE_ITEMS => return Ok(None),
                ERROR_MORE_DATA => {
                    name_capacity = MAX_VALUE_NAME;
                    data_capacity = (data_len as usize).max(data_capacity * 2);
                }
                _ => {
                    check(status)?;
                    name.truncate(name_len as usize);
                    data.truncate(data_len as usize);
                    return Ok(Some(RawValue {
                        name: String::from_utf16_lossy(&name),
                        type_code,
                        data,
                    }));
                }
            }
        }
    }

    fn enum_key(&self, key: RawKey, index: u32) -> OsResult<Option<String>> {
        let mut name = vec![0u16; MAX_KEY_NAME];
        let mut name_len = MAX_KEY_NAME as u32;
        // SAFETY: `name` holds `name_len` UTF-16 units.
        let status = unsafe {
            RegEnumKeyExW(
                key.0,
                index,
                name.as_mut_ptr(),
                &mut name_len,
                ptr::null(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if status == ERROR_NO_MORE_ITEMS {
            return Ok(None);
        }
        check(status)?;
        name.truncate(name_len as usize);
        Ok(Some(String::from_utf16_lossy(&name)))
    }

    fn query_info_key(&self, key: RawKey) -> OsResult<RawKeyInfo> {
        let mut subkey_count = 0u32;
        let mut value_count = 0u32;
        let mut last_write = FILETIME {
            dwLowDateTime: 0,
            dwHighDateTime: 0,
        };
        // SAFETY: unused outputs are null, the rest point at locals.
        let status = unsafe {
            RegQueryInfoKeyW(
                key.0,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
                &mut subkey_count,
                ptr::null_mut(),
                ptr::null_mut(),
                &mut value_count,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                &mut last_write,
            )
        };
        check(status)?;
        Ok(RawKeyInfo {
            subkey_count,
            value_count,
            last_write_time: (u64::from(last_write.dwHighDateTime) << 32)
                | u64::from(last_write.dwLowDateTime),
        })
    }

    fn close_key(&self, key: RawKey) -> OsResult<()> {
        // SAFETY: handles reach here once, from KeyScope's drop.
        check(unsafe { RegCloseKey(key.0) })
    }

    fn expand_environment_strings(&self, text: &str) -> OsResult<String> {
        let source = to_wide_null(text);
        let mut capacity = INITIAL_EXPAND_CHARS;
        loop {
            let mut buffer = vec![0u16; capacity];
            // SAFETY: `buffer` holds `capacity` UTF-16 units.
            let required = unsafe {
                ExpandEnvironmentStringsW(source.as_ptr(), buffer.as_mut_ptr(), capacity as u32)
            };
            if required == 0 {
                return Err(last_error());
            }
            let required = required as usize;
            if required > capacity {
                capacity = required;
                continue;
            }
            // `required` counts the terminator.
            buffer.truncate(required.saturating_sub(1));
            return Ok(String::from_utf16_lossy(&buffer));
        }
    }

    fn integrity_level(&self) -> OsResult<Option<u32>> {
        let mut raw: HANDLE = 0;
        // SAFETY: the pseudo handle needs no closing; `raw` receives the token.
        if unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut raw) } == 0 {
            return Err(last_error());
        }
        let token = TokenHandle(raw);

        let mut size = 0u32;
        // SAFETY: a null buffer asks for the size only.
        let ok = unsafe {
            GetTokenInformation(token.0, TokenIntegrityLevel, ptr::null_mut(), 0, &mut size)
        };
        if ok == 0 {
            let code = last_error();
            if code.0 != ERROR_INSUFFICIENT_BUFFER {
                return Err(code);
            }
        }

        // u64 storage keeps the label's pointer field aligned.
        let mut buffer = vec![0u64; (size as usize + 7) / 8 + 1];
        // SAFETY: `buffer` holds at least `size` bytes.
        let ok = unsafe {
            GetTokenInformation(
                token.0,
                TokenIntegrityLevel,
                buffer.as_mut_ptr().cast(),
                size,
                &mut size,
            )
        };
        if ok == 0 {
            return Err(last_error());
        }

        // SAFETY: the call above filled the buffer with a TOKEN_MANDATORY_LABEL
        // whose SID points into the same buffer.
        unsafe {
            let label = &*(buffer.as_ptr() as *const TOKEN_MANDATORY_LABEL);
            let sid = label.Label.Sid;
            if sid.is_null() || IsValidSid(sid) == 0 {
                return Ok(None);
            }
            let count = *GetSidSubAuthorityCount(sid);
            if count == 0 {
                return Ok(None);
            }
            Ok(Some(*GetSidSubAuthority(sid, u32::from(count) - 1)))
        }
    }

    fn broadcast_setting_change(&self, area: Option<&str>, timeout: Duration) -> OsResult<()> {
        let area = area.map(to_wide_null);
        let lparam = area.as_ref().map_or(0, |wide| wide.as_ptr() as isize);
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let mut result = 0usize;
        // SAFETY: `area` outlives the synchronous call.
        let sent = unsafe {
            SendMessageTimeoutW(
                HWND_BROADCAST,
                WM_SETTINGCHANGE,
                0,
                lparam,
                SMTO_ABORTIFHUNG,
                timeout_ms,
                &mut result,
            )
        };
        if sent == 0 {
            return Err(last_error());
        }
        Ok(())
    }
}
