//! Error types for registry access operations.
//!
//! Every public operation either returns a fully typed result or exactly one
//! [`RegistryError`] variant. Raw OS failure codes never escape on their own:
//! they are translated here by [`RegistryError::from_os`] and kept on the
//! variant for diagnostics.

use crate::backend::OsCode;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// `ERROR_FILE_NOT_FOUND`
pub const ERROR_FILE_NOT_FOUND: u32 = 2;
/// `ERROR_PATH_NOT_FOUND`
pub const ERROR_PATH_NOT_FOUND: u32 = 3;
/// `ERROR_ACCESS_DENIED`
pub const ERROR_ACCESS_DENIED: u32 = 5;
/// `ERROR_INVALID_HANDLE`
pub const ERROR_INVALID_HANDLE: u32 = 6;
/// `ERROR_INVALID_PARAMETER`
pub const ERROR_INVALID_PARAMETER: u32 = 87;
/// `ERROR_INSUFFICIENT_BUFFER`
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
/// `ERROR_DIR_NOT_EMPTY`
pub const ERROR_DIR_NOT_EMPTY: u32 = 145;
/// `ERROR_MORE_DATA`
pub const ERROR_MORE_DATA: u32 = 234;
/// `ERROR_NO_MORE_ITEMS`
pub const ERROR_NO_MORE_ITEMS: u32 = 259;
/// `ERROR_KEY_DELETED`
pub const ERROR_KEY_DELETED: u32 = 1018;
/// `ERROR_PRIVILEGE_NOT_HELD`
pub const ERROR_PRIVILEGE_NOT_HELD: u32 = 1314;
/// `ERROR_TIMEOUT`
pub const ERROR_TIMEOUT: u32 = 1460;

/// The collaborator call that produced an OS failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Opening an existing key.
    OpenKey,
    /// Opening or creating a key.
    CreateKey,
    /// Reading a single value.
    QueryValue,
    /// Writing a single value.
    SetValue,
    /// Removing a single value.
    DeleteValue,
    /// Removing a key.
    DeleteKey,
    /// Enumerating the values of a key.
    EnumValues,
    /// Enumerating the subkeys of a key.
    EnumSubkeys,
    /// Reading key metadata.
    QueryInfo,
    /// Releasing a key handle.
    CloseKey,
    /// Expanding `%VAR%` references.
    Expand,
    /// Reading the process integrity level.
    IntegrityLevel,
    /// Broadcasting a setting change.
    Broadcast,
}

impl Operation {
    /// True for operations that address a single named value.
    pub fn is_value_operation(&self) -> bool {
        matches!(self, Operation::QueryValue | Operation::DeleteValue)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::OpenKey => "open key",
            Operation::CreateKey => "create key",
            Operation::QueryValue => "query value",
            Operation::SetValue => "set value",
            Operation::DeleteValue => "delete value",
            Operation::DeleteKey => "delete key",
            Operation::EnumValues => "enumerate values",
            Operation::EnumSubkeys => "enumerate subkeys",
            Operation::QueryInfo => "query key info",
            Operation::CloseKey => "close key",
            Operation::Expand => "expand environment strings",
            Operation::IntegrityLevel => "query integrity level",
            Operation::Broadcast => "broadcast setting change",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while accessing the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A key (or one of its ancestors) does not exist.
    #[error("Registry key '{path}' not found")]
    KeyNotFound {
        /// Absolute key path below the root hive.
        path: String,
        /// Originating OS code.
        code: Option<u32>,
    },

    /// A named value does not exist within an existing key.
    #[error("Registry value '{name}' not found in key '{path}'")]
    ValueNotFound {
        /// Absolute key path below the root hive.
        path: String,
        /// Value name (`""` is the default value).
        name: String,
        /// Originating OS code.
        code: Option<u32>,
    },

    /// Delete was attempted on a key that still holds subkeys or values.
    #[error("Registry key '{path}' is not empty ({subkeys} subkeys, {values} values)")]
    KeyNotEmpty {
        /// Absolute key path below the root hive.
        path: String,
        /// Subkeys found at the time of the check.
        subkeys: u32,
        /// Values found at the time of the check.
        values: u32,
        /// Originating OS code.
        code: Option<u32>,
    },

    /// The operation was refused, either by the OS or by the access guard.
    #[error("Permission denied: {reason}")]
    PermissionDenied {
        /// Human-readable reason.
        reason: String,
        /// Originating OS code, `None` for pre-checks.
        code: Option<u32>,
    },

    /// Unrecognized root-key or value-type identifier, or malformed
    /// integrity-level data.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Value data does not fit the requested or inferred encoding.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Expanding an expandable string failed.
    #[error("Failed to expand environment strings in '{text}' (code {code})")]
    Expansion {
        /// The unexpanded input.
        text: String,
        /// Originating OS code.
        code: u32,
    },

    /// A setting-change broadcast was not acknowledged in time.
    #[error("Setting change broadcast for '{area}' timed out after {timeout_ms}ms")]
    MessageTimeout {
        /// Setting area that was broadcast.
        area: String,
        /// Timeout that elapsed.
        timeout_ms: u32,
        /// Originating OS code.
        code: u32,
    },

    /// Any other OS failure.
    #[error("Registry operation '{operation}' failed on '{path}' (code {code})")]
    Os {
        /// Collaborator call that failed.
        operation: Operation,
        /// Key path (or other subject) involved.
        path: String,
        /// Raw OS code.
        code: u32,
    },
}

impl RegistryError {
    /// Translates an OS failure code into the typed taxonomy.
    ///
    /// # Arguments
    ///
    /// * `operation` - The collaborator call that failed.
    /// * `code` - The raw failure code.
    /// * `path` - Key path involved, used for context.
    /// * `name` - Value name for value operations.
    pub fn from_os(operation: Operation, code: OsCode, path: &str, name: Option<&str>) -> Self {
        let raw = code.0;
        let error = match raw {
            ERROR_FILE_NOT_FOUND if operation.is_value_operation() => Self::ValueNotFound {
                path: path.to_string(),
                name: name.unwrap_or_default().to_string(),
                code: Some(raw),
            },
            ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND | ERROR_KEY_DELETED => Self::KeyNotFound {
                path: path.to_string(),
                code: Some(raw),
            },
            ERROR_ACCESS_DENIED | ERROR_PRIVILEGE_NOT_HELD => Self::PermissionDenied {
                reason: match name {
                    Some(name) => format!("{} on '{}', value '{}'", operation, path, name),
                    None => format!("{} on '{}'", operation, path),
                },
                code: Some(raw),
            },
            ERROR_DIR_NOT_EMPTY => Self::KeyNotEmpty {
                path: path.to_string(),
                subkeys: 0,
                values: 0,
                code: Some(raw),
            },
            _ => Self::Os {
                operation,
                path: path.to_string(),
                code: raw,
            },
        };

        debug!(code = raw, %operation, path, ?name, kind = error.kind(), "Translated OS error");
        error
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an invalid identifier error.
    pub fn invalid_identifier(message: impl Into<String>) -> Self {
        Self::InvalidIdentifier(message.into())
    }

    /// Creates a permission error raised before any OS call.
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
            code: None,
        }
    }

    /// Returns the originating OS code, if the error came from the OS.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::KeyNotFound { code, .. }
            | Self::ValueNotFound { code, .. }
            | Self::KeyNotEmpty { code, .. }
            | Self::PermissionDenied { code, .. } => *code,
            Self::Expansion { code, .. }
            | Self::MessageTimeout { code, .. }
            | Self::Os { code, .. } => {
                Some(*code)
            }
            Self::InvalidIdentifier(_) | Self::Validation(_) => None,
        }
    }

    /// Short, stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeyNotFound { .. } => "KeyNotFound",
            Self::ValueNotFound { .. } => "ValueNotFound",
            Self::KeyNotEmpty { .. } => "KeyNotEmpty",
            Self::PermissionDenied { .. } => "PermissionDenied",
            Self::InvalidIdentifier(_) => "InvalidIdentifier",
            Self::Validation(_) => "Validation",
            Self::Expansion { .. } => "Expansion",
            Self::MessageTimeout { .. } => "MessageTimeout",
            Self::Os { .. } => "Os",
        }
    }

    /// True for [`RegistryError::KeyNotFound`] and [`RegistryError::ValueNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. } | Self::ValueNotFound { .. })
    }
}
