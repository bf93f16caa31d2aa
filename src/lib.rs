//! # Windows Registry Access Layer
//!
//! Safe, typed access to the live Windows Registry, built directly on the
//! native `Reg*` API.
//!
//! ## Features
//!
//! - **Scoped handles**: every key handle is closed on every exit path
//! - **Typed values**: encoding inferred from Rust data, validated when explicit
//! - **Typed errors**: raw Win32 codes become a small [`RegistryError`] taxonomy
//! - **Write guard**: writes to machine-wide hives are refused early when the
//!   process is not elevated
//! - **Pluggable backend**: [`MemoryRegistry`] runs the same code on any host
//!
//! ## Architecture
//!
//! ```text
//! RegistryRoot  (path-relative operations, root + prefix + view)
//!   ├─ guard       write policy (read-only, elevation)
//!   ├─ handle      KeyScope: open/create, close on drop
//!   ├─ value       encode / decode / expand
//!   └─ error       OS code -> RegistryError
//!        │
//! RegistryBackend (WindowsRegistry | MemoryRegistry)
//! ```
//!
//! ## Examples
//!
//! ### Reading and writing
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> reg_env::Result<()> {
//! use reg_env::{RegistryRoot, WindowsRegistry};
//!
//! let app = RegistryRoot::new(WindowsRegistry::new(), "HKCU")?
//!     .with_prefix(r"Software\ExampleApp");
//!
//! app.put_registry_value("Config", "Count", 42u32, None)?;
//! for value in app.list_registry_values("Config")? {
//!     println!("{}", value);
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```
//!
//! ### Expandable strings
//!
//! ```rust
//! use reg_env::{MemoryRegistry, RegistryRoot, ValueType};
//!
//! # fn main() -> reg_env::Result<()> {
//! let registry = MemoryRegistry::new();
//! registry.set_env("TEMP", r"C:\Temp");
//!
//! let app = RegistryRoot::new(&registry, "HKCU")?.with_prefix("Software/ExampleApp");
//! app.put_registry_value("Config", "Log", r"%TEMP%\x.log", Some(ValueType::ExpandString))?;
//!
//! let value = app.get_registry_value("Config", "Log")?;
//! assert_eq!(value.as_str(), Some(r"%TEMP%\x.log"));
//! assert_eq!(value.expanded_data(), Some(r"C:\Temp\x.log"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod elevation;
pub mod error;
pub mod guard;
pub mod handle;
pub mod key;
pub mod memory;
pub mod notify;
pub mod path;
pub mod registry;
pub mod types;
pub mod utils;
pub mod value;

#[cfg(windows)]
pub mod windows;

// Re-export main types for convenience
pub use backend::{Access, OsCode, RawKey, RegistryBackend, View};
pub use elevation::{get_integrity_level, is_elevated, IntegrityLevel};
pub use error::{Operation, RegistryError, Result};
pub use handle::KeyScope;
pub use key::RegistryKeyInfo;
pub use memory::MemoryRegistry;
pub use notify::{broadcast_setting_change, DEFAULT_BROADCAST_TIMEOUT, ENVIRONMENT_AREA};
pub use path::KeyPath;
pub use registry::{RegistryConfig, RegistryRoot};
pub use types::{
    normalize_registry_type, normalize_root_key, RootIdentifier, RootKey, TypeIdentifier, ValueType,
};
pub use value::{expand as expand_environment_strings, RegData, RegistryValue, ValueData};

#[cfg(windows)]
pub use windows::WindowsRegistry;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
