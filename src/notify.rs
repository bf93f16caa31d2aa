//! Setting-change notification after registry writes.
//!
//! Other processes only pick up environment edits once a `WM_SETTINGCHANGE`
//! message has been broadcast.

use crate::backend::RegistryBackend;
use crate::error::{Operation, RegistryError, Result, ERROR_TIMEOUT};
use std::time::Duration;
use tracing::{info, warn};

/// Default broadcast timeout.
pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Setting area used after environment variable edits.
pub const ENVIRONMENT_AREA: &str = "Environment";

/// Broadcasts `WM_SETTINGCHANGE` for `area` (`None` for a general notice).
///
/// # Errors
///
/// [`RegistryError::MessageTimeout`] if the broadcast is not processed in
/// time, otherwise the translated OS error.
pub fn broadcast_setting_change<B: RegistryBackend + ?Sized>(
    backend: &B,
    area: Option<&str>,
    timeout: Duration,
) -> Result<()> {
    let label = area.unwrap_or("general");
    let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);

    match backend.broadcast_setting_change(area, timeout) {
        Ok(()) => {
            info!(area = label, timeout_ms, "Broadcast setting change");
            Ok(())
        }
        Err(code) if code.0 == ERROR_TIMEOUT => {
            warn!(area = label, timeout_ms, "Setting change broadcast timed out");
            Err(RegistryError::MessageTimeout {
                area: label.to_string(),
                timeout_ms,
                code: code.0,
            })
        }
        Err(code) => Err(RegistryError::from_os(Operation::Broadcast, code, label, None)),
    }
}
