// SmartMark platform abstraction
// Resolves where the settings file and the local database live on each OS.
//
// Each platform module exposes `*_from(lookup)` variants that read variables
// through a closure, so path resolution is testable without touching the
// process environment.

use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
use linux as current;
#[cfg(target_os = "macos")]
use macos as current;
#[cfg(target_os = "windows")]
use windows as current;

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Returns the platform-specific configuration directory for SmartMark.
///
/// - **Linux**: `$XDG_CONFIG_HOME/smartmark` or `~/.config/smartmark`
/// - **macOS**: `~/Library/Application Support/SmartMark`
/// - **Windows**: `%APPDATA%/SmartMark`
pub fn get_config_dir() -> PathBuf {
    current::config_dir_from(env_lookup)
}

/// Returns the platform-specific data directory for SmartMark.
///
/// - **Linux**: `$XDG_DATA_HOME/smartmark` or `~/.local/share/smartmark`
/// - **macOS**: `~/Library/Application Support/SmartMark`
/// - **Windows**: `%LOCALAPPDATA%/SmartMark`
pub fn get_data_dir() -> PathBuf {
    current::data_dir_from(env_lookup)
}
