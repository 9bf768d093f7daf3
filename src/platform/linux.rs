// SmartMark platform paths for Linux
// Config: ~/.config/smartmark
// Data:   ~/.local/share/smartmark

use std::path::PathBuf;

const APP_DIR: &str = "smartmark";

fn home<F: Fn(&str) -> Option<String>>(lookup: &F) -> PathBuf {
    PathBuf::from(lookup("HOME").unwrap_or_else(|| String::from("/tmp")))
}

/// `$XDG_CONFIG_HOME/smartmark`, falling back to `~/.config/smartmark`.
pub fn config_dir_from<F: Fn(&str) -> Option<String>>(lookup: F) -> PathBuf {
    match lookup("XDG_CONFIG_HOME") {
        Some(xdg) => PathBuf::from(xdg).join(APP_DIR),
        None => home(&lookup).join(".config").join(APP_DIR),
    }
}

/// `$XDG_DATA_HOME/smartmark`, falling back to `~/.local/share/smartmark`.
pub fn data_dir_from<F: Fn(&str) -> Option<String>>(lookup: F) -> PathBuf {
    match lookup("XDG_DATA_HOME") {
        Some(xdg) => PathBuf::from(xdg).join(APP_DIR),
        None => home(&lookup).join(".local").join("share").join(APP_DIR),
    }
}
