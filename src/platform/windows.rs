// SmartMark platform paths for Windows
// Config: %APPDATA%/SmartMark
// Data:   %LOCALAPPDATA%/SmartMark

use std::path::PathBuf;

/// `%APPDATA%/SmartMark`
pub fn config_dir_from<F: Fn(&str) -> Option<String>>(lookup: F) -> PathBuf {
    let appdata = lookup("APPDATA")
        .unwrap_or_else(|| String::from("C:\\Users\\Default\\AppData\\Roaming"));
    PathBuf::from(appdata).join("SmartMark")
}

/// `%LOCALAPPDATA%/SmartMark`
pub fn data_dir_from<F: Fn(&str) -> Option<String>>(lookup: F) -> PathBuf {
    let local = lookup("LOCALAPPDATA")
        .unwrap_or_else(|| String::from("C:\\Users\\Default\\AppData\\Local"));
    PathBuf::from(local).join("SmartMark")
}
