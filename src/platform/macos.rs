// SmartMark platform paths for macOS
// Config and data share ~/Library/Application Support/SmartMark

use std::path::PathBuf;

fn support_dir<F: Fn(&str) -> Option<String>>(lookup: F) -> PathBuf {
    PathBuf::from(lookup("HOME").unwrap_or_else(|| String::from("/tmp")))
        .join("Library")
        .join("Application Support")
        .join("SmartMark")
}

/// `~/Library/Application Support/SmartMark`
pub fn config_dir_from<F: Fn(&str) -> Option<String>>(lookup: F) -> PathBuf {
    support_dir(lookup)
}

/// `~/Library/Application Support/SmartMark`
pub fn data_dir_from<F: Fn(&str) -> Option<String>>(lookup: F) -> PathBuf {
    support_dir(lookup)
}
