// SmartMark Settings Engine
// Loads settings from a JSON file at the platform config path, applies
// environment overrides and validates the result.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::platform;
use crate::types::errors::ConfigError;
use crate::types::settings::{AppSettings, BackendSettings};

/// Path of the config file, overriding the platform default.
pub const ENV_CONFIG: &str = "SMARTMARK_CONFIG";
/// Hosted backend URL. Setting it switches the backend to `remote`.
pub const ENV_BACKEND_URL: &str = "SMARTMARK_BACKEND_URL";
pub const ENV_ANON_KEY: &str = "SMARTMARK_ANON_KEY";
/// Directory for the local database and persisted session.
pub const ENV_DATA_DIR: &str = "SMARTMARK_DATA_DIR";

const DEFAULT_DB_FILE: &str = "smartmark.db";

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<AppSettings, ConfigError>;
    fn save(&self) -> Result<(), ConfigError>;
    fn get_settings(&self) -> &AppSettings;
    fn get_config_path(&self) -> &str;
}

/// Settings engine implementation that persists settings as JSON on disk.
pub struct SettingsEngine {
    config_path: String,
    settings: AppSettings,
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl SettingsEngine {
    /// Creates a new SettingsEngine reading the process environment.
    ///
    /// If `path_override` is `Some`, uses that path for the config file.
    /// Otherwise uses `$SMARTMARK_CONFIG`, then `smartmark.json` in the platform config directory.
    pub fn new(path_override: Option<String>) -> Self {
        Self::with_env(path_override, |key| env::var(key).ok())
    }

    /// Creates a SettingsEngine that resolves environment variables through `lookup`.
    pub fn with_env<F>(path_override: Option<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let config_path = path_override
            .or_else(|| lookup(ENV_CONFIG))
            .unwrap_or_else(|| {
                platform::get_config_dir()
                    .join("smartmark.json")
                    .to_string_lossy()
                    .to_string()
            });

        Self {
            config_path,
            settings: AppSettings::default(),
            lookup: Box::new(lookup),
        }
    }

    /// Directory holding local data: `$SMARTMARK_DATA_DIR` or the platform data directory.
    pub fn data_dir(&self) -> PathBuf {
        (self.lookup)(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(platform::get_data_dir)
    }

    /// Path of the SQLite database used by the selected backend.
    ///
    /// The remote backend keeps only the persisted session there.
    pub fn database_path(&self) -> PathBuf {
        match &self.settings.backend {
            BackendSettings::Local {
                database_path: Some(path),
            } => PathBuf::from(path),
            _ => self.data_dir().join(DEFAULT_DB_FILE),
        }
    }

    fn apply_env_overrides(&mut self) {
        let url = (self.lookup)(ENV_BACKEND_URL);
        let key = (self.lookup)(ENV_ANON_KEY);

        if let BackendSettings::Remote {
            url: current_url,
            anon_key,
        } = &mut self.settings.backend
        {
            if let Some(url) = url {
                *current_url = url;
            }
            if let Some(key) = key {
                *anon_key = key;
            }
            return;
        }

        if let Some(url) = url {
            self.settings.backend = BackendSettings::Remote {
                url,
                anon_key: key.unwrap_or_default(),
            };
        }
    }

    /// Checks values that deserialize fine but cannot work.
    pub fn validate(settings: &AppSettings) -> Result<(), ConfigError> {
        if let BackendSettings::Remote { url, anon_key } = &settings.backend {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "backend url must start with http:// or https://, got '{}'",
                    url
                )));
            }
            if anon_key.is_empty() {
                return Err(ConfigError::Invalid("remote backend requires an anon key".to_string()));
            }
        }
        if settings.auth.provider.is_empty() {
            return Err(ConfigError::Invalid("auth provider cannot be empty".to_string()));
        }
        if settings.realtime.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("realtime.poll_interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Loads settings from the JSON config file, then applies environment overrides.
    ///
    /// A missing file yields defaults. A malformed file is an error.
    fn load(&mut self) -> Result<AppSettings, ConfigError> {
        let path = Path::new(&self.config_path);

        self.settings = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(format!("Failed to read config file: {}", e)))?;
            serde_json::from_str(&content)
                .map_err(|e| ConfigError::Parse(format!("Failed to parse config file: {}", e)))?
        } else {
            AppSettings::default()
        };

        self.apply_env_overrides();
        Self::validate(&self.settings)?;
        Ok(self.settings.clone())
    }

    /// Saves the current settings to the JSON config file, creating parent directories.
    fn save(&self) -> Result<(), ConfigError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Io(format!("Failed to create config directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(&self.settings)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize settings: {}", e)))?;

        fs::write(path, json).map_err(|e| ConfigError::Io(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn get_settings(&self) -> &AppSettings {
        &self.settings
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
