use serde::{Deserialize, Serialize};

/// Top-level application settings, stored as JSON.
///
/// Every field has a default, so a partial file (or none at all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppSettings {
    pub backend: BackendSettings,
    pub auth: AuthSettings,
    pub realtime: RealtimeSettings,
    pub logging: LoggingSettings,
}

/// Which backend the client talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSettings {
    /// Embedded SQLite backend. Without a path, the database lives in the data directory.
    Local {
        #[serde(default)]
        database_path: Option<String>,
    },
    /// Hosted backend reached over HTTP.
    Remote { url: String, anon_key: String },
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings::Local { database_path: None }
    }
}

/// OAuth redirect flow parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthSettings {
    pub provider: String,
    pub redirect_to: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            redirect_to: "http://localhost:3000".to_string(),
        }
    }
}

/// Change feed settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RealtimeSettings {
    /// How often the remote backend checks for row changes.
    pub poll_interval_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "smartmark=info".to_string(),
        }
    }
}
