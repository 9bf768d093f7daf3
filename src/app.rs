//! App Core for SmartMark.
//!
//! Central struct holding the settings, the configured backend and the view controller.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::database::Database;
use crate::managers::view_controller::ViewController;
use crate::services::backend::AnyBackend;
use crate::services::local_backend::LocalBackend;
use crate::services::rest_backend::RestBackend;
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::types::settings::{AppSettings, BackendSettings};

/// Central application struct.
pub struct App {
    pub settings: AppSettings,
    pub controller: ViewController<AnyBackend>,
}

impl App {
    /// Creates the App from a loaded settings engine, opening the selected backend.
    ///
    /// Must run outside the async runtime: the remote backend owns a blocking HTTP client.
    pub fn new(engine: &SettingsEngine) -> Result<Self, Box<dyn std::error::Error>> {
        let settings = engine.get_settings().clone();
        let db_path = engine.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let backend = match &settings.backend {
            BackendSettings::Local { .. } => {
                info!(path = %db_path.display(), "using local backend");
                AnyBackend::Local(LocalBackend::open(&db_path)?)
            }
            BackendSettings::Remote { url, anon_key } => {
                info!(%url, "using remote backend");
                let poll = Duration::from_millis(settings.realtime.poll_interval_ms);
                AnyBackend::Remote(RestBackend::new(url, anon_key, Database::open(&db_path)?, poll)?)
            }
        };

        Ok(Self::with_backend(settings, backend))
    }

    /// Creates the App around an already constructed backend.
    pub fn with_backend(settings: AppSettings, backend: AnyBackend) -> Self {
        let controller = ViewController::new(Arc::new(backend), settings.auth.clone());
        Self { settings, controller }
    }

    /// Releases live resources (the change feed).
    pub fn shutdown(&self) {
        self.controller.shutdown();
    }
}
