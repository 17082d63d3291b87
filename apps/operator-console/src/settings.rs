//! Persisted operator settings
//!
//! One JSON file holds the endpoint the operator typed, the overlay rect and
//! optional link tuning. It is read once at startup and rewritten on every
//! committed change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use control_link::LinkConfig;
use overlay_geometry::{OverlayLimits, OverlayRect, RectStore, StoreError, StoreResult, Viewport};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Environment variable naming the settings file
pub const SETTINGS_ENV: &str = "ROVER_SETTINGS";

pub const DEFAULT_SETTINGS_PATH: &str = "rover-settings.json";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub endpoint_raw: String,
    pub overlay_rect: Option<OverlayRect>,
    pub viewport: Viewport,
    pub overlay_limits: OverlayLimits,
    pub link: LinkConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint_raw: String::new(),
            overlay_rect: None,
            // Phone in portrait
            viewport: Viewport::new(400.0, 800.0),
            overlay_limits: OverlayLimits::default(),
            link: LinkConfig::default(),
        }
    }
}

/// Settings plus where they are written; `path: None` keeps them in memory
#[derive(Debug)]
pub struct SettingsFile {
    path: Option<PathBuf>,
    settings: Settings,
}

impl SettingsFile {
    /// Path from `ROVER_SETTINGS`, or the default next to the binary's cwd
    pub fn default_path() -> PathBuf {
        std::env::var_os(SETTINGS_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH))
    }

    /// Load settings; a missing file means first run
    pub fn load(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let settings = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings at {}, starting fresh", path.display());
                Settings::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            settings,
        })
    }

    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Apply `f` and write the result out
    pub fn update(&mut self, f: impl FnOnce(&mut Settings)) -> SettingsResult<()> {
        f(&mut self.settings);
        self.save()
    }

    fn save(&self) -> SettingsResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.settings)?;
        std::fs::write(path, json)?;
        debug!("Settings written to {}", path.display());
        Ok(())
    }
}

pub type SharedSettings = Arc<Mutex<SettingsFile>>;

/// Overlay persistence backed by the settings file
pub struct SettingsRectStore {
    settings: SharedSettings,
}

impl SettingsRectStore {
    pub fn new(settings: SharedSettings) -> Self {
        Self { settings }
    }
}

impl RectStore for SettingsRectStore {
    fn load(&self) -> StoreResult<Option<OverlayRect>> {
        Ok(self.settings.lock().settings().overlay_rect)
    }

    fn save(&mut self, rect: &OverlayRect) -> StoreResult<()> {
        let rect = *rect;
        self.settings
            .lock()
            .update(|settings| settings.overlay_rect = Some(rect))
            .map_err(|e| match e {
                SettingsError::Io(e) => StoreError::Io(e),
                SettingsError::Json(e) => StoreError::Format(e.to_string()),
            })
    }
}
