//! Application state management

use std::sync::Arc;

use control_link::{ControlLink, ResolverConfig};
use control_protocol::{Command, ControlSurfaceState};
use overlay_geometry::OverlayManager;
use parking_lot::Mutex;
use tracing::info;

use crate::settings::{SettingsFile, SettingsRectStore, SharedSettings};

/// Application-wide state
pub struct AppState {
    /// The one link to the vehicle
    pub link: ControlLink,
    /// Video overlay geometry
    pub overlay: Mutex<OverlayManager<SettingsRectStore>>,
    /// Latest control surface snapshot
    pub surface: Mutex<ControlSurfaceState>,
    pub settings: SharedSettings,
}

impl AppState {
    /// Restore settings and start the link. Must run inside a tokio runtime.
    pub fn new(file: SettingsFile) -> Self {
        let settings = file.settings().clone();
        let shared: SharedSettings = Arc::new(Mutex::new(file));

        let link = ControlLink::spawn(settings.link.clone());
        if !settings.endpoint_raw.is_empty() {
            info!("Restored endpoint {:?}", settings.endpoint_raw);
            link.configure(settings.endpoint_raw.clone());
        }

        let overlay = OverlayManager::new(
            SettingsRectStore::new(shared.clone()),
            settings.viewport,
            settings.overlay_limits,
        );

        Self {
            link,
            overlay: Mutex::new(overlay),
            surface: Mutex::new(ControlSurfaceState::new()),
            settings: shared,
        }
    }

    pub fn resolver(&self) -> ResolverConfig {
        self.settings.lock().settings().link.resolver.clone()
    }

    /// Update the control surface and transmit `command` against the result
    pub fn drive(
        &self,
        update: impl FnOnce(&mut ControlSurfaceState) -> Command,
    ) -> ControlSurfaceState {
        let (command, snapshot) = {
            let mut surface = self.surface.lock();
            let command = update(&mut surface);
            (command, *surface)
        };

        self.link.send(command, snapshot);
        snapshot
    }
}
