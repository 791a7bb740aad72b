//! The rotation state machine.
//!
//! [`Controller`] owns everything a rotation needs (settings store, monitor
//! source, compositor, wallpaper setter) and knows nothing about sockets or
//! timers. The daemon keeps exactly one behind a `tokio::sync::Mutex`, so
//! timer ticks and manual requests never rotate concurrently.

use anyhow::Result;
use chrono::{DateTime, Local};
use common::{DaemonStatus, Enablement, INTERVAL_OPTIONS, PaperError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::applier::{WallpaperSetter, WallpaperStyle};
use crate::catalog::{self, FolderStatus};
use crate::compositor::Compositor;
use crate::monitors::MonitorSource;
use crate::picker::{self, SeenSet};
use crate::settings::{Settings, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

pub struct Controller {
    store: Box<dyn SettingsStore>,
    monitors: Box<dyn MonitorSource>,
    setter: Box<dyn WallpaperSetter>,
    compositor: Compositor,
    rng: StdRng,

    state: RunState,
    folder: Option<String>,
    folder_status: FolderStatus,
    interval_index: usize,
    seen: SeenSet,

    current: Vec<PathBuf>,
    last_wallpaper: Option<PathBuf>,
    last_rotation: Option<DateTime<Local>>,
    start_time: Instant,
}

impl Controller {
    /// Build a stopped controller from the persisted settings
    pub fn new(
        store: Box<dyn SettingsStore>,
        monitors: Box<dyn MonitorSource>,
        setter: Box<dyn WallpaperSetter>,
        compositor: Compositor,
    ) -> Result<Self> {
        let settings = store.load().unwrap_or_else(|e| {
            log::warn!("Failed to load settings: {:#}. Using defaults.", e);
            Settings::default()
        });

        let interval_index = if settings.selected_interval < INTERVAL_OPTIONS.len() {
            settings.selected_interval
        } else {
            log::warn!(
                "Saved interval #{} is out of range, using {}",
                settings.selected_interval,
                INTERVAL_OPTIONS[common::DEFAULT_INTERVAL_INDEX]
            );
            common::DEFAULT_INTERVAL_INDEX
        };

        log::info!(
            "Using {} monitor source and {} wallpaper backend",
            monitors.name(),
            setter.name()
        );

        let mut controller = Self {
            store,
            monitors,
            setter,
            compositor,
            rng: StdRng::from_os_rng(),
            state: RunState::Stopped,
            folder: settings.path,
            folder_status: FolderStatus::Missing,
            interval_index,
            seen: SeenSet::from_names(settings.seen),
            current: Vec::new(),
            last_wallpaper: None,
            last_rotation: None,
            start_time: Instant::now(),
        };

        let monitor_count = controller.monitor_count();
        if let Err(e) = controller.revalidate(monitor_count) {
            log::info!("Saved wallpaper folder is not usable: {}", e);
        }
        Ok(controller)
    }

    /// Replace the random source, for reproducible selections
    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Change the wallpaper folder.
    ///
    /// The path is saved even when it is unusable. An unusable folder stops a
    /// running rotation and is reported as an error.
    pub fn set_folder(&mut self, path: &str) -> Result<(), PaperError> {
        let path = path.trim().to_string();
        if self.folder.as_deref() != Some(path.as_str()) {
            log::info!("Wallpaper folder changed to {}", path);
            self.folder = Some(path);
            self.persist()?;
        }

        let monitor_count = self.monitor_count();
        match self.revalidate(monitor_count) {
            Ok(_) => Ok(()),
            Err(e) => Err(self.folder_unusable(e)),
        }
    }

    /// Select an entry of [`INTERVAL_OPTIONS`] and return its duration
    pub fn set_interval(&mut self, index: usize) -> Result<Duration, PaperError> {
        let (label, duration) = common::interval_at(index)?;

        self.interval_index = index;
        self.persist()?;

        log::info!("Rotation interval set to {}", label);
        Ok(duration)
    }

    /// Currently selected interval
    pub fn interval(&self) -> Duration {
        common::interval_at(self.interval_index)
            .map(|(_, duration)| duration)
            .unwrap_or(Duration::from_secs(300))
    }

    pub fn interval_label(&self) -> &'static str {
        INTERVAL_OPTIONS
            .get(self.interval_index)
            .copied()
            .unwrap_or(INTERVAL_OPTIONS[common::DEFAULT_INTERVAL_INDEX])
    }

    /// Begin periodic rotation with one immediate rotation.
    ///
    /// Returns `false` when already running. If the first rotation fails the
    /// controller stays stopped.
    pub fn start(&mut self) -> Result<bool, PaperError> {
        if self.is_running() {
            log::debug!("Start requested while already running");
            return Ok(false);
        }

        self.rotate()?;
        self.state = RunState::Running;
        log::info!("Rotation started ({})", self.interval_label());
        Ok(true)
    }

    /// Returns `false` when already stopped
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.state = RunState::Stopped;
        log::info!("Rotation stopped");
        true
    }

    /// Start if stopped, stop if running. Returns the new running state.
    pub fn toggle(&mut self) -> Result<bool, PaperError> {
        if self.is_running() {
            self.stop();
            Ok(false)
        } else {
            self.start()?;
            Ok(true)
        }
    }

    /// Timer expiry. Returns whether a rotation happened.
    pub fn tick(&mut self) -> Result<bool, PaperError> {
        if !self.is_running() {
            return Ok(false);
        }
        self.rotate()?;
        Ok(true)
    }

    /// Rotate now, whether running or not
    pub fn next(&mut self) -> Result<(), PaperError> {
        self.rotate()
    }

    pub fn clear_seen(&mut self) -> Result<(), PaperError> {
        if self.seen.is_empty() {
            return Ok(());
        }
        log::info!("Forgetting {} seen image(s)", self.seen.len());
        self.seen.clear();
        self.persist()
    }

    /// Pick fresh images, compose them across all monitors and set the result.
    ///
    /// The picked images count as seen only once the wallpaper is set. A
    /// folder that turned unusable stops a running rotation.
    pub fn rotate(&mut self) -> Result<(), PaperError> {
        let monitors = self
            .monitors
            .monitors()
            .map_err(|e| PaperError::Monitor(format!("{:#}", e)))?;

        let folder = match self.revalidate(monitors.len()) {
            Ok(folder) => folder,
            Err(e) => return Err(self.folder_unusable(e)),
        };
        let catalog = catalog::scan(&folder);

        let previous_seen = self.seen.clone();
        let selection = match picker::pick(&catalog, &mut self.seen, monitors.len(), &mut self.rng) {
            Ok(selection) => selection,
            Err(e) => return Err(self.folder_unusable(e)),
        };

        let path = match self.apply(&selection.images, &monitors) {
            Ok(path) => path,
            Err(e) => {
                self.seen = previous_seen;
                return Err(e);
            }
        };
        let cycle = if selection.reset { " (new cycle)" } else { "" };
        self.current = selection.images;
        self.last_wallpaper = Some(path);
        self.last_rotation = Some(Local::now());

        log::info!(
            "Rotated {} monitor(s){}: {}",
            monitors.len(),
            cycle,
            self.current_names().join(", ")
        );
        self.persist()
    }

    /// Compose, write and set one wallpaper, returning the file on screen
    fn apply(
        &mut self,
        images: &[PathBuf],
        monitors: &[common::MonitorRect],
    ) -> Result<PathBuf, PaperError> {
        let canvas = self
            .compositor
            .compose(images, monitors)
            .map_err(|e| PaperError::Image(format!("{:#}", e)))?;
        let path = self
            .compositor
            .write(canvas)
            .map_err(|e| PaperError::Io(format!("{:#}", e)))?;

        if let Err(e) = self.setter.set(&path, WallpaperStyle::Tiled) {
            self.compositor.discard(&path);
            return Err(PaperError::Wallpaper(format!("{:#}", e)));
        }

        self.compositor.mark_applied(path.clone());
        Ok(path)
    }

    /// Which controls make sense right now
    pub fn enablement(&self) -> Enablement {
        let folder_valid = self.folder_status.is_valid();
        Enablement {
            start: folder_valid,
            interval: folder_valid,
            next: self.is_running(),
            status_label: self.is_running(),
        }
    }

    pub fn status_line(&self) -> &'static str {
        match self.state {
            RunState::Running => "PaperSwitcher - Running",
            RunState::Stopped => "PaperSwitcher",
        }
    }

    pub fn status(&self) -> DaemonStatus {
        let catalog_size = self
            .folder
            .as_ref()
            .map(|folder| catalog::scan(std::path::Path::new(folder)).len())
            .unwrap_or(0);

        DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            running: self.is_running(),
            status_line: self.status_line().to_string(),
            folder: self.folder.clone(),
            folder_valid: self.folder_status.is_valid(),
            interval: self.interval_label().to_string(),
            seen_count: self.seen.len(),
            catalog_size,
            current: self.current_names(),
            last_wallpaper: self
                .last_wallpaper
                .as_ref()
                .map(|p| p.display().to_string()),
            last_rotation: self.last_rotation.map(|t| t.to_rfc3339()),
            controls: self.enablement(),
        }
    }

    pub fn list_monitors(&self) -> Result<Vec<common::MonitorRect>, PaperError> {
        self.monitors
            .monitors()
            .map_err(|e| PaperError::Monitor(format!("{:#}", e)))
    }

    /// Start rotating right away when the saved folder is still usable
    pub fn resume_on_startup(&mut self) {
        if !self.folder_status.is_valid() {
            log::info!(
                "Not resuming rotation: {}",
                self.folder
                    .as_deref()
                    .map(|f| format!("{} ({})", f, self.folder_status.describe()))
                    .unwrap_or_else(|| "no folder selected".to_string())
            );
            return;
        }

        match self.start() {
            Ok(_) => log::info!("Resumed rotation from saved settings"),
            Err(e) => log::error!("Failed to resume rotation: {}", e),
        }
    }

    fn current_names(&self) -> Vec<String> {
        self.current.iter().map(|p| catalog::image_name(p)).collect()
    }

    /// Monitor count for folder validation; one if the source is unavailable
    fn monitor_count(&self) -> usize {
        match self.monitors.monitors() {
            Ok(monitors) => monitors.len(),
            Err(e) => {
                log::warn!("Cannot query monitors, assuming one: {:#}", e);
                1
            }
        }
    }

    /// Running requires a usable folder
    fn folder_unusable(&mut self, error: PaperError) -> PaperError {
        if self.is_running() {
            log::warn!("Stopping rotation: {}", error);
            self.state = RunState::Stopped;
        }
        error
    }

    /// Re-check the folder and return it when usable
    fn revalidate(&mut self, monitor_count: usize) -> Result<PathBuf, PaperError> {
        let Some(folder) = self.folder.as_ref().map(PathBuf::from) else {
            self.folder_status = FolderStatus::Missing;
            return Err(PaperError::FolderInvalid("no folder selected".to_string()));
        };

        self.folder_status = catalog::validate_folder(&folder, monitor_count);
        match self.folder_status {
            FolderStatus::Valid { .. } => Ok(folder),
            FolderStatus::TooFewImages { found, needed } => {
                Err(PaperError::InsufficientImages { found, needed })
            }
            ref status => Err(PaperError::FolderInvalid(format!(
                "{}: {}",
                folder.display(),
                status.describe()
            ))),
        }
    }

    fn persist(&self) -> Result<(), PaperError> {
        let settings = Settings {
            path: self.folder.clone(),
            selected_interval: self.interval_index,
            seen: self.seen.names().to_vec(),
        };

        self.store
            .save(&settings)
            .map_err(|e| PaperError::Io(format!("Failed to save settings: {:#}", e)))
    }
}
