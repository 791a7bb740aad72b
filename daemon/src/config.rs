use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use crate::validate_enum;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub compositor: CompositorSettings,

    #[serde(default)]
    pub applier: ApplierSettings,

    /// Static monitor layout, used when `general.monitor_source = "static"`
    #[serde(default)]
    pub monitor: Vec<MonitorConfig>,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_monitor_source")]
    pub monitor_source: String,

    /// Resume rotation at startup when the saved folder is still valid
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            monitor_source: default_monitor_source(),
            auto_start: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_monitor_source() -> String {
    "wayland".to_string()
}
fn default_true() -> bool {
    true
}

/// Composite output settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompositorSettings {
    /// Output file format: png, bmp or jpeg
    #[serde(default = "default_format")]
    pub format: String,

    /// Resize filter: nearest, bilinear, catmull-rom, lanczos3
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Directory for composed wallpapers (defaults to the system temp dir)
    #[serde(default)]
    pub output_dir: Option<String>,

    /// How many composed files to keep on disk, current one included
    #[serde(default = "default_keep_files")]
    pub keep_files: usize,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            format: default_format(),
            filter: default_filter(),
            output_dir: None,
            keep_files: default_keep_files(),
        }
    }
}

fn default_format() -> String {
    "png".to_string()
}
fn default_filter() -> String {
    "lanczos3".to_string()
}
fn default_keep_files() -> usize {
    2
}

/// How the composed file is handed to the desktop
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApplierSettings {
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Program and arguments for the "command" backend; the file path is appended
    #[serde(default)]
    pub command: Vec<String>,
}

impl Default for ApplierSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            command: Vec::new(),
        }
    }
}

fn default_backend() -> String {
    "desktop".to_string()
}

/// One monitor of a static layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    pub name: String,

    #[serde(default)]
    pub x: i32,

    #[serde(default)]
    pub y: i32,

    pub width: u32,
    pub height: u32,
}

impl MonitorConfig {
    pub fn to_rect(&self) -> common::MonitorRect {
        common::MonitorRect::new(self.name.clone(), self.x, self.y, self.width, self.height)
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("paperswitcher");

        Ok(config_dir.join("config.toml"))
    }

    /// Directory composed wallpapers are written to
    pub fn output_dir(&self) -> PathBuf {
        match self.compositor.output_dir {
            Some(ref dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => std::env::temp_dir(),
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        match self.general.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.general.log_level),
        }

        self.validate_monitor_source(&self.general.monitor_source)?;
        self.validate_format(&self.compositor.format)?;
        self.validate_filter(&self.compositor.filter)?;
        self.validate_backend(&self.applier.backend)?;

        if self.compositor.keep_files == 0 {
            anyhow::bail!("compositor.keep_files must be at least 1");
        }

        if self.applier.backend == "command" && self.applier.command.is_empty() {
            anyhow::bail!("applier.command must be set when backend = \"command\"");
        }

        if self.general.monitor_source == "static" && self.monitor.is_empty() {
            anyhow::bail!("monitor_source = \"static\" needs at least one [[monitor]] entry");
        }

        for monitor in &self.monitor {
            if monitor.width == 0 || monitor.height == 0 {
                anyhow::bail!("Monitor '{}' has an empty size", monitor.name);
            }
        }

        Ok(())
    }

    fn validate_monitor_source(&self, source: &str) -> Result<()> {
        validate_enum!(source, "wayland", "static")
    }

    fn validate_format(&self, format: &str) -> Result<()> {
        validate_enum!(format, "png", "bmp", "jpeg")
    }

    fn validate_filter(&self, filter: &str) -> Result<()> {
        validate_enum!(filter, "nearest", "bilinear", "catmull-rom", "lanczos3")
    }

    fn validate_backend(&self, backend: &str) -> Result<()> {
        validate_enum!(backend, "desktop", "command")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.monitor_source, "wayland");
        assert!(config.general.auto_start);
        assert_eq!(config.compositor.format, "png");
        assert_eq!(config.compositor.keep_files, 2);
        assert_eq!(config.applier.backend, "desktop");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_static_monitor_layout() {
        let toml = r#"
[general]
monitor_source = "static"

[compositor]
format = "bmp"
output_dir = "/tmp/papers"

[[monitor]]
name = "left"
width = 1920
height = 1080

[[monitor]]
name = "right"
x = 1920
width = 2560
height = 1440
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor.len(), 2);
        assert_eq!(
            config.monitor[1].to_rect(),
            common::MonitorRect::new("right", 1920, 0, 2560, 1440)
        );
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/papers"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config: Config = toml::from_str("[compositor]\nformat = \"gif\"\n").unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[general]\nlog_level = \"loud\"\n").unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[general]\nmonitor_source = \"static\"\n").unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[applier]\nbackend = \"command\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.compositor.filter, "lanczos3");
    }
}
