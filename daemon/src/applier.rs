use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

use crate::config::ApplierSettings;

/// How the desktop should place the wallpaper file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallpaperStyle {
    /// Map the image 1:1 starting at the virtual desktop origin
    Tiled,
    Span,
    Fill,
    Center,
}

impl From<WallpaperStyle> for wallpaper::Mode {
    fn from(style: WallpaperStyle) -> Self {
        match style {
            WallpaperStyle::Tiled => wallpaper::Mode::Tile,
            WallpaperStyle::Span => wallpaper::Mode::Span,
            WallpaperStyle::Fill => wallpaper::Mode::Crop,
            WallpaperStyle::Center => wallpaper::Mode::Center,
        }
    }
}

/// Hands a finished wallpaper file to the desktop
pub trait WallpaperSetter: Send {
    fn name(&self) -> &str;
    fn set(&self, path: &Path, style: WallpaperStyle) -> Result<()>;
}

/// Uses the desktop environment's own wallpaper setting
pub struct DesktopSetter;

impl WallpaperSetter for DesktopSetter {
    fn name(&self) -> &str {
        "desktop"
    }

    fn set(&self, path: &Path, style: WallpaperStyle) -> Result<()> {
        let path_str = path
            .to_str()
            .context("Wallpaper path is not valid UTF-8")?;

        // Some desktops have no placement setting; the file is still worth setting
        if let Err(e) = wallpaper::set_mode(style.into()) {
            log::warn!("Failed to set wallpaper mode {:?}: {}", style, e);
        }

        wallpaper::set_from_path(path_str)
            .map_err(|e| anyhow::anyhow!("Failed to set wallpaper {}: {}", path.display(), e))?;

        log::info!("Wallpaper set to {} ({:?})", path.display(), style);
        Ok(())
    }
}

/// Runs an external program with the wallpaper path as its last argument.
///
/// The program is expected to exit once the wallpaper is set
/// (`feh --bg-tile`, `xwallpaper --tile`, ...).
pub struct CommandSetter {
    program: String,
    args: Vec<String>,
}

impl CommandSetter {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("Wallpaper command is empty")?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl WallpaperSetter for CommandSetter {
    fn name(&self) -> &str {
        &self.program
    }

    fn set(&self, path: &Path, style: WallpaperStyle) -> Result<()> {
        log::debug!(
            "Running {} {:?} {} ({:?})",
            self.program,
            self.args,
            path.display(),
            style
        );

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !status.success() {
            anyhow::bail!("{} exited with {}", self.program, status);
        }

        log::info!("Wallpaper set to {} via {}", path.display(), self.program);
        Ok(())
    }
}

/// Build the setter selected in the config
pub fn from_settings(settings: &ApplierSettings) -> Result<Box<dyn WallpaperSetter>> {
    match settings.backend.as_str() {
        "desktop" => Ok(Box::new(DesktopSetter)),
        "command" => Ok(Box::new(CommandSetter::new(&settings.command)?)),
        other => anyhow::bail!("Unknown wallpaper backend: {}", other),
    }
}
