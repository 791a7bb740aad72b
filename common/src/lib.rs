//! Common types and utilities for PaperSwitcher.
//!
//! This crate defines the shared data structures and IPC protocol used for
//! communication between the daemon (`paperswitcher`) and
//! client (`pswctl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using JSON-serialized
//! messages, one per line. The client sends [`Command`] variants and receives
//! [`Response`] variants.
//!
//! # Examples
//!
//! ```no_run
//! use common::Command;
//!
//! // Point the daemon at a new wallpaper folder
//! let cmd = Command::SetFolder {
//!     path: "/home/me/Pictures/walls".to_string(),
//! };
//!
//! // Serialize for sending over IPC
//! let json = serde_json::to_string(&cmd).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Common error types shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PaperError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Wallpaper error: {0}")]
    Wallpaper(String),

    #[error("Monitor error: {0}")]
    Monitor(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Wallpaper folder is not usable: {0}")]
    FolderInvalid(String),

    #[error("Insufficient images: found {found}, need at least {needed}")]
    InsufficientImages { found: usize, needed: usize },

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

impl From<std::io::Error> for PaperError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for PaperError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// Commands sent from client to daemon via IPC.
///
/// # Examples
///
/// ```
/// use common::Command;
///
/// // Pick the "1 minute" entry of the interval list
/// let cmd = Command::SetInterval { index: 3 };
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub enum Command {
    /// Ping the daemon
    Ping,
    /// Query daemon status
    Status,
    /// Start periodic rotation (rotates once immediately)
    Start,
    /// Stop periodic rotation
    Stop,
    /// Start if stopped, stop if running
    Toggle,
    /// Rotate once now without changing the running state
    Next,
    /// Change the wallpaper folder.
    ///
    /// The folder is persisted even when it turns out to be invalid, so the
    /// user can fix it later without retyping it.
    SetFolder {
        /// Directory holding the wallpaper images
        path: String,
    },
    /// Change the rotation interval
    SetInterval {
        /// Index into [`INTERVAL_OPTIONS`]
        index: usize,
    },
    /// List the selectable rotation intervals
    ListIntervals,
    /// List the monitors the compositor will cover
    ListMonitors,
    /// Forget every image shown so far
    ClearSeen,
    /// Kill the daemon
    Kill,
}

/// Response from daemon to client
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Pong,
    Error(PaperError),
    Status(DaemonStatus),
    Intervals(Vec<String>),
    Monitors(Vec<MonitorRect>),
}

/// Daemon status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub running: bool,
    /// Window/tray style status line
    pub status_line: String,
    pub folder: Option<String>,
    pub folder_valid: bool,
    pub interval: String,
    pub seen_count: usize,
    pub catalog_size: usize,
    /// File names currently shown, in monitor order
    pub current: Vec<String>,
    pub last_wallpaper: Option<String>,
    /// RFC 3339 timestamp of the last successful rotation
    pub last_rotation: Option<String>,
    pub controls: Enablement,
}

/// Which controls a front end should offer in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enablement {
    pub start: bool,
    pub interval: bool,
    pub next: bool,
    pub status_label: bool,
}

/// A monitor rectangle in virtual-desktop coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRect {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl MonitorRect {
    pub fn new(name: impl Into<String>, x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }
}

/// Selectable rotation intervals, in the order the settings index refers to.
pub const INTERVAL_OPTIONS: &[&str] = &[
    "5 seconds",
    "10 seconds",
    "30 seconds",
    "1 minute",
    "5 minutes",
    "10 minutes",
    "30 minutes",
    "1 hour",
    "2 hours",
    "6 hours",
    "12 hours",
    "24 hours",
];

/// Index of "5 minutes", used when nothing valid is stored
pub const DEFAULT_INTERVAL_INDEX: usize = 4;

/// Parse an interval label of the form `<count> <unit>`.
///
/// ```
/// use std::time::Duration;
/// assert_eq!(common::parse_interval("1 minute").unwrap(), Duration::from_secs(60));
/// assert!(common::parse_interval("3 fortnights").is_err());
/// ```
pub fn parse_interval(label: &str) -> Result<Duration, PaperError> {
    let mut parts = label.split_whitespace();
    let (Some(count), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(PaperError::InvalidInterval(format!(
            "{} (expected '<count> <unit>')",
            label
        )));
    };

    let count: u64 = count
        .parse()
        .map_err(|_| PaperError::InvalidInterval(format!("bad count in '{}'", label)))?;

    let secs = match unit {
        "second" | "seconds" => count,
        "minute" | "minutes" => count * 60,
        "hour" | "hours" => count * 60 * 60,
        _ => {
            return Err(PaperError::InvalidInterval(format!(
                "unknown unit '{}' in '{}'",
                unit, label
            )));
        }
    };

    if secs == 0 {
        return Err(PaperError::InvalidInterval(format!(
            "{} is not a positive duration",
            label
        )));
    }

    Ok(Duration::from_secs(secs))
}

/// Look up an interval option by index
pub fn interval_at(index: usize) -> Result<(&'static str, Duration), PaperError> {
    let label = INTERVAL_OPTIONS.get(index).ok_or_else(|| {
        PaperError::InvalidInterval(format!(
            "index {} out of range (0-{})",
            index,
            INTERVAL_OPTIONS.len() - 1
        ))
    })?;

    Ok((label, parse_interval(label)?))
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("paperswitcher.sock")
}
