use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{Command, DaemonStatus, INTERVAL_OPTIONS, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "pswctl")]
#[command(about = "PaperSwitcher Control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start rotating (sets a new wallpaper immediately)
    Start,

    /// Stop rotating
    Stop,

    /// Start if stopped, stop if running
    Toggle,

    /// Set a new wallpaper now without changing the running state
    Next,

    /// Show daemon status
    Status,

    /// Set the wallpaper folder
    Folder {
        /// Directory holding .jpg, .jpeg, .png or .bmp images
        path: String,
    },

    /// Set the rotation interval
    Interval {
        /// Index from `pswctl intervals`, or a label such as "10 minutes"
        value: String,
    },

    /// List selectable rotation intervals
    Intervals,

    /// List monitors the wallpaper is composed for
    Monitors,

    /// Forget which images have been shown
    ClearSeen,

    /// Check if the daemon is running
    Ping,

    /// Stop the daemon
    Kill,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Start => Command::Start,
        Commands::Stop => Command::Stop,
        Commands::Toggle => Command::Toggle,
        Commands::Next => Command::Next,
        Commands::Status => Command::Status,
        Commands::Folder { path } => Command::SetFolder {
            path: absolute_path(&path),
        },
        Commands::Interval { value } => match resolve_interval(&value) {
            Some(index) => Command::SetInterval { index },
            None => {
                eprintln!("✗ Unknown interval '{}'. Choose one of:", value);
                print_intervals(INTERVAL_OPTIONS.iter().map(|s| s.to_string()).collect());
                std::process::exit(1);
            }
        },
        Commands::Intervals => Command::ListIntervals,
        Commands::Monitors => Command::ListMonitors,
        Commands::ClearSeen => Command::ClearSeen,
        Commands::Ping => Command::Ping,
        Commands::Kill => Command::Kill,
    };

    match send_command(command).await {
        Ok(response) => {
            handle_response(response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nIs the daemon running? Try starting it with: paperswitcher");
            std::process::exit(1);
        }
    }
}

async fn send_command(command: Command) -> Result<Response> {
    let socket_path = common::get_socket_path();

    let stream = UnixStream::connect(&socket_path).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Send command
    let command_json = serde_json::to_string(&command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    // Read response
    let mut response_line = String::new();
    reader.read_line(&mut response_line).await?;

    let response: Response = serde_json::from_str(&response_line)?;
    Ok(response)
}

fn handle_response(response: Response) {
    match response {
        Response::Ok => {
            println!("✓ Success");
        }
        Response::Error(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
        Response::Status(status) => print_status(&status),
        Response::Intervals(intervals) => print_intervals(intervals),
        Response::Monitors(monitors) => {
            println!("Monitors:");
            for (index, monitor) in monitors.iter().enumerate() {
                println!(
                    "  [{}] {} - {}x{} at {},{}",
                    index, monitor.name, monitor.width, monitor.height, monitor.x, monitor.y
                );
            }
        }
        Response::Pong => {
            println!("✓ Daemon is running");
        }
    }
}

fn print_status(status: &DaemonStatus) {
    println!("{}", status.status_line);
    println!("  Version: {}", status.version);
    println!("  Uptime: {}s", status.uptime_secs);
    println!(
        "  Folder: {}{}",
        status.folder.as_deref().unwrap_or("(none)"),
        if status.folder_valid { "" } else { " (not usable)" }
    );
    println!("  Interval: {}", status.interval);
    println!(
        "  Images: {} in folder, {} seen",
        status.catalog_size, status.seen_count
    );
    if !status.current.is_empty() {
        println!("  Showing:");
        for (index, name) in status.current.iter().enumerate() {
            println!("    [{}] {}", index, name);
        }
    }
    if let Some(ref when) = status.last_rotation {
        println!("  Last rotation: {}", when);
    }
    if let Some(ref file) = status.last_wallpaper {
        println!("  Wallpaper file: {}", file);
    }
}

fn print_intervals(intervals: Vec<String>) {
    for (index, label) in intervals.iter().enumerate() {
        println!("  {:>2}  {}", index, label);
    }
}

/// Accept either a list index or one of the labels (case-insensitive)
fn resolve_interval(value: &str) -> Option<usize> {
    let value = value.trim();
    if let Ok(index) = value.parse::<usize>() {
        return (index < INTERVAL_OPTIONS.len()).then_some(index);
    }

    INTERVAL_OPTIONS
        .iter()
        .position(|label| label.eq_ignore_ascii_case(value))
}

/// The daemon has its own working directory, so send absolute paths
fn absolute_path(path: &str) -> String {
    std::path::absolute(path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_interval_by_index() {
        assert_eq!(resolve_interval("0"), Some(0));
        assert_eq!(resolve_interval(" 4 "), Some(4));
        assert_eq!(resolve_interval("12"), None);
    }

    #[test]
    fn test_resolve_interval_by_label() {
        assert_eq!(resolve_interval("1 minute"), Some(3));
        assert_eq!(resolve_interval("24 Hours"), Some(11));
        assert_eq!(resolve_interval("3 minutes"), None);
    }

    #[test]
    fn test_absolute_path() {
        assert_eq!(absolute_path("/walls"), "/walls");
        assert!(absolute_path("walls").starts_with('/'));
    }
}
