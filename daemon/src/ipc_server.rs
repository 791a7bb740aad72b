use anyhow::Result;
use common::{Command, INTERVAL_OPTIONS, PaperError, Response};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, Notify};

use crate::DaemonState;
use crate::error_response;

pub async fn start(state: Arc<Mutex<DaemonState>>, rearm: Arc<Notify>) -> Result<()> {
    let socket_path = common::get_socket_path();

    // Remove old socket if it exists
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    log::info!("IPC server listening on: {}", socket_path.display());

    loop {
        // Check if we should exit
        if state.lock().await.should_exit {
            break;
        }

        // Accept connections with timeout
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                let state = state.clone();
                let rearm = rearm.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, state, rearm).await {
                        log::error!("Error handling client: {}", e);
                    }
                });
            }
            Ok(Err(e)) => {
                log::error!("Error accepting connection: {}", e);
            }
            Err(_) => {
                // Timeout, continue loop to check exit condition
                continue;
            }
        }
    }

    // Clean up socket
    let _ = std::fs::remove_file(&socket_path);
    log::info!("IPC server stopped");
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    state: Arc<Mutex<DaemonState>>,
    rearm: Arc<Notify>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => handle_command(command, &state, &rearm).await,
            Err(e) => {
                log::warn!("Invalid command: {}", e);
                error_response!(Ipc, "Invalid command: {}", e)
            }
        };

        // Send response
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

/// Rotations hold the state lock from start to finish, so the timer and
/// manual requests never overlap. The image work runs on this worker via
/// `block_in_place`.
async fn handle_command(
    command: Command,
    state: &Arc<Mutex<DaemonState>>,
    rearm: &Arc<Notify>,
) -> Response {
    log::debug!("Handling command: {:?}", command);

    match command {
        Command::Ping => Response::Pong,

        Command::Status => {
            let state = state.lock().await;
            Response::Status(state.controller.status())
        }

        Command::Start => {
            let mut state = state.lock().await;
            match tokio::task::block_in_place(|| state.controller.start()) {
                Ok(started) => {
                    if started {
                        rearm.notify_one();
                    }
                    Response::Ok
                }
                Err(e) => failed("start rotation", e),
            }
        }

        Command::Stop => {
            let mut state = state.lock().await;
            state.controller.stop();
            Response::Ok
        }

        Command::Toggle => {
            let mut state = state.lock().await;
            match tokio::task::block_in_place(|| state.controller.toggle()) {
                Ok(running) => {
                    if running {
                        rearm.notify_one();
                    }
                    Response::Ok
                }
                Err(e) => failed("toggle rotation", e),
            }
        }

        Command::Next => {
            let mut state = state.lock().await;
            match tokio::task::block_in_place(|| state.controller.next()) {
                Ok(()) => Response::Ok,
                Err(e) => failed("rotate wallpaper", e),
            }
        }

        Command::SetFolder { path } => {
            log::info!("Setting wallpaper folder: {}", path);
            let mut state = state.lock().await;
            match tokio::task::block_in_place(|| state.controller.set_folder(&path)) {
                Ok(()) => Response::Ok,
                Err(e) => failed("set wallpaper folder", e),
            }
        }

        Command::SetInterval { index } => {
            let mut state = state.lock().await;
            match state.controller.set_interval(index) {
                Ok(_) => {
                    rearm.notify_one();
                    Response::Ok
                }
                Err(e) => failed("set interval", e),
            }
        }

        Command::ListIntervals => Response::Intervals(
            INTERVAL_OPTIONS
                .iter()
                .map(|label| label.to_string())
                .collect(),
        ),

        Command::ListMonitors => {
            let state = state.lock().await;
            match tokio::task::block_in_place(|| state.controller.list_monitors()) {
                Ok(monitors) => Response::Monitors(monitors),
                Err(e) => failed("list monitors", e),
            }
        }

        Command::ClearSeen => {
            let mut state = state.lock().await;
            match state.controller.clear_seen() {
                Ok(()) => Response::Ok,
                Err(e) => failed("clear seen images", e),
            }
        }

        Command::Kill => {
            log::info!("Received kill command");
            state.lock().await.should_exit = true;
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                let _ = std::fs::remove_file(common::get_socket_path());
                std::process::exit(0);
            });
            Response::Ok
        }
    }
}

fn failed(action: &str, error: PaperError) -> Response {
    log::error!("Failed to {}: {}", action, error);
    Response::Error(error)
}
