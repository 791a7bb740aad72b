use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::DaemonState;
use crate::log_and_continue;

/// Sleep for the selected interval and tick the controller on expiry.
///
/// `rearm` restarts the wait, so a new interval or a fresh start never waits
/// out the old countdown.
pub async fn run(state: Arc<Mutex<DaemonState>>, rearm: Arc<Notify>) {
    loop {
        let interval = {
            let state = state.lock().await;
            if state.should_exit {
                break;
            }
            state.controller.interval()
        };
        log::debug!("Next rotation in {:?}", interval);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let mut state = state.lock().await;
                let controller = &mut state.controller;
                log_and_continue!(
                    tokio::task::block_in_place(|| controller.tick()),
                    "rotate wallpaper on timer tick"
                );
            }
            _ = rearm.notified() => {
                log::debug!("Rotation timer re-armed");
            }
        }
    }
}
