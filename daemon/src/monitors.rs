use anyhow::{Context, Result};
use common::MonitorRect;
use smithay_client_toolkit::{
    delegate_output, delegate_registry,
    output::{OutputHandler, OutputInfo, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
};
use wayland_client::{Connection, QueueHandle, globals::registry_queue_init, protocol::wl_output};

use crate::config::Config;

/// Reports the current monitor layout in virtual desktop coordinates
pub trait MonitorSource: Send {
    fn name(&self) -> &str;
    fn monitors(&self) -> Result<Vec<MonitorRect>>;
}

/// Monitors listed by hand in the config file
pub struct StaticMonitors {
    monitors: Vec<MonitorRect>,
}

impl StaticMonitors {
    pub fn new(monitors: Vec<MonitorRect>) -> Self {
        Self { monitors }
    }
}

impl MonitorSource for StaticMonitors {
    fn name(&self) -> &str {
        "static"
    }

    fn monitors(&self) -> Result<Vec<MonitorRect>> {
        if self.monitors.is_empty() {
            anyhow::bail!("No monitors configured");
        }
        Ok(self.monitors.clone())
    }
}

/// Queries the compositor's `wl_output`s on every call.
///
/// A fresh connection is made each time so hotplugged monitors show up at
/// the next rotation.
pub struct WaylandMonitors;

impl MonitorSource for WaylandMonitors {
    fn name(&self) -> &str {
        "wayland"
    }

    fn monitors(&self) -> Result<Vec<MonitorRect>> {
        let conn = Connection::connect_to_env().context("Failed to connect to Wayland")?;
        let (globals, mut event_queue) = registry_queue_init(&conn)?;
        let qh = event_queue.handle();

        let mut scan = OutputScan {
            registry_state: RegistryState::new(&globals),
            output_state: OutputState::new(&globals, &qh),
        };

        // First roundtrip binds the outputs, the second delivers their geometry
        event_queue.roundtrip(&mut scan)?;
        event_queue.roundtrip(&mut scan)?;

        let monitors: Vec<MonitorRect> = scan
            .output_state
            .outputs()
            .filter_map(|output| scan.output_state.info(&output))
            .filter_map(|info| rect_from_info(&info))
            .collect();

        if monitors.is_empty() {
            anyhow::bail!("Wayland compositor reported no usable outputs");
        }

        log::debug!("Wayland outputs: {:?}", monitors);
        Ok(monitors)
    }
}

/// Logical geometry when xdg-output provided it, otherwise the raw
/// location with the current mode's size
fn rect_from_info(info: &OutputInfo) -> Option<MonitorRect> {
    let (x, y) = info.logical_position.unwrap_or(info.location);
    let (width, height) = info.logical_size.or_else(|| {
        info.modes
            .iter()
            .find(|mode| mode.current)
            .map(|mode| mode.dimensions)
    })?;

    if width <= 0 || height <= 0 {
        log::warn!("Ignoring output {:?} with size {}x{}", info.name, width, height);
        return None;
    }

    let name = info
        .name
        .clone()
        .unwrap_or_else(|| format!("output-{}", info.id));

    Some(MonitorRect::new(name, x, y, width as u32, height as u32))
}

struct OutputScan {
    registry_state: RegistryState,
    output_state: OutputState,
}

impl OutputHandler for OutputScan {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }
}

impl ProvidesRegistryState for OutputScan {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState];
}

delegate_output!(OutputScan);
delegate_registry!(OutputScan);

/// Build the monitor source selected in the config
pub fn from_config(config: &Config) -> Box<dyn MonitorSource> {
    match config.general.monitor_source.as_str() {
        "static" => Box::new(StaticMonitors::new(
            config.monitor.iter().map(|m| m.to_rect()).collect(),
        )),
        _ => Box::new(WaylandMonitors),
    }
}
