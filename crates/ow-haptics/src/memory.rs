use crate::{ActuatorInfo, DeviceError, DeviceInfo, DeviceLink, LinkEvent};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// One actuator command as received by a [`MemoryLink`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub device: u32,
    pub actuator: usize,
    pub intensity: f64,
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    devices: Vec<DeviceInfo>,
    commands: Vec<Command>,
    stops: Vec<u32>,
    failing: HashSet<u32>,
    events: Vec<LinkEvent>,
}

/// In-process device link that records everything sent to it.
///
/// Backs `--virtual-devices` and the tests.
#[derive(Debug)]
pub struct MemoryLink {
    state: Mutex<State>,
}

impl Default for MemoryLink {
    fn default() -> Self {
        Self::with_devices(Vec::new())
    }
}

impl MemoryLink {
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            state: Mutex::new(State {
                connected: true,
                devices,
                ..State::default()
            }),
        }
    }

    /// `count` simulated vibrators with one 20-step actuator each
    pub fn virtual_devices(count: u32) -> Self {
        Self::with_devices(
            (0..count)
                .map(|i| Self::device(i, &format!("Virtual Vibrator {}", i + 1), &[20]))
                .collect(),
        )
    }

    pub fn device(id: u32, name: &str, step_counts: &[u32]) -> DeviceInfo {
        DeviceInfo {
            id,
            name: name.to_string(),
            actuators: step_counts
                .iter()
                .map(|&step_count| ActuatorInfo { step_count })
                .collect(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_connected(&self, connected: bool) {
        let mut state = self.state();
        if state.connected != connected {
            state.connected = connected;
            state.events.push(if connected {
                LinkEvent::Connected
            } else {
                LinkEvent::Disconnected
            });
        }
    }

    pub fn add_device(&self, device: DeviceInfo) {
        let mut state = self.state();
        state.events.push(LinkEvent::DeviceAdded(device.clone()));
        state.devices.push(device);
    }

    pub fn remove_device(&self, id: u32) {
        let mut state = self.state();
        state.devices.retain(|d| d.id != id);
        state.events.push(LinkEvent::DeviceRemoved(id));
    }

    /// Make every command to `id` fail
    pub fn fail_device(&self, id: u32) {
        self.state().failing.insert(id);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state().commands.clone()
    }

    pub fn stops(&self) -> Vec<u32> {
        self.state().stops.clone()
    }

    /// Latest level sent to each actuator of `device`
    pub fn levels(&self, device: u32) -> Vec<f64> {
        let state = self.state();
        let Some(info) = state.devices.iter().find(|d| d.id == device) else {
            return Vec::new();
        };
        (0..info.actuators.len())
            .map(|a| {
                state
                    .commands
                    .iter()
                    .rev()
                    .find(|c| c.device == device && c.actuator == a)
                    .map_or(0.0, |c| c.intensity)
            })
            .collect()
    }
}

#[async_trait]
impl DeviceLink for MemoryLink {
    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let state = self.state();
        if !state.connected {
            return Err(DeviceError::Disconnected);
        }
        Ok(state.devices.clone())
    }

    async fn command_actuator(
        &self,
        device: u32,
        actuator: usize,
        intensity: f64,
    ) -> Result<(), DeviceError> {
        let mut state = self.state();
        if !state.connected {
            return Err(DeviceError::Disconnected);
        }
        if !state.devices.iter().any(|d| d.id == device) {
            return Err(DeviceError::UnknownDevice(device));
        }
        if state.failing.contains(&device) {
            return Err(DeviceError::Rejected {
                device,
                reason: "simulated failure".to_string(),
            });
        }
        state.commands.push(Command {
            device,
            actuator,
            intensity,
        });
        Ok(())
    }

    async fn stop_device(&self, device: u32) -> Result<(), DeviceError> {
        let mut state = self.state();
        if !state.connected {
            return Err(DeviceError::Disconnected);
        }
        state.stops.push(device);
        Ok(())
    }

    fn poll_events(&self) -> Vec<LinkEvent> {
        std::mem::take(&mut self.state().events)
    }
}
