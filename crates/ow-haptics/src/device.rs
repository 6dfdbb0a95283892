use crate::DeviceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorInfo {
    /// Number of distinct non-zero levels the actuator supports
    pub step_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u32,
    pub name: String,
    pub actuators: Vec<ActuatorInfo>,
}

/// Connection lifecycle notifications from the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    DeviceAdded(DeviceInfo),
    DeviceRemoved(u32),
}

/// Connection to the haptic device server.
///
/// Devices come and go at any time, so callers re-list them every tick
/// instead of holding on to a device list.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    /// Set one actuator to `intensity` in [0, 1]
    async fn command_actuator(
        &self,
        device: u32,
        actuator: usize,
        intensity: f64,
    ) -> Result<(), DeviceError>;

    async fn stop_device(&self, device: u32) -> Result<(), DeviceError>;

    /// Drain lifecycle notifications received since the last call
    fn poll_events(&self) -> Vec<LinkEvent>;
}

/// Level to send to an actuator with `step_count` levels for `target`.
///
/// The target is rounded to the nearest step. The actuator's ceiling is the
/// global `max` rounded to a step and then lowered one step at a time until
/// it no longer exceeds `max`.
pub fn actuator_level(target: f64, step_count: u32, max: f64) -> f64 {
    let steps = step_count.max(1) as f64;
    let mut ceiling = (max * steps).round();
    while ceiling > 0.0 && ceiling / steps > max {
        ceiling -= 1.0;
    }
    let level = (target * steps).round().clamp(0.0, ceiling.max(0.0));
    level / steps
}

/// Devices not excluded by name
pub async fn active_devices(
    link: &dyn DeviceLink,
    excluded: &[String],
) -> Result<Vec<DeviceInfo>, DeviceError> {
    let mut devices = link.list_devices().await?;
    devices.retain(|d| !excluded.iter().any(|name| name == &d.name));
    Ok(devices)
}

/// Send `intensity` to every actuator of every active device.
///
/// A device whose command fails is stopped and skipped for the rest of the
/// tick; the others still get their commands. Returns the number of devices
/// that took every command.
pub async fn distribute(
    link: &dyn DeviceLink,
    excluded: &[String],
    intensity: f64,
    max: f64,
) -> Result<usize, DeviceError> {
    let devices = active_devices(link, excluded).await?;
    let mut ok = 0;
    for device in &devices {
        let mut levels = Vec::with_capacity(device.actuators.len());
        let mut failed = None;
        for (index, actuator) in device.actuators.iter().enumerate() {
            let level = actuator_level(intensity, actuator.step_count, max);
            if let Err(e) = link.command_actuator(device.id, index, level).await {
                failed = Some(e);
                break;
            }
            levels.push(level);
        }

        match failed {
            None => {
                debug!("[{}] actuators: {:?}", device.name, levels);
                ok += 1;
            }
            Some(e) => {
                warn!("Stopping {} after a command error: {}", device.name, e);
                if let Err(e) = link.stop_device(device.id).await {
                    warn!("Failed to stop {}: {}", device.name, e);
                }
            }
        }
    }
    Ok(ok)
}

/// Stop every active device. Individual failures are logged and skipped.
pub async fn stop_all(link: &dyn DeviceLink, excluded: &[String]) -> Result<usize, DeviceError> {
    let devices = active_devices(link, excluded).await?;
    for device in &devices {
        if let Err(e) = link.stop_device(device.id).await {
            warn!("Failed to stop {}: {}", device.name, e);
        }
    }
    Ok(devices.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLink;

    #[test]
    fn test_level_rounds_to_nearest_step() {
        assert_eq!(actuator_level(0.33, 10, 1.0), 0.3);
        assert_eq!(actuator_level(0.36, 10, 1.0), 0.4);
        assert_eq!(actuator_level(0.5, 1, 1.0), 1.0);
    }

    #[test]
    fn test_level_ceiling_stays_under_max() {
        // No 0.35 step exists, so the ceiling drops to 0.3
        assert_eq!(actuator_level(0.9, 10, 0.35), 0.3);
        assert_eq!(actuator_level(0.9, 10, 0.3), 0.3);
        assert_eq!(actuator_level(1.0, 4, 0.6), 0.5);
    }

    #[test]
    fn test_level_never_exceeds_max() {
        for steps in [1, 2, 3, 7, 10, 20, 100] {
            for max in [0.0, 0.05, 0.25, 0.33, 0.5, 0.71, 1.0] {
                for target in [0.0, 0.1, 0.26, 0.5, 0.74, 1.0, 2.0] {
                    let level = actuator_level(target, steps, max);
                    assert!(level <= max, "{} steps, max {}, target {}", steps, max, target);
                    assert!(level >= 0.0);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_distribute_skips_excluded() {
        let link = MemoryLink::with_devices(vec![
            MemoryLink::device(1, "Kept", &[20]),
            MemoryLink::device(2, "Skipped", &[20]),
        ]);
        let sent = distribute(&link, &["Skipped".to_string()], 0.5, 1.0)
            .await
            .unwrap();
        assert_eq!(sent, 1);
        assert!(link.commands().iter().all(|c| c.device == 1));
    }

    #[tokio::test]
    async fn test_failing_device_is_isolated() {
        let link = MemoryLink::with_devices(vec![
            MemoryLink::device(1, "Broken", &[10, 10]),
            MemoryLink::device(2, "Fine", &[10, 10]),
        ]);
        link.fail_device(1);
        let sent = distribute(&link, &[], 0.4, 1.0).await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(link.stops(), vec![1]);
        let fine: Vec<_> = link.commands().into_iter().filter(|c| c.device == 2).collect();
        assert_eq!(fine.len(), 2);
        assert!(fine.iter().all(|c| c.intensity == 0.4));
    }

    #[tokio::test]
    async fn test_disconnected_link_errors() {
        let link = MemoryLink::with_devices(vec![MemoryLink::device(1, "A", &[10])]);
        link.set_connected(false);
        assert!(matches!(
            distribute(&link, &[], 0.2, 1.0).await,
            Err(DeviceError::Disconnected)
        ));
    }
}
