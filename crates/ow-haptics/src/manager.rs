use crate::device::{distribute, stop_all};
use crate::{DeviceError, DeviceLink, Lifetime, Pattern, Vibe};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Intensities are compared and sent at this many decimal places
pub const INTENSITY_DECIMALS: i32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    /// Ceiling for anything sent to devices, in [0, 1]
    pub max_intensity: f64,
    /// Multiply the summed intensity by `max_intensity` before clamping
    pub scale_by_max: bool,
    /// Device names that are never commanded
    pub excluded_devices: Vec<String>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_intensity: 1.0,
            scale_by_max: false,
            excluded_devices: Vec::new(),
        }
    }
}

/// Owns every active vibe, keyed by trigger, and turns their sum into device
/// commands once per tick.
///
/// Starts stopped; nothing can be added until [`IntensityManager::start`].
#[derive(Debug)]
pub struct IntensityManager {
    settings: ManagerSettings,
    vibes: BTreeMap<String, Vec<Vibe>>,
    stopped: bool,
    stop_pending: bool,
    current_intensity: f64,
    applied_intensity: f64,
}

impl IntensityManager {
    pub fn new(settings: ManagerSettings) -> Self {
        Self {
            settings,
            vibes: BTreeMap::new(),
            stopped: true,
            stop_pending: false,
            current_intensity: 0.0,
            applied_intensity: 0.0,
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Summed intensity as of the last recompute
    pub fn current_intensity(&self) -> f64 {
        self.current_intensity
    }

    /// Clamped intensity last sent to devices
    pub fn applied_intensity(&self) -> f64 {
        self.applied_intensity
    }

    pub fn start(&mut self) {
        self.stopped = false;
        self.stop_pending = false;
    }

    /// Clear every vibe and stop all devices on the next recompute.
    /// Repeated calls before that recompute still send one stop.
    pub fn stop(&mut self) {
        self.vibes.clear();
        if !self.stopped {
            self.stopped = true;
            self.stop_pending = true;
        }
    }

    pub fn emergency_stop(&mut self) {
        warn!("Emergency stop");
        self.stop();
    }

    /// Add a vibe under `trigger`. Ignored while stopped.
    pub fn add(&mut self, trigger: &str, pattern: Pattern, lifetime: Lifetime, now: f64) {
        if self.stopped {
            return;
        }
        self.vibes
            .entry(trigger.to_string())
            .or_default()
            .push(Vibe::new(pattern, lifetime, now));
    }

    pub fn add_permanent(&mut self, trigger: &str, intensity: f64, now: f64) {
        self.add(trigger, Pattern::constant(intensity), Lifetime::Permanent, now);
    }

    pub fn add_timed(&mut self, trigger: &str, intensity: f64, duration: f64, now: f64) {
        self.add(
            trigger,
            Pattern::constant(intensity),
            Lifetime::Timed(duration),
            now,
        );
    }

    pub fn remove_oldest(&mut self, trigger: &str) {
        self.remove_at(trigger, |_| 0);
    }

    pub fn remove_newest(&mut self, trigger: &str) {
        self.remove_at(trigger, |len| len - 1);
    }

    fn remove_at(&mut self, trigger: &str, index: impl FnOnce(usize) -> usize) {
        if let Some(vibes) = self.vibes.get_mut(trigger) {
            if !vibes.is_empty() {
                vibes.remove(index(vibes.len()));
            }
            if vibes.is_empty() {
                self.vibes.remove(trigger);
            }
        }
    }

    /// Make exactly one vibe exist under `trigger` iff `condition` holds
    pub fn toggle_to_condition(
        &mut self,
        trigger: &str,
        pattern: &Pattern,
        condition: bool,
        now: f64,
    ) {
        let exists = self.has_trigger(trigger);
        if condition && !exists {
            self.add(trigger, pattern.clone(), Lifetime::Permanent, now);
        } else if !condition && exists {
            self.remove_oldest(trigger);
        }
    }

    pub fn clear_all(&mut self) {
        self.vibes.clear();
    }

    /// Remove every trigger starting with `prefix`
    pub fn clear_prefix(&mut self, prefix: &str) {
        self.vibes.retain(|trigger, _| !trigger.starts_with(prefix));
    }

    pub fn has_trigger(&self, trigger: &str) -> bool {
        self.vibes.get(trigger).is_some_and(|v| !v.is_empty())
    }

    pub fn count(&self, trigger: &str) -> usize {
        self.vibes.get(trigger).map_or(0, Vec::len)
    }

    /// Whether a vibe under `trigger` was created less than `seconds` ago
    pub fn created_within(&self, trigger: &str, seconds: f64, now: f64) -> bool {
        self.vibes
            .get(trigger)
            .is_some_and(|v| v.iter().any(|vibe| vibe.created_at() > now - seconds))
    }

    /// Active triggers, with a multiplier when more than one vibe shares one
    pub fn active_triggers(&self) -> Vec<String> {
        self.vibes
            .iter()
            .map(|(trigger, vibes)| match vibes.len() {
                1 => trigger.clone(),
                n => format!("{} (x{})", trigger, n),
            })
            .collect()
    }

    /// Sum every live vibe at `now`, dropping expired ones
    fn sum_at(&mut self, now: f64) -> f64 {
        let mut total = 0.0;
        for vibes in self.vibes.values_mut() {
            vibes.retain_mut(|vibe| match vibe.intensity_at(now) {
                Some(intensity) => {
                    total += intensity;
                    true
                }
                None => false,
            });
        }
        self.vibes.retain(|_, vibes| !vibes.is_empty());
        total
    }

    /// Recompute the output at `now` and push it to devices when it changed.
    ///
    /// While stopped, the first call after a stop sends one stop to every
    /// device and later calls do nothing. Link-level failures are returned;
    /// per-device failures are isolated inside the device pass.
    pub async fn recompute_and_apply(
        &mut self,
        now: f64,
        link: &dyn DeviceLink,
    ) -> Result<(), DeviceError> {
        if self.stopped {
            self.current_intensity = 0.0;
            self.applied_intensity = 0.0;
            if self.stop_pending {
                let count = stop_all(link, &self.settings.excluded_devices).await?;
                self.stop_pending = false;
                info!("Stopped {} device(s)", count);
            }
            return Ok(());
        }

        let mut latest = self.sum_at(now);
        if self.settings.scale_by_max {
            latest *= self.settings.max_intensity;
        }
        let latest = round_to(latest, INTENSITY_DECIMALS).abs();
        if latest == self.current_intensity {
            return Ok(());
        }
        self.current_intensity = latest;

        let clamped = latest.clamp(0.0, self.settings.max_intensity);
        if clamped == latest {
            info!("Updated intensity: {}", latest);
        } else {
            info!("Updated intensity: {} ({})", latest, clamped);
        }

        if clamped != self.applied_intensity {
            self.applied_intensity = clamped;
            debug!("  {}", self.active_triggers().join(", "));
            distribute(
                link,
                &self.settings.excluded_devices,
                clamped,
                self.settings.max_intensity,
            )
            .await?;
        }
        Ok(())
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLink;

    fn running(settings: ManagerSettings) -> IntensityManager {
        let mut m = IntensityManager::new(settings);
        m.start();
        m
    }

    fn link() -> MemoryLink {
        MemoryLink::with_devices(vec![
            MemoryLink::device(1, "A", &[20]),
            MemoryLink::device(2, "B", &[10, 10]),
        ])
    }

    #[test]
    fn test_add_ignored_while_stopped() {
        let mut m = IntensityManager::new(ManagerSettings::default());
        m.add_permanent("being beamed", 0.3, 0.0);
        assert!(!m.has_trigger("being beamed"));
    }

    #[test]
    fn test_toggle_idempotent() {
        let mut m = running(ManagerSettings::default());
        let p = Pattern::constant(0.2);
        m.toggle_to_condition("being orbed", &p, true, 0.0);
        m.toggle_to_condition("being orbed", &p, true, 0.1);
        assert_eq!(m.count("being orbed"), 1);
        m.toggle_to_condition("being orbed", &p, false, 0.2);
        m.toggle_to_condition("being orbed", &p, false, 0.3);
        assert_eq!(m.count("being orbed"), 0);
        assert!(m.active_triggers().is_empty());
    }

    #[test]
    fn test_remove_oldest_and_newest() {
        let mut m = running(ManagerSettings::default());
        m.add_timed("elimination", 0.1, 3.0, 0.0);
        m.add_timed("elimination", 0.2, 3.0, 1.0);
        m.add_timed("elimination", 0.3, 3.0, 2.0);
        m.remove_oldest("elimination");
        assert_eq!(m.count("elimination"), 2);
        m.remove_newest("elimination");
        assert_eq!(m.count("elimination"), 1);
        // Only the vibe created at 1.0 is left
        assert!(m.created_within("elimination", 0.5, 1.4));
        assert!(!m.created_within("elimination", 0.5, 2.4));
        m.remove_newest("elimination");
        assert!(!m.has_trigger("elimination"));
        m.remove_newest("elimination");
    }

    #[test]
    fn test_created_within() {
        let mut m = running(ManagerSettings::default());
        m.add_timed("mercy resurrect", 0.5, 2.0, 10.0);
        assert!(m.created_within("mercy resurrect", 3.0, 12.9));
        assert!(!m.created_within("mercy resurrect", 3.0, 13.0));
        assert!(!m.created_within("other", 3.0, 10.0));
    }

    #[test]
    fn test_clear_prefix_only_touches_hero() {
        let mut m = running(ManagerSettings::default());
        m.add_permanent("mercy heal beam", 0.2, 0.0);
        m.add_permanent("mercy damage beam", 0.2, 0.0);
        m.add_permanent("being beamed", 0.1, 0.0);
        m.clear_prefix("mercy ");
        assert_eq!(m.active_triggers(), vec!["being beamed".to_string()]);
    }

    #[tokio::test]
    async fn test_elimination_vibe_expires() {
        let link = link();
        let mut m = running(ManagerSettings::default());
        m.add_timed("elimination", 0.1, 3.0, 10.0);

        m.recompute_and_apply(12.0, &link).await.unwrap();
        assert_eq!(m.current_intensity(), 0.1);
        assert_eq!(m.count("elimination"), 1);

        m.recompute_and_apply(13.01, &link).await.unwrap();
        assert_eq!(m.current_intensity(), 0.0);
        assert!(!m.has_trigger("elimination"));
        assert_eq!(link.levels(1), vec![0.0]);
    }

    #[tokio::test]
    async fn test_sum_is_clamped_to_max() {
        let link = link();
        let mut m = running(ManagerSettings {
            max_intensity: 0.5,
            ..ManagerSettings::default()
        });
        m.add_permanent("being beamed", 0.4, 0.0);
        m.add_permanent("mercy heal beam", 0.4, 0.0);
        m.recompute_and_apply(0.1, &link).await.unwrap();
        assert_eq!(m.current_intensity(), 0.8);
        assert_eq!(m.applied_intensity(), 0.5);
        assert_eq!(link.levels(1), vec![0.5]);
        assert_eq!(link.levels(2), vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_negative_sum_uses_magnitude() {
        let link = link();
        let mut m = running(ManagerSettings::default());
        m.add_permanent("hacked", -0.25, 0.0);
        m.recompute_and_apply(0.1, &link).await.unwrap();
        assert_eq!(m.current_intensity(), 0.25);
    }

    #[tokio::test]
    async fn test_scale_by_max() {
        let link = link();
        let mut m = running(ManagerSettings {
            max_intensity: 0.5,
            scale_by_max: true,
            ..ManagerSettings::default()
        });
        m.add_permanent("being orbed", 0.6, 0.0);
        m.recompute_and_apply(0.1, &link).await.unwrap();
        assert_eq!(m.applied_intensity(), 0.3);
    }

    #[tokio::test]
    async fn test_unchanged_intensity_skips_devices() {
        let link = link();
        let mut m = running(ManagerSettings::default());
        m.add_permanent("being beamed", 0.3, 0.0);
        m.recompute_and_apply(0.1, &link).await.unwrap();
        let sent = link.commands().len();
        m.recompute_and_apply(0.2, &link).await.unwrap();
        assert_eq!(link.commands().len(), sent);
    }

    #[tokio::test]
    async fn test_emergency_stop_sends_one_stop_per_device() {
        let link = link();
        let mut m = running(ManagerSettings::default());
        m.add_permanent("being beamed", 0.2, 0.0);
        m.add_timed("elimination", 0.1, 3.0, 0.0);
        m.add_timed("elimination", 0.1, 3.0, 0.5);
        m.recompute_and_apply(1.0, &link).await.unwrap();

        m.emergency_stop();
        m.emergency_stop();
        m.recompute_and_apply(1.1, &link).await.unwrap();
        m.recompute_and_apply(1.2, &link).await.unwrap();

        assert!(m.active_triggers().is_empty());
        assert_eq!(m.applied_intensity(), 0.0);
        assert_eq!(m.current_intensity(), 0.0);
        let mut stops = link.stops();
        stops.sort();
        assert_eq!(stops, vec![1, 2]);

        m.add_permanent("being beamed", 0.2, 1.3);
        assert!(!m.has_trigger("being beamed"));
    }

    #[tokio::test]
    async fn test_stop_retried_after_link_returns() {
        let link = link();
        let mut m = running(ManagerSettings::default());
        link.set_connected(false);
        m.stop();
        assert!(m.recompute_and_apply(0.0, &link).await.is_err());
        link.set_connected(true);
        m.recompute_and_apply(0.1, &link).await.unwrap();
        assert_eq!(link.stops().len(), 2);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.1 + 0.2, 4), 0.3);
        assert_eq!(round_to(0.123456, 4), 0.1235);
    }
}
