use crate::hero::detect_hero;
use ow_data::{scan_order, HeroId};
use ow_vision::{Detector, VisionError};
use tracing::{debug, info};

/// Minimum spacing between two detection attempts
pub const ATTEMPT_INTERVAL: f64 = 1.0;
/// Spacing between full re-scans while no hero is hypothesized
pub const IDLE_SCAN_INTERVAL: f64 = 2.0;
/// Without a confirmation for this long, re-scan the whole roster
pub const RESCAN_AFTER: f64 = 4.0;
/// Without a confirmation for this long, fall back to `Other`
pub const GIVE_UP_AFTER: f64 = 6.0;

/// Infers the played hero from weapon icons on a cost-aware schedule.
///
/// While a hero is hypothesized only its own weapons are checked, once per
/// second. The full roster is matched only when that check has been failing
/// for a while, or every couple of seconds while nothing is hypothesized.
#[derive(Debug, Clone)]
pub struct HeroAutoDetector {
    detected: HeroId,
    last_success: Option<f64>,
    last_attempt: Option<f64>,
}

impl Default for HeroAutoDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl HeroAutoDetector {
    pub fn new() -> Self {
        Self {
            detected: HeroId::Other,
            last_success: None,
            last_attempt: None,
        }
    }

    pub fn detected(&self) -> HeroId {
        self.detected
    }

    /// Start from a known hero, e.g. after a manual selection
    pub fn assume(&mut self, hero: HeroId, now: f64) {
        self.detected = hero;
        self.last_success = Some(now);
    }

    /// Run one step of the schedule and return the current hypothesis
    pub fn update(&mut self, detector: &dyn Detector, now: f64) -> Result<HeroId, VisionError> {
        if self.last_attempt.is_some_and(|t| now - t < ATTEMPT_INTERVAL) {
            return Ok(self.detected);
        }

        if self.detected == HeroId::Other {
            if self.last_attempt.is_some_and(|t| now - t < IDLE_SCAN_INTERVAL) {
                return Ok(self.detected);
            }
            self.last_attempt = Some(now);
            if let Some(hero) = full_scan(HeroId::Other, detector)? {
                info!("Auto-detected hero: {}", hero);
                self.assume(hero, now);
            }
            return Ok(self.detected);
        }

        self.last_attempt = Some(now);
        if detect_hero(self.detected, detector)? {
            self.last_success = Some(now);
            return Ok(self.detected);
        }

        let since = self.last_success.map_or(f64::INFINITY, |t| now - t);
        if since >= RESCAN_AFTER {
            debug!("{} unconfirmed for {:.1}s, re-scanning", self.detected, since);
            if let Some(hero) = full_scan(self.detected, detector)? {
                info!("Auto-detected hero: {} (was {})", hero, self.detected);
                self.assume(hero, now);
                return Ok(self.detected);
            }
        }
        if since >= GIVE_UP_AFTER {
            info!("Lost track of {}, falling back to Other", self.detected);
            self.detected = HeroId::Other;
        }
        Ok(self.detected)
    }
}

fn full_scan(current: HeroId, detector: &dyn Detector) -> Result<Option<HeroId>, VisionError> {
    for hero in scan_order(current) {
        if detect_hero(hero, detector)? {
            return Ok(Some(hero));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDetector;

    #[test]
    fn test_finds_hero_from_other() {
        let det = FakeDetector::new();
        det.set("zenyatta_weapon", true);
        let mut auto = HeroAutoDetector::new();
        assert_eq!(auto.update(&det, 0.0).unwrap(), HeroId::Zenyatta);
    }

    #[test]
    fn test_attempts_at_most_once_per_second() {
        let det = FakeDetector::new();
        det.set("mercy_staff", true);
        let mut auto = HeroAutoDetector::new();
        auto.update(&det, 0.0).unwrap();
        let calls = det.calls("mercy_staff");
        auto.update(&det, 0.5).unwrap();
        assert_eq!(det.calls("mercy_staff"), calls);
        auto.update(&det, 1.0).unwrap();
        assert_eq!(det.calls("mercy_staff"), calls + 1);
    }

    #[test]
    fn test_idle_scans_every_two_seconds() {
        let det = FakeDetector::new();
        let mut auto = HeroAutoDetector::new();
        auto.update(&det, 0.0).unwrap();
        assert_eq!(det.calls("lucio_weapon"), 1);
        auto.update(&det, 1.5).unwrap();
        assert_eq!(det.calls("lucio_weapon"), 1);
        auto.update(&det, 2.0).unwrap();
        assert_eq!(det.calls("lucio_weapon"), 2);
    }

    #[test]
    fn test_confirms_only_current_hero() {
        let det = FakeDetector::new();
        det.set("lucio_weapon", true);
        let mut auto = HeroAutoDetector::new();
        auto.update(&det, 0.0).unwrap();
        let zen_calls = det.calls("zenyatta_weapon");
        auto.update(&det, 1.0).unwrap();
        auto.update(&det, 2.0).unwrap();
        assert_eq!(det.calls("zenyatta_weapon"), zen_calls);
    }

    #[test]
    fn test_rescans_after_four_seconds() {
        let det = FakeDetector::new();
        det.set("lucio_weapon", true);
        let mut auto = HeroAutoDetector::new();
        auto.update(&det, 0.0).unwrap();

        det.set("lucio_weapon", false);
        det.set("kiriko_weapon", true);
        for t in [1.0, 2.0, 3.0] {
            assert_eq!(auto.update(&det, t).unwrap(), HeroId::Lucio);
        }
        assert_eq!(auto.update(&det, 4.0).unwrap(), HeroId::Kiriko);
    }

    #[test]
    fn test_falls_back_to_other_after_six_seconds() {
        let det = FakeDetector::new();
        det.set("juno_weapon", true);
        let mut auto = HeroAutoDetector::new();
        auto.update(&det, 0.0).unwrap();

        det.set("juno_weapon", false);
        for t in [1.0, 2.0, 3.0, 4.0, 5.0] {
            assert_eq!(auto.update(&det, t).unwrap(), HeroId::Juno);
        }
        assert_eq!(auto.update(&det, 6.0).unwrap(), HeroId::Other);
    }

    #[test]
    fn test_detection_error_propagates() {
        let det = FakeDetector::new();
        det.fail("baptiste_weapon");
        let mut auto = HeroAutoDetector::new();
        assert!(auto.update(&det, 0.0).is_err());
    }
}
