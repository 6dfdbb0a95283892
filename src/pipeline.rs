use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use ow_capture::FrameSource;
use ow_data::HeroId;
use ow_haptics::device::active_devices;
use ow_haptics::{DeviceError, DeviceLink, IntensityManager, LinkEvent};
use ow_state::StateTracker;
use ow_vision::{Detector, Frame, RegionMatcher};

use crate::config::Config;
use crate::error::TickError;
use crate::triggers;

/// A detector that can be pointed at a new frame
pub trait FrameDetector: Detector + Send {
    fn load_frame(&mut self, frame: Frame);
    fn as_detector(&self) -> &dyn Detector;
}

impl FrameDetector for RegionMatcher {
    fn load_frame(&mut self, frame: Frame) {
        self.set_frame(frame);
    }

    fn as_detector(&self) -> &dyn Detector {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgramStatus {
    Ready,
    Running,
    Stopping,
    #[serde(rename = "CONFIG ERROR")]
    ConfigError,
    #[serde(rename = "LINK ERROR")]
    LinkError,
    #[serde(rename = "CRITICAL ERROR")]
    CriticalError,
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProgramStatus::Ready => "READY",
            ProgramStatus::Running => "RUNNING",
            ProgramStatus::Stopping => "STOPPING",
            ProgramStatus::ConfigError => "CONFIG ERROR",
            ProgramStatus::LinkError => "LINK ERROR",
            ProgramStatus::CriticalError => "CRITICAL ERROR",
        })
    }
}

/// Loop statistics for one run
#[derive(Debug, Default)]
struct RunStats {
    ticks: u64,
    started: Option<Instant>,
}

impl RunStats {
    fn report(&self) {
        let Some(started) = self.started else {
            return;
        };
        let secs = started.elapsed().as_secs_f64();
        if self.ticks == 0 || secs <= 0.0 {
            return;
        }
        info!(
            "Loops: {} | Loops per second: {:.2} | Avg. time: {:.2}ms",
            self.ticks,
            self.ticks as f64 / secs,
            1000.0 * secs / self.ticks as f64
        );
    }
}

/// Application context: owns the tracker, the intensity manager and the
/// collaborators, and runs one tick at a time.
pub struct Pipeline {
    config: Config,
    tracker: StateTracker,
    manager: IntensityManager,
    detector: Box<dyn FrameDetector>,
    source: Box<dyn FrameSource>,
    link: Arc<dyn DeviceLink>,
    estop: Arc<AtomicBool>,
    status: ProgramStatus,
    device_count: usize,
    last_refresh: Option<f64>,
    stats: RunStats,
}

impl Pipeline {
    pub fn new(
        config: Config,
        detector: Box<dyn FrameDetector>,
        source: Box<dyn FrameSource>,
        link: Arc<dyn DeviceLink>,
        estop: Arc<AtomicBool>,
    ) -> Self {
        let status = if link.is_connected() {
            ProgramStatus::Ready
        } else {
            ProgramStatus::LinkError
        };
        Self {
            tracker: StateTracker::new(config.debounce()),
            manager: IntensityManager::new(config.manager_settings()),
            config,
            detector,
            source,
            link,
            estop,
            status,
            device_count: 0,
            last_refresh: None,
            stats: RunStats::default(),
        }
    }

    pub fn status(&self) -> ProgramStatus {
        self.status
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn manager(&self) -> &IntensityManager {
        &self.manager
    }

    pub fn device_count(&self) -> usize {
        self.device_count
    }

    /// Delay between ticks at the alive refresh rate
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.max_refresh_rate)
    }

    /// Begin a run. Only allowed from `READY`.
    pub fn start(&mut self) -> Result<(), TickError> {
        match self.status {
            ProgramStatus::Ready => {}
            ProgramStatus::LinkError => return Err(TickError::Link(DeviceError::Disconnected)),
            other => {
                warn!("Cannot start while {}", other);
                return Ok(());
            }
        }

        self.source
            .start_capture(self.config.max_refresh_rate.ceil() as u32)
            .map_err(TickError::Detection)?;
        self.estop.store(false, Ordering::SeqCst);
        self.manager.start();
        self.last_refresh = None;
        self.stats = RunStats {
            ticks: 0,
            started: Some(Instant::now()),
        };
        self.status = ProgramStatus::Running;
        info!("Running...");
        Ok(())
    }

    /// End the run, stopping every device
    pub async fn stop(&mut self, now: f64) -> Result<(), TickError> {
        if self.status != ProgramStatus::Running {
            return Ok(());
        }
        self.status = ProgramStatus::Stopping;
        self.manager.stop();
        let result = self.manager.recompute_and_apply(now, self.link.as_ref()).await;
        self.end_run();
        result.map_err(TickError::from)
    }

    fn end_run(&mut self) {
        self.source.stop_capture();
        self.stats.report();
        self.stats = RunStats::default();
        if matches!(self.status, ProgramStatus::Running | ProgramStatus::Stopping) {
            self.status = ProgramStatus::Ready;
            info!("Stopped.");
        }
    }

    /// Manual hero selection; turns auto-detect off
    pub fn select_hero(&mut self, hero: HeroId) {
        self.tracker.set_hero_auto_detect(false);
        let current = self.tracker.hero().id();
        if current != hero {
            self.manager.clear_prefix(&current.trigger_prefix());
        }
        self.tracker.switch_hero(hero);
        info!("Hero switched to {}.", hero);
    }

    pub fn set_auto_detect(&mut self, enabled: bool) {
        self.tracker.set_hero_auto_detect(enabled);
    }

    /// Run one tick and sort out any failure. Returns the failure, if any,
    /// after acting on it.
    pub async fn tick(&mut self, now: f64) -> Option<TickError> {
        let result = self.try_tick(now).await;
        match result {
            Ok(()) => None,
            Err(e) => {
                self.handle_error(&e, now).await;
                Some(e)
            }
        }
    }

    async fn try_tick(&mut self, now: f64) -> Result<(), TickError> {
        // Let queued host events and link keep-alives run
        tokio::task::yield_now().await;

        self.handle_link_events();
        if !self.link.is_connected() {
            if self.status == ProgramStatus::LinkError {
                return Ok(());
            }
            return Err(TickError::Link(DeviceError::Disconnected));
        }
        if self.status == ProgramStatus::LinkError {
            info!("Device link is back");
            self.status = ProgramStatus::Ready;
        }

        self.device_count = active_devices(self.link.as_ref(), &self.config.excluded_device_names)
            .await?
            .len();

        if self.estop.swap(false, Ordering::SeqCst) && self.status == ProgramStatus::Running {
            info!("Emergency stop detected.");
            self.manager.emergency_stop();
            self.status = ProgramStatus::Stopping;
        }

        if self.status == ProgramStatus::Running {
            self.stats.ticks += 1;
            if self.due_for_refresh(now) {
                self.last_refresh = Some(now);
                self.perceive(now)?;
            }
        }

        self.manager
            .recompute_and_apply(now, self.link.as_ref())
            .await?;

        if self.status == ProgramStatus::Stopping {
            self.end_run();
        }
        Ok(())
    }

    /// Alive: every tick. Dead: at most `DEAD_REFRESH_RATE` times a second.
    fn due_for_refresh(&self, now: f64) -> bool {
        if !self.tracker.is_dead() {
            return true;
        }
        self.last_refresh
            .map_or(true, |t| now >= t + 1.0 / self.config.dead_refresh_rate)
    }

    fn perceive(&mut self, now: f64) -> Result<(), TickError> {
        let Some(image) = self.source.latest_frame().map_err(TickError::Detection)? else {
            return Ok(());
        };
        self.detector.load_frame(Frame::from_rgba(&image));
        let snapshot = self.tracker.refresh(self.detector.as_detector(), now)?;
        triggers::apply(&self.config, &snapshot, &mut self.manager, now);
        triggers::follow_detected_hero(&mut self.tracker, &mut self.manager);
        Ok(())
    }

    fn handle_link_events(&mut self) {
        for event in self.link.poll_events() {
            match event {
                LinkEvent::Connected => info!("Device link connected"),
                LinkEvent::Disconnected => warn!("Device link disconnected"),
                LinkEvent::DeviceAdded(d) => info!("Device added: {}", d.name),
                LinkEvent::DeviceRemoved(id) => info!("Device removed: {}", id),
            }
        }
    }

    async fn handle_error(&mut self, e: &TickError, now: f64) {
        if e.is_fatal() {
            error!("Critical error: {}", e);
            self.manager.emergency_stop();
            if let Err(stop_err) = self
                .manager
                .recompute_and_apply(now, self.link.as_ref())
                .await
            {
                error!("Failed to stop devices: {}", stop_err);
            }
            self.end_run();
            self.status = ProgramStatus::CriticalError;
        } else {
            warn!("Lost connection to the device link: {}", e);
            self.manager.stop();
            self.end_run();
            self.status = ProgramStatus::LinkError;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::default_config;
    use image::RgbaImage;
    use ow_capture::{Region, ReplaySource};
    use ow_haptics::MemoryLink;
    use ow_vision::VisionError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Detector answering from a shared table, so tests can change the
    /// "screen" while the pipeline owns the detector.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedDetector {
        counts: Arc<Mutex<HashMap<String, usize>>>,
        broken: Arc<AtomicBool>,
    }

    impl ScriptedDetector {
        pub(crate) fn set(&self, name: &str, count: usize) {
            self.counts.lock().unwrap().insert(name.to_string(), count);
        }

        fn get(&self, name: &str) -> Result<usize, VisionError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(VisionError::NoFrame);
            }
            Ok(self.counts.lock().unwrap().get(name).copied().unwrap_or(0))
        }
    }

    impl Detector for ScriptedDetector {
        fn detect_present(
            &self,
            name: &str,
            _threshold: f64,
            _region_override: Option<Region>,
        ) -> Result<bool, VisionError> {
            Ok(self.get(name)? > 0)
        }

        fn detect_count(&self, name: &str, _threshold: f64) -> Result<usize, VisionError> {
            self.get(name)
        }
    }

    impl FrameDetector for ScriptedDetector {
        fn load_frame(&mut self, _frame: Frame) {}

        fn as_detector(&self) -> &dyn Detector {
            self
        }
    }

    pub(crate) fn pipeline(
        detector: &ScriptedDetector,
        link: &Arc<MemoryLink>,
        estop: &Arc<AtomicBool>,
    ) -> Pipeline {
        let source = ReplaySource::from_frames(vec![Arc::new(RgbaImage::new(16, 9))]);
        Pipeline::new(
            default_config(),
            Box::new(detector.clone()),
            Box::new(source),
            link.clone(),
            estop.clone(),
        )
    }

    fn setup() -> (ScriptedDetector, Arc<MemoryLink>, Arc<AtomicBool>, Pipeline) {
        let detector = ScriptedDetector::default();
        let link = Arc::new(MemoryLink::virtual_devices(2));
        let estop = Arc::new(AtomicBool::new(false));
        let p = pipeline(&detector, &link, &estop);
        (detector, link, estop, p)
    }

    #[tokio::test]
    async fn test_elimination_reaches_devices() {
        let (detector, link, _estop, mut p) = setup();
        p.set_auto_detect(false);
        p.start().unwrap();
        detector.set("elimination", 1);
        assert!(p.tick(10.0).await.is_none());
        assert_eq!(p.manager().applied_intensity(), 0.1);
        assert_eq!(link.levels(0), vec![0.1]);
        assert_eq!(p.device_count(), 2);
    }

    #[tokio::test]
    async fn test_devices_joining_and_leaving_mid_run() {
        let (detector, link, _estop, mut p) = setup();
        p.set_auto_detect(false);
        p.start().unwrap();
        detector.set("being_beamed", 1);
        p.tick(0.0).await;
        assert_eq!(p.device_count(), 2);

        link.add_device(MemoryLink::device(7, "Late Vibrator", &[10]));
        p.tick(0.1).await;
        assert_eq!(p.device_count(), 3);
        // Output unchanged, so nothing is sent yet
        assert_eq!(link.levels(7), vec![0.0]);

        detector.set("elimination", 1);
        p.tick(0.2).await;
        assert_eq!(p.manager().applied_intensity(), 0.2);
        assert_eq!(link.levels(7), vec![0.2]);

        link.remove_device(0);
        p.tick(0.3).await;
        assert_eq!(p.device_count(), 2);
        assert!(link.levels(0).is_empty());
    }

    #[tokio::test]
    async fn test_nothing_happens_before_start() {
        let (detector, link, _estop, mut p) = setup();
        detector.set("elimination", 1);
        p.tick(0.0).await;
        assert_eq!(p.status(), ProgramStatus::Ready);
        assert!(link.commands().is_empty());
    }

    #[tokio::test]
    async fn test_emergency_stop_within_one_tick() {
        let (detector, link, estop, mut p) = setup();
        p.set_auto_detect(false);
        p.start().unwrap();
        detector.set("being_beamed", 1);
        detector.set("elimination", 2);
        p.tick(0.0).await;
        assert!(p.manager().applied_intensity() > 0.0);

        estop.store(true, Ordering::SeqCst);
        p.tick(0.1).await;
        assert_eq!(p.status(), ProgramStatus::Ready);
        assert_eq!(p.manager().applied_intensity(), 0.0);
        assert!(p.manager().active_triggers().is_empty());
        let mut stops = link.stops();
        stops.sort();
        assert_eq!(stops, vec![0, 1]);

        p.tick(0.2).await;
        assert_eq!(link.stops().len(), 2);
    }

    #[tokio::test]
    async fn test_detection_failure_is_fatal() {
        let (detector, link, _estop, mut p) = setup();
        p.start().unwrap();
        detector.set("being_orbed", 1);
        p.tick(0.0).await;

        detector.broken.store(true, Ordering::SeqCst);
        let err = p.tick(0.1).await.unwrap();
        assert!(err.is_fatal());
        assert_eq!(p.status(), ProgramStatus::CriticalError);
        assert_eq!(link.stops().len(), 2);

        assert!(p.start().is_ok());
        assert_eq!(p.status(), ProgramStatus::CriticalError);
    }

    #[tokio::test]
    async fn test_link_loss_and_recovery() {
        let (_detector, link, _estop, mut p) = setup();
        p.start().unwrap();
        p.tick(0.0).await;

        link.set_connected(false);
        let err = p.tick(0.1).await.unwrap();
        assert!(!err.is_fatal());
        assert_eq!(p.status(), ProgramStatus::LinkError);
        assert!(p.start().is_err());
        assert!(p.tick(0.2).await.is_none());

        link.set_connected(true);
        p.tick(0.3).await;
        assert_eq!(p.status(), ProgramStatus::Ready);
        assert!(p.start().is_ok());
    }

    #[tokio::test]
    async fn test_dead_refresh_rate_limits_detection() {
        let (detector, _link, _estop, mut p) = setup();
        p.set_auto_detect(false);
        p.start().unwrap();
        detector.set("killcam", 1);
        p.tick(0.0).await;
        assert!(p.tracker().is_dead());

        detector.set("killcam", 0);
        // DEAD_REFRESH_RATE is 1/s in the default config
        p.tick(0.5).await;
        assert!(p.tracker().is_dead());
        p.tick(1.0).await;
        assert!(!p.tracker().is_dead());
    }

    #[tokio::test]
    async fn test_manual_select_disables_auto_detect() {
        let (detector, _link, _estop, mut p) = setup();
        p.start().unwrap();
        detector.set("mercy_heal_beam", 1);
        p.select_hero(HeroId::Mercy);
        assert!(!p.tracker().hero_auto_detect());
        p.tick(0.0).await;
        assert!(p.manager().has_trigger(triggers::MERCY_HEAL_BEAM));

        p.select_hero(HeroId::Zenyatta);
        assert!(!p.manager().has_trigger(triggers::MERCY_HEAL_BEAM));
    }

    #[tokio::test]
    async fn test_auto_detect_switches_hero() {
        let (detector, _link, _estop, mut p) = setup();
        p.start().unwrap();
        detector.set("zenyatta_weapon", 1);
        p.tick(0.0).await;
        assert_eq!(p.tracker().hero().id(), HeroId::Zenyatta);
    }
}
