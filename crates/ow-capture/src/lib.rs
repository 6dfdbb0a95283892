pub mod replay;

use anyhow::{bail, Context, Result};
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use xcap::Monitor;

pub use replay::ReplaySource;

/// Width of the resolution every region is authored against
pub const BASE_WIDTH: u32 = 1920;
/// Height of the resolution every region is authored against
pub const BASE_HEIGHT: u32 = 1080;

/// Pixel rectangle in the 1920x1080 reference resolution.
/// `bottom` and `right` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Region {
    pub const fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// A named region of the HUD, matched against the template of the same name
#[derive(Debug, Clone, Copy)]
pub struct RegionSpec {
    pub name: &'static str,
    pub region: Region,
    /// Template ships with an `m_<name>.png` mask
    pub masked: bool,
}

/// Well-known HUD regions at 1920x1080
pub mod regions {
    use super::{Region, RegionSpec};

    /// Weapon slot in the bottom-right corner, shared by every hero's weapon icon
    pub const WEAPON_SLOT: Region = Region::new(940, 1040, 1640, 1860);

    /// Mercy's pistol is drawn higher and further left while Valkyrie is active
    pub const MERCY_PISTOL_ULT: Region = Region::new(925, 1025, 1600, 1820);

    const fn spec(name: &'static str, region: Region, masked: bool) -> RegionSpec {
        RegionSpec {
            name,
            region,
            masked,
        }
    }

    pub const ALL: &[RegionSpec] = &[
        // Kill feed notifications (stacked icons, counted)
        spec("elimination", Region::new(749, 850, 832, 976), false),
        spec("assist", Region::new(749, 850, 832, 976), false),
        spec("saved", Region::new(749, 850, 727, 922), false),
        // Liveness overlays
        spec("killcam", Region::new(89, 107, 41, 69), false),
        spec("death_spec", Region::new(66, 86, 1416, 1574), false),
        // Buffs and debuffs on the player
        spec("being_beamed", Region::new(762, 807, 460, 508), false),
        spec("being_orbed", Region::new(762, 807, 460, 508), false),
        spec("hacked", Region::new(860, 912, 905, 1015), false),
        // Weapons
        spec("baptiste_weapon", WEAPON_SLOT, false),
        spec("brigitte_weapon", WEAPON_SLOT, false),
        spec("juno_weapon", WEAPON_SLOT, false),
        spec("kiriko_weapon", WEAPON_SLOT, false),
        spec("lucio_weapon", WEAPON_SLOT, false),
        spec("mercy_staff", WEAPON_SLOT, false),
        spec("mercy_pistol", WEAPON_SLOT, false),
        spec("zenyatta_weapon", WEAPON_SLOT, false),
        // Abilities
        spec("juno_glide_boost", Region::new(925, 1000, 1480, 1560), true),
        spec("juno_pulsar_torpedoes", Region::new(925, 1000, 1580, 1655), true),
        spec("juno_pulsar_torpedoes_firing", Region::new(500, 580, 920, 1000), true),
        spec("lucio_healing_song", Region::new(955, 1035, 620, 700), true),
        spec("lucio_speed_song", Region::new(955, 1035, 620, 700), true),
        spec("mercy_heal_beam", Region::new(650, 730, 790, 860), true),
        spec("mercy_damage_beam", Region::new(658, 719, 1065, 1126), true),
        spec("mercy_resurrect_cd", Region::new(920, 1000, 1580, 1655), false),
        spec("zenyatta_harmony", Region::new(640, 700, 890, 950), true),
        spec("zenyatta_discord", Region::new(640, 700, 970, 1030), true),
    ];

    /// Look up a region by its template name
    pub fn lookup(name: &str) -> Option<&'static RegionSpec> {
        ALL.iter().find(|spec| spec.name == name)
    }
}

/// Crop a region from a luma frame, clamped to the frame bounds
pub fn crop_region(frame: &GrayImage, region: &Region) -> GrayImage {
    let (w, h) = (frame.width(), frame.height());

    let x = region.left.min(w.saturating_sub(1));
    let y = region.top.min(h.saturating_sub(1));
    let rw = region.width().min(w - x);
    let rh = region.height().min(h - y);

    image::imageops::crop_imm(frame, x, y, rw, rh).to_image()
}

/// Status of the capture backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureStatus {
    pub is_capturing: bool,
    pub fps: f64,
    pub last_capture_time: Option<u64>,
    pub resolution: Option<(u32, u32)>,
    /// Set once the backend gave up; the session cannot continue
    pub error: Option<String>,
}

/// Source of screenshots for the tracker.
///
/// `latest_frame` never waits for a fresh frame: it hands back whatever was
/// captured most recently, so consecutive calls may return the same frame.
pub trait FrameSource: Send {
    fn start_capture(&mut self, target_fps: u32) -> Result<()>;
    fn stop_capture(&mut self);
    fn latest_frame(&mut self) -> Result<Option<Arc<RgbaImage>>>;
    fn status(&self) -> CaptureStatus;
}

/// Consecutive failed grabs tolerated before the capture loop gives up
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Screen capture of the primary monitor, driven by a background task
pub struct ScreenCapture {
    stop: Arc<AtomicBool>,
    frame_rx: Option<watch::Receiver<Option<Arc<RgbaImage>>>>,
    status_rx: Option<watch::Receiver<CaptureStatus>>,
}

impl ScreenCapture {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            frame_rx: None,
            status_rx: None,
        }
    }
}

impl Default for ScreenCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ScreenCapture {
    fn start_capture(&mut self, target_fps: u32) -> Result<()> {
        if self.frame_rx.is_some() {
            return Ok(());
        }

        let (frame_tx, frame_rx) = watch::channel::<Option<Arc<RgbaImage>>>(None);
        let (status_tx, status_rx) = watch::channel(CaptureStatus::default());

        self.stop = Arc::new(AtomicBool::new(false));
        let interval = Duration::from_secs_f64(1.0 / target_fps.max(1) as f64);
        tokio::spawn(capture_loop(frame_tx, status_tx, interval, self.stop.clone()));

        self.frame_rx = Some(frame_rx);
        self.status_rx = Some(status_rx);
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.frame_rx = None;
        self.status_rx = None;
    }

    fn latest_frame(&mut self) -> Result<Option<Arc<RgbaImage>>> {
        if let Some(status_rx) = &self.status_rx {
            if let Some(err) = &status_rx.borrow().error {
                bail!("screen capture failed: {}", err);
            }
        }
        Ok(self.frame_rx.as_ref().and_then(|rx| rx.borrow().clone()))
    }

    fn status(&self) -> CaptureStatus {
        self.status_rx
            .as_ref()
            .map(|rx| rx.borrow().clone())
            .unwrap_or_default()
    }
}

/// Find the monitor the game is expected to run on
fn find_primary_monitor() -> Result<Monitor> {
    let monitors = Monitor::all().context("Failed to enumerate monitors")?;
    let mut fallback = None;
    for monitor in monitors {
        if monitor.is_primary().unwrap_or(false) {
            return Ok(monitor);
        }
        if fallback.is_none() {
            fallback = Some(monitor);
        }
    }
    fallback.context("No monitor available for capture")
}

/// Capture a frame from the given monitor
fn capture_frame(monitor: &Monitor) -> Result<RgbaImage> {
    monitor
        .capture_image()
        .context("Failed to capture monitor image")
}

/// The capture loop that runs as a background task.
/// Publishes frames through the watch channel and status updates through the status channel.
pub async fn capture_loop(
    frame_tx: watch::Sender<Option<Arc<RgbaImage>>>,
    status_tx: watch::Sender<CaptureStatus>,
    capture_interval: Duration,
    stop: Arc<AtomicBool>,
) {
    info!("Capture loop started, interval: {:?}", capture_interval);

    let mut frame_count = 0u64;
    let mut fps_timer = Instant::now();
    let mut failures = 0u32;

    while !stop.load(Ordering::Relaxed) {
        let tick_start = Instant::now();

        // xcap is sync
        let capture_result =
            tokio::task::spawn_blocking(|| find_primary_monitor().and_then(|m| capture_frame(&m)))
                .await;

        match capture_result {
            Ok(Ok(frame)) => {
                failures = 0;
                let resolution = (frame.width(), frame.height());
                frame_count += 1;

                let elapsed = fps_timer.elapsed().as_secs_f64();
                let fps = if elapsed > 0.0 {
                    frame_count as f64 / elapsed
                } else {
                    0.0
                };
                if elapsed > 5.0 {
                    frame_count = 0;
                    fps_timer = Instant::now();
                }

                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;

                let _ = status_tx.send(CaptureStatus {
                    is_capturing: true,
                    fps,
                    last_capture_time: Some(now),
                    resolution: Some(resolution),
                    error: None,
                });
                let _ = frame_tx.send(Some(Arc::new(frame)));
            }
            Ok(Err(e)) => {
                failures += 1;
                warn!("Capture failed ({}/{}): {}", failures, MAX_CONSECUTIVE_FAILURES, e);
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    let _ = status_tx.send(CaptureStatus {
                        error: Some(format!("{:#}", e)),
                        ..CaptureStatus::default()
                    });
                    break;
                }
            }
            Err(e) => {
                warn!("Capture task panicked: {}", e);
                let _ = status_tx.send(CaptureStatus {
                    error: Some(e.to_string()),
                    ..CaptureStatus::default()
                });
                break;
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < capture_interval {
            tokio::time::sleep(capture_interval - elapsed).await;
        } else {
            tokio::task::yield_now().await;
        }
    }

    debug!("Capture loop exiting");
    status_tx.send_modify(|status| status.is_capturing = false);
    info!("Capture loop stopped");
}
