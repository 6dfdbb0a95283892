use crate::{CaptureStatus, FrameSource};
use anyhow::{bail, Context, Result};
use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Plays back saved screenshots in place of live capture.
///
/// Accepts a single PNG or a directory of PNGs (played in file-name order,
/// looping). Frames advance on wall-clock time at the capture rate, so the
/// tracker sees the same repeated-frame behavior it gets from the screen.
pub struct ReplaySource {
    frames: Vec<Arc<RgbaImage>>,
    index: usize,
    interval: Duration,
    last_advance: Option<Instant>,
}

impl ReplaySource {
    pub fn open(path: &Path) -> Result<Self> {
        let mut paths = if path.is_dir() {
            let mut paths = Vec::new();
            for entry in std::fs::read_dir(path)
                .with_context(|| format!("Failed to read {}", path.display()))?
            {
                let p = entry?.path();
                if p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")) {
                    paths.push(p);
                }
            }
            paths
        } else {
            vec![path.to_path_buf()]
        };
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for p in &paths {
            let img = image::open(p)
                .with_context(|| format!("Failed to open {}", p.display()))?
                .to_rgba8();
            frames.push(Arc::new(img));
        }
        if frames.is_empty() {
            bail!("No screenshots found at {}", path.display());
        }

        info!("Replay loaded {} frame(s) from {}", frames.len(), path.display());
        Ok(Self::from_frames(frames))
    }

    pub fn from_frames(frames: Vec<Arc<RgbaImage>>) -> Self {
        Self {
            frames,
            index: 0,
            interval: Duration::from_millis(100),
            last_advance: None,
        }
    }
}

impl FrameSource for ReplaySource {
    fn start_capture(&mut self, target_fps: u32) -> Result<()> {
        self.interval = Duration::from_secs_f64(1.0 / target_fps.max(1) as f64);
        self.index = 0;
        self.last_advance = Some(Instant::now());
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.last_advance = None;
    }

    fn latest_frame(&mut self) -> Result<Option<Arc<RgbaImage>>> {
        let Some(last) = self.last_advance else {
            return Ok(None);
        };
        if last.elapsed() >= self.interval {
            self.index = (self.index + 1) % self.frames.len();
            self.last_advance = Some(Instant::now());
        }
        Ok(self.frames.get(self.index).cloned())
    }

    fn status(&self) -> CaptureStatus {
        let resolution = self.frames.get(self.index).map(|f| (f.width(), f.height()));
        CaptureStatus {
            is_capturing: self.last_advance.is_some(),
            fps: 1.0 / self.interval.as_secs_f64(),
            last_capture_time: None,
            resolution,
            error: None,
        }
    }
}
