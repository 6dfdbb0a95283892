use crate::ncc::{score_map, ScoreMap};
use crate::{Frame, TemplateStore, VisionError};
use ow_capture::{crop_region, regions, Region, RegionSpec};
use std::collections::HashMap;
use tracing::debug;

/// Default score a region must beat to count as present
pub const DEFAULT_THRESHOLD: f64 = 0.9;

/// Boolean and counting queries over the current frame.
///
/// This is the seam between perception logic and the matching backend;
/// state code only ever talks to a `Detector`.
pub trait Detector {
    /// Whether the template named `name` scores above `threshold` anywhere in
    /// its region (or in `region_override`, if given).
    fn detect_present(
        &self,
        name: &str,
        threshold: f64,
        region_override: Option<Region>,
    ) -> Result<bool, VisionError>;

    /// Number of separate matches above `threshold` in the template's region
    fn detect_count(&self, name: &str, threshold: f64) -> Result<usize, VisionError>;

    /// `detect_present` with the default threshold and the template's own region
    fn present(&self, name: &str) -> Result<bool, VisionError> {
        self.detect_present(name, DEFAULT_THRESHOLD, None)
    }
}

/// Matches named templates against fixed HUD regions of the current frame
pub struct RegionMatcher {
    store: TemplateStore,
    regions: HashMap<&'static str, Region>,
    frame: Option<Frame>,
}

impl RegionMatcher {
    /// Build a matcher over the given regions. Every region needs a template
    /// that fits inside it; anything else is a startup error.
    pub fn new(store: TemplateStore, specs: &[RegionSpec]) -> Result<Self, VisionError> {
        let mut by_name = HashMap::new();
        for spec in specs {
            let template = store
                .get(spec.name)
                .ok_or_else(|| VisionError::MissingTemplate {
                    name: spec.name.to_string(),
                    path: format!("t_{}.png", spec.name).into(),
                })?;
            check_fits(spec.name, template.width(), template.height(), &spec.region)?;
            by_name.insert(spec.name, spec.region);
        }

        Ok(Self {
            store,
            regions: by_name,
            frame: None,
        })
    }

    /// Matcher over every well-known region
    pub fn with_default_regions(store: TemplateStore) -> Result<Self, VisionError> {
        Self::new(store, regions::ALL)
    }

    /// Replace the frame all queries run against
    pub fn set_frame(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn template_count(&self) -> usize {
        self.store.len()
    }

    /// Full correlation map of `name` over its region (or `region_override`)
    pub fn score_map(
        &self,
        name: &str,
        region_override: Option<Region>,
    ) -> Result<ScoreMap, VisionError> {
        let frame = self.frame.as_ref().ok_or(VisionError::NoFrame)?;
        let template = self
            .store
            .get(name)
            .ok_or_else(|| VisionError::UnknownRegion(name.to_string()))?;
        let region = match region_override {
            Some(r) => {
                check_fits(name, template.width(), template.height(), &r)?;
                r
            }
            None => *self
                .regions
                .get(name)
                .ok_or_else(|| VisionError::UnknownRegion(name.to_string()))?,
        };

        let crop = crop_region(frame.image(), &region);
        if crop.width() < template.width() || crop.height() < template.height() {
            return Err(VisionError::TemplateTooLarge {
                name: name.to_string(),
                template_size: (template.width(), template.height()),
                region_size: crop.dimensions(),
            });
        }
        Ok(score_map(&crop, template))
    }

    /// Best correlation of `name` within its region, in [-1, 1]
    pub fn match_score(&self, name: &str) -> Result<f64, VisionError> {
        Ok(self.score_map(name, None)?.max() as f64)
    }
}

impl Detector for RegionMatcher {
    fn detect_present(
        &self,
        name: &str,
        threshold: f64,
        region_override: Option<Region>,
    ) -> Result<bool, VisionError> {
        let score = self.score_map(name, region_override)?.max() as f64;
        Ok(score > threshold)
    }

    fn detect_count(&self, name: &str, threshold: f64) -> Result<usize, VisionError> {
        let count = self.score_map(name, None)?.count_above(threshold as f32);
        if count > 0 {
            debug!("{}: {} match(es)", name, count);
        }
        Ok(count)
    }
}

fn check_fits(name: &str, tw: u32, th: u32, region: &Region) -> Result<(), VisionError> {
    if tw > region.width() || th > region.height() {
        return Err(VisionError::TemplateTooLarge {
            name: name.to_string(),
            template_size: (tw, th),
            region_size: (region.width(), region.height()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Template;
    use image::GrayImage;
    use ow_capture::{BASE_HEIGHT, BASE_WIDTH};

    const ICON: Region = Region::new(100, 140, 200, 300);

    fn icon() -> GrayImage {
        GrayImage::from_fn(12, 12, |x, y| {
            image::Luma([((x * x * 31 + y * 17 + x * y * 7) % 256) as u8])
        })
    }

    fn matcher() -> RegionMatcher {
        let mut store = TemplateStore::default();
        store.insert("icon", Template::new("icon", icon(), None).unwrap());
        let specs = [RegionSpec {
            name: "icon",
            region: ICON,
            masked: false,
        }];
        RegionMatcher::new(store, &specs).unwrap()
    }

    fn frame_with_icons(at: &[(u32, u32)]) -> Frame {
        let mut gray = GrayImage::from_pixel(BASE_WIDTH, BASE_HEIGHT, image::Luma([20]));
        for &(x, y) in at {
            image::imageops::replace(&mut gray, &icon(), x as i64, y as i64);
        }
        Frame::from_gray(gray)
    }

    #[test]
    fn test_no_frame_is_an_error() {
        let m = matcher();
        assert!(matches!(m.present("icon"), Err(VisionError::NoFrame)));
    }

    #[test]
    fn test_detect_present_inside_region() {
        let mut m = matcher();
        m.set_frame(frame_with_icons(&[(230, 110)]));
        assert!(m.present("icon").unwrap());
        assert!(m.match_score("icon").unwrap() > 0.99);
    }

    #[test]
    fn test_icon_outside_region_is_ignored() {
        let mut m = matcher();
        m.set_frame(frame_with_icons(&[(600, 600)]));
        assert!(!m.present("icon").unwrap());
    }

    #[test]
    fn test_region_override_moves_search() {
        let mut m = matcher();
        m.set_frame(frame_with_icons(&[(600, 600)]));
        let shifted = Region::new(590, 630, 580, 680);
        assert!(m.detect_present("icon", 0.9, Some(shifted)).unwrap());
    }

    #[test]
    fn test_override_smaller_than_template_fails() {
        let mut m = matcher();
        m.set_frame(frame_with_icons(&[]));
        let tiny = Region::new(0, 5, 0, 5);
        assert!(matches!(
            m.detect_present("icon", 0.9, Some(tiny)),
            Err(VisionError::TemplateTooLarge { .. })
        ));
    }

    #[test]
    fn test_detect_count_stacked_icons() {
        let mut m = matcher();
        m.set_frame(frame_with_icons(&[(205, 102), (250, 120)]));
        assert_eq!(m.detect_count("icon", 0.9).unwrap(), 2);
    }

    #[test]
    fn test_unknown_region() {
        let mut m = matcher();
        m.set_frame(frame_with_icons(&[]));
        assert!(matches!(
            m.present("missing"),
            Err(VisionError::UnknownRegion(_))
        ));
    }

    #[test]
    fn test_template_larger_than_region_rejected_at_startup() {
        let mut store = TemplateStore::default();
        store.insert("icon", Template::new("icon", icon(), None).unwrap());
        let specs = [RegionSpec {
            name: "icon",
            region: Region::new(0, 8, 0, 8),
            masked: false,
        }];
        assert!(RegionMatcher::new(store, &specs).is_err());
    }
}
