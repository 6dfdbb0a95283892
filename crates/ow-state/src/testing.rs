//! Scripted detector for exercising state logic without frames.

use ow_capture::Region;
use ow_vision::{Detector, VisionError};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct FakeDetector {
    present: RefCell<HashSet<String>>,
    counts: RefCell<HashMap<String, usize>>,
    failing: RefCell<HashSet<String>>,
    calls: RefCell<HashMap<String, usize>>,
    thresholds: RefCell<HashMap<String, f64>>,
}

impl FakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, on: bool) {
        let mut present = self.present.borrow_mut();
        if on {
            present.insert(name.to_string());
        } else {
            present.remove(name);
        }
    }

    pub fn set_count(&self, name: &str, count: usize) {
        self.counts.borrow_mut().insert(name.to_string(), count);
    }

    /// Make every query for `name` fail as if its template were missing
    pub fn fail(&self, name: &str) {
        self.failing.borrow_mut().insert(name.to_string());
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.borrow().get(name).copied().unwrap_or(0)
    }

    pub fn last_threshold(&self, name: &str) -> Option<f64> {
        self.thresholds.borrow().get(name).copied()
    }

    fn record(&self, name: &str, threshold: f64) -> Result<(), VisionError> {
        *self.calls.borrow_mut().entry(name.to_string()).or_default() += 1;
        self.thresholds
            .borrow_mut()
            .insert(name.to_string(), threshold);
        if self.failing.borrow().contains(name) {
            return Err(VisionError::UnknownRegion(name.to_string()));
        }
        Ok(())
    }
}

impl Detector for FakeDetector {
    fn detect_present(
        &self,
        name: &str,
        threshold: f64,
        _region_override: Option<Region>,
    ) -> Result<bool, VisionError> {
        self.record(name, threshold)?;
        Ok(self.present.borrow().contains(name))
    }

    fn detect_count(&self, name: &str, threshold: f64) -> Result<usize, VisionError> {
        self.record(name, threshold)?;
        Ok(self.counts.borrow().get(name).copied().unwrap_or(0))
    }
}
