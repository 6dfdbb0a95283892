use crate::PatternError;
use serde::{Deserialize, Serialize};

/// Step length for single-intensity vibes. Such a pattern only ever loops
/// onto itself, so the value just has to be positive.
pub const PERMANENT_STEP: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub intensity: f64,
    /// Seconds
    pub duration: f64,
}

/// Non-empty sequence of steps, each with a positive duration.
///
/// Serialized as a list of `[intensity, seconds]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct Pattern {
    steps: Vec<Step>,
}

impl Pattern {
    pub fn new(pairs: Vec<(f64, f64)>) -> Result<Self, PatternError> {
        if pairs.is_empty() {
            return Err(PatternError::Empty);
        }
        let mut steps = Vec::with_capacity(pairs.len());
        for (index, (intensity, duration)) in pairs.into_iter().enumerate() {
            if !intensity.is_finite() || !duration.is_finite() {
                return Err(PatternError::NonFinite { index });
            }
            if duration <= 0.0 {
                return Err(PatternError::NonPositiveDuration { index, duration });
            }
            steps.push(Step {
                intensity,
                duration,
            });
        }
        Ok(Self { steps })
    }

    /// One step at `intensity`
    pub fn constant(intensity: f64) -> Self {
        Self {
            steps: vec![Step {
                intensity,
                duration: PERMANENT_STEP,
            }],
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn total_duration(&self) -> f64 {
        self.steps.iter().map(|s| s.duration).sum()
    }
}

impl TryFrom<Vec<(f64, f64)>> for Pattern {
    type Error = PatternError;

    fn try_from(pairs: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        Pattern::new(pairs)
    }
}

impl From<Pattern> for Vec<(f64, f64)> {
    fn from(p: Pattern) -> Self {
        p.steps.iter().map(|s| (s.intensity, s.duration)).collect()
    }
}

/// How long a vibe lives
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lifetime {
    /// Until removed
    Permanent,
    /// For this many seconds
    Timed(f64),
    /// For this many passes through its pattern
    Looped(u32),
}

/// A pattern played from a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Vibe {
    pattern: Pattern,
    created_at: f64,
    expires_at: Option<f64>,
    step: usize,
    /// Absolute end time of each step in the current pass
    step_ends: Vec<f64>,
}

impl Vibe {
    pub fn new(pattern: Pattern, lifetime: Lifetime, now: f64) -> Self {
        let expires_at = match lifetime {
            Lifetime::Permanent => None,
            Lifetime::Timed(duration) => Some(now + duration),
            Lifetime::Looped(loops) => Some(now + pattern.total_duration() * loops as f64),
        };
        let step_ends = schedule(&pattern, now);
        Self {
            pattern,
            created_at: now,
            expires_at,
            step: 0,
            step_ends,
        }
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<f64> {
        self.expires_at
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Intensity at `now`, or `None` once the vibe has expired.
    ///
    /// Steps advance as their end times pass. Running off the last step
    /// restarts the pattern at `now` instead of at the old pass's end, so a
    /// late query never plays steps that are already in the past.
    pub fn intensity_at(&mut self, now: f64) -> Option<f64> {
        if self.expires_at.is_some_and(|t| now >= t) {
            return None;
        }
        while now >= self.step_ends[self.step] {
            self.step += 1;
            if self.step == self.step_ends.len() {
                self.step = 0;
                self.step_ends = schedule(&self.pattern, now);
                // Steps shorter than the float resolution of `now` never end
                if self.step_ends.last().map_or(true, |&end| end <= now) {
                    break;
                }
            }
        }
        Some(self.pattern.steps[self.step].intensity)
    }
}

fn schedule(pattern: &Pattern, start: f64) -> Vec<f64> {
    let mut end = start;
    pattern
        .steps
        .iter()
        .map(|s| {
            end += s.duration;
            end
        })
        .collect()
}
