use serde::{Deserialize, Serialize};

/// A boolean detector output smoothed with asymmetric hysteresis.
///
/// `counter` is positive while raw samples disagree with an OFF state and
/// negative while they disagree with an ON state. It flips `current` once it
/// reaches `on_after` (or `-off_after`) and is zeroed whenever a raw sample
/// agrees with `current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebouncedSignal {
    current: bool,
    counter: i32,
    on_after: u32,
    off_after: u32,
}

impl DebouncedSignal {
    /// `on_after` consecutive positives turn it on, `off_after` consecutive
    /// negatives turn it off. Both are at least 1.
    pub fn new(on_after: u32, off_after: u32) -> Self {
        Self {
            current: false,
            counter: 0,
            on_after: on_after.max(1),
            off_after: off_after.max(1),
        }
    }

    /// Feed one raw detection; returns the (possibly new) debounced value
    pub fn update(&mut self, raw: bool) -> bool {
        if raw == self.current {
            self.counter = 0;
            return self.current;
        }

        if raw {
            self.counter = if self.counter > 0 { self.counter + 1 } else { 1 };
            if self.counter >= self.on_after as i32 {
                self.current = true;
                self.counter = 0;
            }
        } else {
            self.counter = if self.counter < 0 { self.counter - 1 } else { -1 };
            if -self.counter >= self.off_after as i32 {
                self.current = false;
                self.counter = 0;
            }
        }
        self.current
    }

    /// Turn off immediately, discarding any pending confirmation
    pub fn force_off(&mut self) {
        self.current = false;
        self.counter = 0;
    }

    pub fn reset(&mut self) {
        self.force_off();
    }

    pub fn is_on(&self) -> bool {
        self.current
    }

    pub fn counter(&self) -> i32 {
        self.counter
    }
}
