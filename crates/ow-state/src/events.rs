use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How long a kill-feed notification stays on screen, in seconds
pub const NOTIFICATION_LIFETIME: f64 = 2.705;

/// Notifications remembered at once, across all kinds
pub const MAX_NOTIFICATIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Elimination,
    Assist,
    Save,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Elimination, EventKind::Assist, EventKind::Save];

    /// Region/template the notification icon is matched with
    pub fn template(self) -> &'static str {
        match self {
            EventKind::Elimination => "elimination",
            EventKind::Assist => "assist",
            EventKind::Save => "saved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Notification {
    kind: EventKind,
    expires_at: f64,
}

/// Rolling log of recent kill-feed notifications.
///
/// Icons stay on screen for several ticks, so the per-tick icon count can't be
/// used directly; comparing it against what is already buffered tells how
/// many icons are new. Entries are kept in arrival order, which is also
/// expiry order.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    entries: VecDeque<Notification>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every notification whose lifetime ended at or before `now`
    pub fn expire(&mut self, now: f64) {
        while let Some(front) = self.entries.front() {
            if front.expires_at > now {
                break;
            }
            self.entries.pop_front();
        }
    }

    /// Record the icons of `kind` seen this tick and return how many are new.
    ///
    /// New entries beyond the buffer cap push out the oldest entry of any kind.
    /// No more icons than the buffer can hold are ever reported as new.
    pub fn record_if_new(&mut self, kind: EventKind, detected: usize, now: f64) -> usize {
        let new = detected
            .min(MAX_NOTIFICATIONS)
            .saturating_sub(self.count_active(kind));
        for _ in 0..new {
            if self.entries.len() >= MAX_NOTIFICATIONS {
                self.entries.pop_front();
            }
            self.entries.push_back(Notification {
                kind,
                expires_at: now + NOTIFICATION_LIFETIME,
            });
        }
        new
    }

    pub fn count_active(&self, kind: EventKind) -> usize {
        self.entries.iter().filter(|n| n.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
