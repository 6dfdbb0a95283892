use crate::auto_detect::HeroAutoDetector;
use crate::events::{EventBuffer, EventKind};
use crate::hero::{self, AbilityFlags, DebounceConfig, Hero};
use ow_data::HeroId;
use ow_vision::{Detector, VisionError, DEFAULT_THRESHOLD};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Notifications that first appeared this tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvents {
    pub eliminations: usize,
    pub assists: usize,
    pub saves: usize,
}

impl NewEvents {
    pub fn get(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Elimination => self.eliminations,
            EventKind::Assist => self.assists,
            EventKind::Save => self.saves,
        }
    }

    fn set(&mut self, kind: EventKind, n: usize) {
        match kind {
            EventKind::Elimination => self.eliminations = n,
            EventKind::Assist => self.assists = n,
            EventKind::Save => self.saves = n,
        }
    }
}

/// What the tracker believes is true after one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub is_dead: bool,
    pub new_events: NewEvents,
    pub hero: HeroId,
    pub abilities: AbilityFlags,
    pub being_beamed: bool,
    pub being_orbed: bool,
    pub hacked: bool,
    pub detected_hero: HeroId,
    pub hero_auto_detect: bool,
}

/// Turns per-tick detector answers into game state.
///
/// Every detection error is returned to the caller untouched; the tracker
/// never retries or swallows one.
#[derive(Debug, Clone)]
pub struct StateTracker {
    debounce: DebounceConfig,
    hero: Hero,
    events: EventBuffer,
    new_events: NewEvents,
    auto: HeroAutoDetector,
    hero_auto_detect: bool,
    is_dead: bool,
    being_beamed: bool,
    being_orbed: bool,
    hacked: bool,
}

impl StateTracker {
    pub fn new(debounce: DebounceConfig) -> Self {
        Self {
            debounce,
            hero: Hero::new(HeroId::Other, &debounce),
            events: EventBuffer::new(),
            new_events: NewEvents::default(),
            auto: HeroAutoDetector::new(),
            hero_auto_detect: true,
            is_dead: false,
            being_beamed: false,
            being_orbed: false,
            hacked: false,
        }
    }

    pub fn hero(&self) -> &Hero {
        &self.hero
    }

    pub fn is_dead(&self) -> bool {
        self.is_dead
    }

    pub fn hero_auto_detect(&self) -> bool {
        self.hero_auto_detect
    }

    pub fn set_hero_auto_detect(&mut self, enabled: bool) {
        if self.hero_auto_detect != enabled {
            info!("Hero auto-detect {}", if enabled { "on" } else { "off" });
        }
        self.hero_auto_detect = enabled;
    }

    pub fn detected_hero(&self) -> HeroId {
        self.auto.detected()
    }

    /// Replace the hero state with a fresh one for `id`
    pub fn switch_hero(&mut self, id: HeroId) {
        if id != self.hero.id() {
            info!("Switching hero: {} -> {}", self.hero.id(), id);
        }
        self.hero = Hero::new(id, &self.debounce);
    }

    /// Run one tick of detection against the detector's current frame
    pub fn refresh(&mut self, detector: &dyn Detector, now: f64) -> Result<Snapshot, VisionError> {
        self.events.expire(now);
        self.new_events = NewEvents::default();

        let dead = detector.present("killcam")? || detector.present("death_spec")?;
        if dead && !self.is_dead {
            debug!("Player died");
            hero::reset_attributes(&mut self.hero);
            self.being_beamed = false;
            self.being_orbed = false;
            self.hacked = false;
        } else if !dead && self.is_dead {
            debug!("Player alive");
        }
        self.is_dead = dead;

        if !dead {
            for kind in EventKind::ALL {
                let seen = detector.detect_count(kind.template(), DEFAULT_THRESHOLD)?;
                let new = self.events.record_if_new(kind, seen, now);
                if new > 0 {
                    debug!("{} new {:?} notification(s)", new, kind);
                }
                self.new_events.set(kind, new);
            }

            self.being_beamed = detector.present("being_beamed")?;
            self.being_orbed = detector.present("being_orbed")?;
            self.hacked = detector.present("hacked")?;

            hero::detect_all(&mut self.hero, detector, now)?;
            let save_buffered = self.events.count_active(EventKind::Save) > 0;
            hero::detect_resurrect(&mut self.hero, detector, save_buffered)?;

            if self.hero_auto_detect {
                self.auto.update(detector, now)?;
            }
        }

        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            is_dead: self.is_dead,
            new_events: self.new_events,
            hero: self.hero.id(),
            abilities: self.hero.flags(),
            being_beamed: self.being_beamed,
            being_orbed: self.being_orbed,
            hacked: self.hacked,
            detected_hero: self.auto.detected(),
            hero_auto_detect: self.hero_auto_detect,
        }
    }
}
