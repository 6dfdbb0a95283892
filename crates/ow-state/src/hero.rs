use crate::DebouncedSignal;
use ow_data::HeroId;
use ow_vision::{Detector, VisionError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weapon icons must match this well before a hero counts as identified.
/// Stricter than ability checks: a wrong hero costs far more than a missed tick.
pub const HERO_THRESHOLD: f64 = 0.97;

/// Seconds the torpedo overlay needs to settle before firing is checked
pub const PULSAR_START_LOCKOUT: f64 = 0.5;
/// Seconds after torpedoes end during which the cooldown icon hides the overlay
pub const PULSAR_END_LOCKOUT: f64 = 1.0;

/// Consecutive misses needed to drop each ability signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceConfig {
    pub mercy_beam: u32,
    pub zenyatta_orb: u32,
    pub lucio_crossfade: u32,
    pub juno_ability: u32,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            mercy_beam: 8,
            // Orbs take up to 0.8s to switch targets at max range
            zenyatta_orb: 30,
            lucio_crossfade: 12,
            juno_ability: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MercyState {
    pub heal_beam: DebouncedSignal,
    pub damage_beam: DebouncedSignal,
    pub resurrecting: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZenyattaState {
    pub harmony_orb: DebouncedSignal,
    pub discord_orb: DebouncedSignal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LucioState {
    pub healing_song: DebouncedSignal,
    pub speed_song: DebouncedSignal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JunoState {
    pub glide_boost: DebouncedSignal,
    pub pulsar_torpedoes: DebouncedSignal,
    pub pulsar_torpedoes_firing: DebouncedSignal,
    started_at: Option<f64>,
    ended_at: Option<f64>,
}

/// Per-hero ability state
#[derive(Debug, Clone, PartialEq)]
pub enum Abilities {
    None,
    Juno(JunoState),
    Lucio(LucioState),
    Mercy(MercyState),
    Zenyatta(ZenyattaState),
}

/// Flat view of every ability flag, false for abilities the hero lacks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityFlags {
    pub heal_beam: bool,
    pub damage_beam: bool,
    pub resurrecting: bool,
    pub harmony_orb: bool,
    pub discord_orb: bool,
    pub healing_song: bool,
    pub speed_song: bool,
    pub glide_boost: bool,
    pub pulsar_torpedoes: bool,
    pub pulsar_torpedoes_firing: bool,
}

/// The hero being played and its ability state
#[derive(Debug, Clone, PartialEq)]
pub struct Hero {
    id: HeroId,
    abilities: Abilities,
}

impl Hero {
    pub fn new(id: HeroId, debounce: &DebounceConfig) -> Self {
        let abilities = match id {
            HeroId::Juno => Abilities::Juno(JunoState {
                glide_boost: DebouncedSignal::new(1, debounce.juno_ability),
                pulsar_torpedoes: DebouncedSignal::new(1, debounce.juno_ability),
                pulsar_torpedoes_firing: DebouncedSignal::new(1, debounce.juno_ability),
                started_at: None,
                ended_at: None,
            }),
            HeroId::Lucio => Abilities::Lucio(LucioState {
                healing_song: DebouncedSignal::new(1, debounce.lucio_crossfade),
                speed_song: DebouncedSignal::new(1, debounce.lucio_crossfade),
            }),
            HeroId::Mercy => Abilities::Mercy(MercyState {
                heal_beam: DebouncedSignal::new(1, debounce.mercy_beam),
                damage_beam: DebouncedSignal::new(1, debounce.mercy_beam),
                resurrecting: false,
            }),
            HeroId::Zenyatta => Abilities::Zenyatta(ZenyattaState {
                harmony_orb: DebouncedSignal::new(1, debounce.zenyatta_orb),
                discord_orb: DebouncedSignal::new(1, debounce.zenyatta_orb),
            }),
            HeroId::Other | HeroId::Baptiste | HeroId::Brigitte | HeroId::Kiriko => {
                Abilities::None
            }
        };
        Self { id, abilities }
    }

    pub fn id(&self) -> HeroId {
        self.id
    }

    pub fn abilities(&self) -> &Abilities {
        &self.abilities
    }

    pub fn flags(&self) -> AbilityFlags {
        let mut flags = AbilityFlags::default();
        match &self.abilities {
            Abilities::None => {}
            Abilities::Juno(j) => {
                flags.glide_boost = j.glide_boost.is_on();
                flags.pulsar_torpedoes = j.pulsar_torpedoes.is_on();
                flags.pulsar_torpedoes_firing = j.pulsar_torpedoes_firing.is_on();
            }
            Abilities::Lucio(l) => {
                flags.healing_song = l.healing_song.is_on();
                flags.speed_song = l.speed_song.is_on();
            }
            Abilities::Mercy(m) => {
                flags.heal_beam = m.heal_beam.is_on();
                flags.damage_beam = m.damage_beam.is_on();
                flags.resurrecting = m.resurrecting;
            }
            Abilities::Zenyatta(z) => {
                flags.harmony_orb = z.harmony_orb.is_on();
                flags.discord_orb = z.discord_orb.is_on();
            }
        }
        flags
    }
}

/// Whether any of `id`'s weapon icons is on screen. `Other` never matches.
pub fn detect_hero(id: HeroId, detector: &dyn Detector) -> Result<bool, VisionError> {
    for weapon in id.weapons() {
        if detector.detect_present(weapon.template, HERO_THRESHOLD, weapon.region)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Clear every ability signal
pub fn reset_attributes(hero: &mut Hero) {
    match &mut hero.abilities {
        Abilities::None => {}
        Abilities::Juno(j) => {
            j.glide_boost.reset();
            j.pulsar_torpedoes.reset();
            j.pulsar_torpedoes_firing.reset();
            j.started_at = None;
            j.ended_at = None;
        }
        Abilities::Lucio(l) => {
            l.healing_song.reset();
            l.speed_song.reset();
        }
        Abilities::Mercy(m) => {
            m.heal_beam.reset();
            m.damage_beam.reset();
            m.resurrecting = false;
        }
        Abilities::Zenyatta(z) => {
            z.harmony_orb.reset();
            z.discord_orb.reset();
        }
    }
}

/// Run every ability detector of `hero` for one tick
pub fn detect_all(hero: &mut Hero, detector: &dyn Detector, now: f64) -> Result<(), VisionError> {
    match &mut hero.abilities {
        Abilities::None => {}
        Abilities::Juno(j) => detect_juno(j, detector, now)?,
        Abilities::Lucio(l) => {
            detect_exclusive(
                detector,
                ("lucio_healing_song", &mut l.healing_song),
                ("lucio_speed_song", &mut l.speed_song),
            )?;
        }
        Abilities::Mercy(m) => {
            detect_exclusive(
                detector,
                ("mercy_heal_beam", &mut m.heal_beam),
                ("mercy_damage_beam", &mut m.damage_beam),
            )?;
        }
        Abilities::Zenyatta(z) => {
            z.harmony_orb.update(detector.present("zenyatta_harmony")?);
            z.discord_orb.update(detector.present("zenyatta_discord")?);
        }
    }
    Ok(())
}

/// Probe Mercy's resurrect cooldown. The overlay trails the save icon, so it is
/// only worth checking while a save is still buffered.
pub fn detect_resurrect(
    hero: &mut Hero,
    detector: &dyn Detector,
    save_buffered: bool,
) -> Result<(), VisionError> {
    if let Abilities::Mercy(m) = &mut hero.abilities {
        m.resurrecting = save_buffered && detector.present("mercy_resurrect_cd")?;
    }
    Ok(())
}

/// Two signals that can never be on together. A raw hit on one cuts the other
/// off at once instead of waiting out its hysteresis. The second signal wins
/// if both hit in the same tick.
fn detect_exclusive(
    detector: &dyn Detector,
    first: (&str, &mut DebouncedSignal),
    second: (&str, &mut DebouncedSignal),
) -> Result<(), VisionError> {
    let (first_name, first_signal) = first;
    let (second_name, second_signal) = second;

    let first_raw = detector.present(first_name)?;
    if first_raw {
        second_signal.force_off();
    }
    first_signal.update(first_raw);

    let second_raw = detector.present(second_name)?;
    if second_raw {
        first_signal.force_off();
    }
    second_signal.update(second_raw);
    Ok(())
}

fn detect_juno(j: &mut JunoState, detector: &dyn Detector, now: f64) -> Result<(), VisionError> {
    j.glide_boost.update(detector.present("juno_glide_boost")?);

    let in_end_lockout = j.ended_at.is_some_and(|t| now < t + PULSAR_END_LOCKOUT);
    if !in_end_lockout {
        let was_on = j.pulsar_torpedoes.is_on();
        let is_on = j
            .pulsar_torpedoes
            .update(detector.present("juno_pulsar_torpedoes")?);
        if is_on && !was_on {
            debug!("Pulsar torpedoes started at {:.2}", now);
            j.started_at = Some(now);
            j.ended_at = None;
        } else if was_on && !is_on {
            debug!("Pulsar torpedoes ended at {:.2}", now);
            j.started_at = None;
            j.ended_at = Some(now);
            j.pulsar_torpedoes_firing.reset();
        }
    }

    let settled = j.started_at.is_some_and(|t| now >= t + PULSAR_START_LOCKOUT);
    if j.pulsar_torpedoes.is_on() && settled {
        j.pulsar_torpedoes_firing
            .update(detector.present("juno_pulsar_torpedoes_firing")?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDetector;

    fn mercy() -> Hero {
        Hero::new(HeroId::Mercy, &DebounceConfig::default())
    }

    #[test]
    fn test_other_never_detected() {
        let det = FakeDetector::new();
        assert!(!detect_hero(HeroId::Other, &det).unwrap());
    }

    #[test]
    fn test_detect_hero_by_any_weapon() {
        let det = FakeDetector::new();
        det.set("mercy_pistol", true);
        assert!(detect_hero(HeroId::Mercy, &det).unwrap());
        assert!(!detect_hero(HeroId::Zenyatta, &det).unwrap());
    }

    #[test]
    fn test_detect_hero_uses_strict_threshold() {
        let det = FakeDetector::new();
        det.set("lucio_weapon", true);
        detect_hero(HeroId::Lucio, &det).unwrap();
        assert_eq!(det.last_threshold("lucio_weapon"), Some(HERO_THRESHOLD));
    }

    #[test]
    fn test_heal_beam_cuts_damage_beam_instantly() {
        let det = FakeDetector::new();
        let mut hero = mercy();

        det.set("mercy_damage_beam", true);
        detect_all(&mut hero, &det, 0.0).unwrap();
        assert!(hero.flags().damage_beam);

        det.set("mercy_damage_beam", false);
        det.set("mercy_heal_beam", true);
        detect_all(&mut hero, &det, 0.1).unwrap();
        let flags = hero.flags();
        assert!(!flags.damage_beam);
        assert!(flags.heal_beam);
        if let Abilities::Mercy(m) = hero.abilities() {
            assert_eq!(m.damage_beam.counter(), 0);
        }
    }

    #[test]
    fn test_beam_survives_short_dropout() {
        let det = FakeDetector::new();
        let mut hero = mercy();
        det.set("mercy_heal_beam", true);
        detect_all(&mut hero, &det, 0.0).unwrap();

        det.set("mercy_heal_beam", false);
        for i in 1..8 {
            detect_all(&mut hero, &det, i as f64 * 0.01).unwrap();
            assert!(hero.flags().heal_beam);
        }
        detect_all(&mut hero, &det, 0.08).unwrap();
        assert!(!hero.flags().heal_beam);
    }

    #[test]
    fn test_lucio_songs_exclusive() {
        let det = FakeDetector::new();
        let mut hero = Hero::new(HeroId::Lucio, &DebounceConfig::default());
        det.set("lucio_healing_song", true);
        detect_all(&mut hero, &det, 0.0).unwrap();
        det.set("lucio_healing_song", false);
        det.set("lucio_speed_song", true);
        detect_all(&mut hero, &det, 0.1).unwrap();
        let flags = hero.flags();
        assert!(flags.speed_song);
        assert!(!flags.healing_song);
    }

    #[test]
    fn test_zenyatta_orbs_independent() {
        let det = FakeDetector::new();
        let mut hero = Hero::new(HeroId::Zenyatta, &DebounceConfig::default());
        det.set("zenyatta_harmony", true);
        det.set("zenyatta_discord", true);
        detect_all(&mut hero, &det, 0.0).unwrap();
        let flags = hero.flags();
        assert!(flags.harmony_orb && flags.discord_orb);
    }

    #[test]
    fn test_reset_clears_mercy_state() {
        let det = FakeDetector::new();
        let mut hero = mercy();
        det.set("mercy_heal_beam", true);
        detect_all(&mut hero, &det, 0.0).unwrap();
        reset_attributes(&mut hero);
        assert_eq!(hero.flags(), AbilityFlags::default());
    }

    #[test]
    fn test_resurrect_only_probed_with_buffered_save() {
        let det = FakeDetector::new();
        det.set("mercy_resurrect_cd", true);
        let mut hero = mercy();
        detect_resurrect(&mut hero, &det, false).unwrap();
        assert!(!hero.flags().resurrecting);
        assert_eq!(det.calls("mercy_resurrect_cd"), 0);
        detect_resurrect(&mut hero, &det, true).unwrap();
        assert!(hero.flags().resurrecting);
    }

    #[test]
    fn test_juno_firing_waits_for_start_lockout() {
        let det = FakeDetector::new();
        let mut hero = Hero::new(HeroId::Juno, &DebounceConfig::default());
        det.set("juno_pulsar_torpedoes", true);
        det.set("juno_pulsar_torpedoes_firing", true);

        detect_all(&mut hero, &det, 10.0).unwrap();
        assert!(hero.flags().pulsar_torpedoes);
        assert!(!hero.flags().pulsar_torpedoes_firing);

        detect_all(&mut hero, &det, 10.3).unwrap();
        assert!(!hero.flags().pulsar_torpedoes_firing);

        detect_all(&mut hero, &det, 10.5).unwrap();
        assert!(hero.flags().pulsar_torpedoes_firing);
    }

    #[test]
    fn test_juno_end_lockout_ignores_overlay() {
        let det = FakeDetector::new();
        let config = DebounceConfig {
            juno_ability: 1,
            ..DebounceConfig::default()
        };
        let mut hero = Hero::new(HeroId::Juno, &config);
        det.set("juno_pulsar_torpedoes", true);
        detect_all(&mut hero, &det, 0.0).unwrap();

        det.set("juno_pulsar_torpedoes", false);
        detect_all(&mut hero, &det, 2.0).unwrap();
        assert!(!hero.flags().pulsar_torpedoes);

        // Cooldown icon looks like the active overlay for a moment
        det.set("juno_pulsar_torpedoes", true);
        detect_all(&mut hero, &det, 2.5).unwrap();
        assert!(!hero.flags().pulsar_torpedoes);

        detect_all(&mut hero, &det, 3.0).unwrap();
        assert!(hero.flags().pulsar_torpedoes);
    }
}
