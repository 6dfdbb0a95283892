//! Rules that turn tracker snapshots into vibes.

use crate::config::{Config, HackedMode};
use ow_data::HeroId;
use ow_haptics::{IntensityManager, Lifetime, Pattern};
use ow_state::{Snapshot, StateTracker};
use tracing::info;

pub const HACKED: &str = "hacked";
pub const ELIMINATION: &str = "elimination";
pub const ASSIST: &str = "assist";
pub const SAVE: &str = "save";
pub const BEING_BEAMED: &str = "being beamed";
pub const BEING_ORBED: &str = "being orbed";
pub const JUNO_GLIDE_BOOST: &str = "juno glide boost";
pub const JUNO_PULSAR_TORPEDOES: &str = "juno pulsar torpedoes";
pub const JUNO_PULSAR_TORPEDOES_FIRING: &str = "juno pulsar torpedoes firing";
pub const LUCIO_HEALING_SONG: &str = "lucio healing song";
pub const LUCIO_SPEED_SONG: &str = "lucio speed song";
pub const MERCY_RESURRECT: &str = "mercy resurrect";
pub const MERCY_HEAL_BEAM: &str = "mercy heal beam";
pub const MERCY_DAMAGE_BEAM: &str = "mercy damage beam";
pub const ZENYATTA_HARMONY_ORB: &str = "zenyatta harmony orb";
pub const ZENYATTA_DISCORD_ORB: &str = "zenyatta discord orb";

/// Seconds a glide boost pattern plays
pub const GLIDE_BOOST_DURATION: f64 = 4.0;
/// No new glide boost vibe within this many seconds of the last one
pub const GLIDE_BOOST_COOLDOWN: f64 = 1.0;
/// No new resurrect vibe within this many seconds of the last one
pub const RESURRECT_COOLDOWN: f64 = 3.0;

/// Apply every rule for one perception refresh
pub fn apply(config: &Config, snap: &Snapshot, manager: &mut IntensityManager, now: f64) {
    apply_hacked(config, snap, manager, now);
    if manager.has_trigger(HACKED) {
        return;
    }

    apply_events(config, snap, manager, now);

    if config.vibe_for_being_beamed {
        toggle_scalar(
            manager,
            BEING_BEAMED,
            config.being_beamed_vibe_intensity,
            snap.being_beamed,
            now,
        );
    }
    if config.vibe_for_being_orbed {
        toggle_scalar(
            manager,
            BEING_ORBED,
            config.being_orbed_vibe_intensity,
            snap.being_orbed,
            now,
        );
    }

    apply_hero(config, snap, manager, now);
}

fn apply_hacked(config: &Config, snap: &Snapshot, manager: &mut IntensityManager, now: f64) {
    let pattern = match config.hacked_event {
        HackedMode::Ignore => return,
        HackedMode::Silence => Pattern::constant(0.0),
        HackedMode::Pattern => config.hacked_pattern.clone(),
    };

    let active = manager.has_trigger(HACKED);
    if snap.hacked && !active {
        info!("Hacked");
        if config.hacked_clears_active_vibes {
            manager.clear_all();
        }
        manager.add(HACKED, pattern, Lifetime::Permanent, now);
    } else if !snap.hacked && active {
        info!("No longer hacked");
        manager.remove_oldest(HACKED);
    }
}

fn apply_events(config: &Config, snap: &Snapshot, manager: &mut IntensityManager, now: f64) {
    let events = &snap.new_events;
    if config.vibe_for_elim && events.eliminations > 0 {
        manager.add_timed(
            ELIMINATION,
            events.eliminations as f64 * config.elim_vibe_intensity,
            config.elim_vibe_duration,
            now,
        );
    }
    if config.vibe_for_assist && events.assists > 0 {
        manager.add_timed(
            ASSIST,
            events.assists as f64 * config.assist_vibe_intensity,
            config.assist_vibe_duration,
            now,
        );
    }
    // A resurrect shows a save icon too; the resurrect vibe covers it
    if config.vibe_for_save && events.saves > 0 && !snap.abilities.resurrecting {
        manager.add_timed(
            SAVE,
            events.saves as f64 * config.save_vibe_intensity,
            config.save_vibe_duration,
            now,
        );
    }
}

fn apply_hero(config: &Config, snap: &Snapshot, manager: &mut IntensityManager, now: f64) {
    let a = &snap.abilities;
    match snap.hero {
        HeroId::Juno => {
            if config.juno_vibe_for_glide_boost
                && a.glide_boost
                && !manager.created_within(JUNO_GLIDE_BOOST, GLIDE_BOOST_COOLDOWN, now)
            {
                manager.add(
                    JUNO_GLIDE_BOOST,
                    config.juno_glide_boost_pattern.clone(),
                    Lifetime::Timed(GLIDE_BOOST_DURATION),
                    now,
                );
            }
            if config.juno_vibe_for_pulsar_torpedoes {
                manager.toggle_to_condition(
                    JUNO_PULSAR_TORPEDOES,
                    &config.juno_pulsar_torpedoes_pattern,
                    a.pulsar_torpedoes && !a.pulsar_torpedoes_firing,
                    now,
                );
                toggle_scalar(
                    manager,
                    JUNO_PULSAR_TORPEDOES_FIRING,
                    config.juno_pulsar_torpedoes_firing_intensity,
                    a.pulsar_torpedoes_firing,
                    now,
                );
            }
        }
        HeroId::Lucio => {
            if config.lucio_vibe_for_healing_song {
                manager.toggle_to_condition(
                    LUCIO_HEALING_SONG,
                    &config.lucio_healing_song_pattern,
                    a.healing_song,
                    now,
                );
            }
            if config.lucio_vibe_for_speed_song {
                manager.toggle_to_condition(
                    LUCIO_SPEED_SONG,
                    &config.lucio_speed_song_pattern,
                    a.speed_song,
                    now,
                );
            }
        }
        HeroId::Mercy => {
            if config.mercy_vibe_for_resurrect
                && a.resurrecting
                && !manager.created_within(MERCY_RESURRECT, RESURRECT_COOLDOWN, now)
            {
                manager.add_timed(
                    MERCY_RESURRECT,
                    config.mercy_resurrect_vibe_intensity,
                    config.mercy_resurrect_vibe_duration,
                    now,
                );
            }
            if config.mercy_vibe_for_heal_beam {
                toggle_scalar(
                    manager,
                    MERCY_HEAL_BEAM,
                    config.mercy_heal_beam_vibe_intensity,
                    a.heal_beam,
                    now,
                );
            }
            if config.mercy_vibe_for_damage_beam {
                toggle_scalar(
                    manager,
                    MERCY_DAMAGE_BEAM,
                    config.mercy_damage_beam_vibe_intensity,
                    a.damage_beam,
                    now,
                );
            }
        }
        HeroId::Zenyatta => {
            if config.zen_vibe_for_harmony_orb {
                toggle_scalar(
                    manager,
                    ZENYATTA_HARMONY_ORB,
                    config.zen_harmony_orb_vibe_intensity,
                    a.harmony_orb,
                    now,
                );
            }
            if config.zen_vibe_for_discord_orb {
                toggle_scalar(
                    manager,
                    ZENYATTA_DISCORD_ORB,
                    config.zen_discord_orb_vibe_intensity,
                    a.discord_orb,
                    now,
                );
            }
        }
        HeroId::Other | HeroId::Baptiste | HeroId::Brigitte | HeroId::Kiriko => {}
    }
}

fn toggle_scalar(
    manager: &mut IntensityManager,
    trigger: &str,
    intensity: f64,
    condition: bool,
    now: f64,
) {
    manager.toggle_to_condition(trigger, &Pattern::constant(intensity), condition, now);
}

/// Switch to the auto-detected hero when it differs from the played one,
/// dropping every vibe the outgoing hero owned. Returns the new hero.
pub fn follow_detected_hero(
    tracker: &mut StateTracker,
    manager: &mut IntensityManager,
) -> Option<HeroId> {
    let detected = tracker.detected_hero();
    let current = tracker.hero().id();
    if !tracker.hero_auto_detect() || detected == current {
        return None;
    }
    info!("Hero switch detected: {}", detected);
    manager.clear_prefix(&current.trigger_prefix());
    tracker.switch_hero(detected);
    Some(detected)
}
