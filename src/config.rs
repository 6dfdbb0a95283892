use crate::error::ConfigError;
use ow_haptics::{ManagerSettings, Pattern};
use ow_state::DebounceConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// What to do while the player is hacked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HackedMode {
    Ignore,
    Silence,
    Pattern,
}

impl TryFrom<u8> for HackedMode {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(HackedMode::Ignore),
            1 => Ok(HackedMode::Silence),
            2 => Ok(HackedMode::Pattern),
            other => Err(format!("HACKED_EVENT must be 0, 1 or 2, got {}", other)),
        }
    }
}

impl From<HackedMode> for u8 {
    fn from(m: HackedMode) -> Self {
        match m {
            HackedMode::Ignore => 0,
            HackedMode::Silence => 1,
            HackedMode::Pattern => 2,
        }
    }
}

/// Settings read once at startup. Every key is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    pub vibe_for_elim: bool,
    pub elim_vibe_intensity: f64,
    pub elim_vibe_duration: f64,
    pub vibe_for_assist: bool,
    pub assist_vibe_intensity: f64,
    pub assist_vibe_duration: f64,
    pub vibe_for_save: bool,
    pub save_vibe_intensity: f64,
    pub save_vibe_duration: f64,

    pub vibe_for_being_beamed: bool,
    pub being_beamed_vibe_intensity: f64,
    pub vibe_for_being_orbed: bool,
    pub being_orbed_vibe_intensity: f64,

    pub hacked_event: HackedMode,
    pub hacked_pattern: Pattern,
    pub hacked_clears_active_vibes: bool,

    pub juno_vibe_for_glide_boost: bool,
    pub juno_glide_boost_pattern: Pattern,
    pub juno_vibe_for_pulsar_torpedoes: bool,
    pub juno_pulsar_torpedoes_pattern: Pattern,
    pub juno_pulsar_torpedoes_firing_intensity: f64,

    pub lucio_vibe_for_healing_song: bool,
    pub lucio_healing_song_pattern: Pattern,
    pub lucio_vibe_for_speed_song: bool,
    pub lucio_speed_song_pattern: Pattern,

    pub mercy_vibe_for_resurrect: bool,
    pub mercy_resurrect_vibe_intensity: f64,
    pub mercy_resurrect_vibe_duration: f64,
    pub mercy_vibe_for_heal_beam: bool,
    pub mercy_heal_beam_vibe_intensity: f64,
    pub mercy_vibe_for_damage_beam: bool,
    pub mercy_damage_beam_vibe_intensity: f64,

    pub zen_vibe_for_harmony_orb: bool,
    pub zen_harmony_orb_vibe_intensity: f64,
    pub zen_vibe_for_discord_orb: bool,
    pub zen_discord_orb_vibe_intensity: f64,

    pub max_vibe_intensity: f64,
    pub scale_all_intensities_by_max_intensity: bool,
    pub excluded_device_names: Vec<String>,
    pub emergency_stop_key_combo: String,
    pub max_refresh_rate: f64,
    pub dead_refresh_rate: f64,
    pub lucio_crossfade_buffer: u32,
    pub mercy_beam_disconnect_buffer: u32,
    pub zen_orb_disconnect_buffer: u32,
    pub juno_ability_buffer: u32,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        let scalars = [
            ("ELIM_VIBE_INTENSITY", self.elim_vibe_intensity),
            ("ELIM_VIBE_DURATION", self.elim_vibe_duration),
            ("ASSIST_VIBE_INTENSITY", self.assist_vibe_intensity),
            ("ASSIST_VIBE_DURATION", self.assist_vibe_duration),
            ("SAVE_VIBE_INTENSITY", self.save_vibe_intensity),
            ("SAVE_VIBE_DURATION", self.save_vibe_duration),
            ("BEING_BEAMED_VIBE_INTENSITY", self.being_beamed_vibe_intensity),
            ("BEING_ORBED_VIBE_INTENSITY", self.being_orbed_vibe_intensity),
            (
                "JUNO_PULSAR_TORPEDOES_FIRING_INTENSITY",
                self.juno_pulsar_torpedoes_firing_intensity,
            ),
            ("MERCY_RESURRECT_VIBE_INTENSITY", self.mercy_resurrect_vibe_intensity),
            ("MERCY_RESURRECT_VIBE_DURATION", self.mercy_resurrect_vibe_duration),
            ("MERCY_HEAL_BEAM_VIBE_INTENSITY", self.mercy_heal_beam_vibe_intensity),
            ("MERCY_DAMAGE_BEAM_VIBE_INTENSITY", self.mercy_damage_beam_vibe_intensity),
            ("ZEN_HARMONY_ORB_VIBE_INTENSITY", self.zen_harmony_orb_vibe_intensity),
            ("ZEN_DISCORD_ORB_VIBE_INTENSITY", self.zen_discord_orb_vibe_intensity),
        ];
        for (key, value) in scalars {
            if !value.is_finite() {
                return Err(invalid(key, format!("{} is not a finite number", value)));
            }
        }
        for (key, value) in [
            ("ELIM_VIBE_DURATION", self.elim_vibe_duration),
            ("ASSIST_VIBE_DURATION", self.assist_vibe_duration),
            ("SAVE_VIBE_DURATION", self.save_vibe_duration),
            ("MERCY_RESURRECT_VIBE_DURATION", self.mercy_resurrect_vibe_duration),
            ("MAX_REFRESH_RATE", self.max_refresh_rate),
            ("DEAD_REFRESH_RATE", self.dead_refresh_rate),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(invalid(key, format!("must be greater than 0, got {}", value)));
            }
        }

        if !self.max_vibe_intensity.is_finite() || self.max_vibe_intensity < 0.0 {
            return Err(invalid(
                "MAX_VIBE_INTENSITY",
                format!("must be in [0, 1], got {}", self.max_vibe_intensity),
            ));
        }
        if self.max_vibe_intensity > 1.0 {
            warn!(
                "MAX_VIBE_INTENSITY {} is above 1, using 1",
                self.max_vibe_intensity
            );
            self.max_vibe_intensity = 1.0;
        }

        for (key, value) in [
            ("LUCIO_CROSSFADE_BUFFER", self.lucio_crossfade_buffer),
            ("MERCY_BEAM_DISCONNECT_BUFFER", self.mercy_beam_disconnect_buffer),
            ("ZEN_ORB_DISCONNECT_BUFFER", self.zen_orb_disconnect_buffer),
            ("JUNO_ABILITY_BUFFER", self.juno_ability_buffer),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be at least 1".to_string()));
            }
        }

        self.emergency_stop_key_combo
            .parse::<KeyCombo>()
            .map_err(|reason| invalid("EMERGENCY_STOP_KEY_COMBO", reason))?;
        Ok(())
    }

    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig {
            mercy_beam: self.mercy_beam_disconnect_buffer,
            zenyatta_orb: self.zen_orb_disconnect_buffer,
            lucio_crossfade: self.lucio_crossfade_buffer,
            juno_ability: self.juno_ability_buffer,
        }
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            max_intensity: self.max_vibe_intensity,
            scale_by_max: self.scale_all_intensities_by_max_intensity,
            excluded_devices: self.excluded_device_names.clone(),
        }
    }

    /// The validated emergency-stop combination
    pub fn key_combo(&self) -> Option<KeyCombo> {
        self.emergency_stop_key_combo.parse().ok()
    }
}

fn invalid(key: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { key, reason }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Cmd,
}

const NAMED_KEYS: &[&str] = &[
    "esc", "space", "enter", "tab", "backspace", "delete", "insert", "home", "end",
    "page_up", "page_down", "up", "down", "left", "right", "pause",
];

/// A key combination such as `<ctrl>+<shift>+x`.
///
/// Modifiers and named keys are written in angle brackets; a plain key is a
/// single character. Exactly one non-modifier key is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    pub modifiers: Vec<Modifier>,
    pub key: String,
}

impl FromStr for KeyCombo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut modifiers = Vec::new();
        let mut key = None;
        for part in s.split('+').map(str::trim) {
            let token = if let Some(name) = part.strip_prefix('<').and_then(|p| p.strip_suffix('>')) {
                let name = name.to_ascii_lowercase();
                let modifier = match name.as_str() {
                    "ctrl" | "ctrl_l" | "ctrl_r" => Some(Modifier::Ctrl),
                    "shift" | "shift_l" | "shift_r" => Some(Modifier::Shift),
                    "alt" | "alt_l" | "alt_r" | "alt_gr" => Some(Modifier::Alt),
                    "cmd" | "cmd_l" | "cmd_r" => Some(Modifier::Cmd),
                    _ => None,
                };
                if let Some(m) = modifier {
                    if !modifiers.contains(&m) {
                        modifiers.push(m);
                    }
                    continue;
                }
                if !is_named_key(&name) {
                    return Err(format!("unknown key <{}>", name));
                }
                name
            } else if part.chars().count() == 1 {
                part.to_ascii_lowercase()
            } else {
                return Err(format!(
                    "'{}' is neither a single character nor an <angle-bracketed> key",
                    part
                ));
            };
            if key.replace(token).is_some() {
                return Err(format!("'{}' has more than one non-modifier key", s));
            }
        }

        let key = key.ok_or_else(|| format!("'{}' has no non-modifier key", s))?;
        modifiers.sort();
        Ok(KeyCombo { modifiers, key })
    }
}

fn is_named_key(name: &str) -> bool {
    if NAMED_KEYS.contains(&name) {
        return true;
    }
    name.strip_prefix('f')
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=24).contains(&n))
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            let name = match m {
                Modifier::Ctrl => "ctrl",
                Modifier::Shift => "shift",
                Modifier::Alt => "alt",
                Modifier::Cmd => "cmd",
            };
            write!(f, "<{}>+", name)?;
        }
        if self.key.chars().count() == 1 {
            f.write_str(&self.key)
        } else {
            write!(f, "<{}>", self.key)
        }
    }
}
