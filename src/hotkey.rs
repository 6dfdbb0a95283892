//! Global emergency-stop hotkey.
//!
//! `HotkeyMatcher` is fed press/release events and reports when the
//! configured combination becomes fully held. The OS listener (feature
//! `hotkey`, backed by `rdev`) only translates events and raises the flag.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{KeyCombo, Modifier};

/// A key as the matcher sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    Modifier(Modifier),
    /// Lowercase character or named key, spelled as in `KeyCombo`
    Key(String),
}

/// Tracks held keys and fires once each time the combination completes
#[derive(Debug, Clone)]
pub struct HotkeyMatcher {
    combo: KeyCombo,
    modifiers: BTreeSet<Modifier>,
    keys: BTreeSet<String>,
}

impl HotkeyMatcher {
    pub fn new(combo: KeyCombo) -> Self {
        Self {
            combo,
            modifiers: BTreeSet::new(),
            keys: BTreeSet::new(),
        }
    }

    /// Returns true when this press completes the combination.
    /// Auto-repeat of an already held key never fires again.
    pub fn press(&mut self, input: KeyInput) -> bool {
        let fresh = match input {
            KeyInput::Modifier(m) => self.modifiers.insert(m),
            KeyInput::Key(k) => self.keys.insert(k),
        };
        fresh && self.is_held()
    }

    pub fn release(&mut self, input: &KeyInput) {
        match input {
            KeyInput::Modifier(m) => {
                self.modifiers.remove(m);
            }
            KeyInput::Key(k) => {
                self.keys.remove(k);
            }
        }
    }

    fn is_held(&self) -> bool {
        self.keys.len() == 1
            && self.keys.contains(&self.combo.key)
            && self.modifiers.iter().eq(self.combo.modifiers.iter())
    }
}

/// Feed one event to the matcher; raise `estop` on a match
pub fn handle_event(matcher: &mut HotkeyMatcher, input: KeyInput, pressed: bool, estop: &AtomicBool) {
    if !pressed {
        matcher.release(&input);
        return;
    }
    if matcher.press(input) {
        warn!("Emergency stop hotkey pressed");
        estop.store(true, Ordering::SeqCst);
    }
}

#[cfg(feature = "hotkey")]
fn translate(key: rdev::Key) -> Option<KeyInput> {
    use rdev::Key;

    let named = |s: &str| Some(KeyInput::Key(s.to_string()));
    match key {
        Key::ControlLeft | Key::ControlRight => Some(KeyInput::Modifier(Modifier::Ctrl)),
        Key::ShiftLeft | Key::ShiftRight => Some(KeyInput::Modifier(Modifier::Shift)),
        Key::Alt | Key::AltGr => Some(KeyInput::Modifier(Modifier::Alt)),
        Key::MetaLeft | Key::MetaRight => Some(KeyInput::Modifier(Modifier::Cmd)),
        Key::Escape => named("esc"),
        Key::Space => named("space"),
        Key::Return | Key::KpReturn => named("enter"),
        Key::Tab => named("tab"),
        Key::Backspace => named("backspace"),
        Key::Delete => named("delete"),
        Key::Insert => named("insert"),
        Key::Home => named("home"),
        Key::End => named("end"),
        Key::PageUp => named("page_up"),
        Key::PageDown => named("page_down"),
        Key::UpArrow => named("up"),
        Key::DownArrow => named("down"),
        Key::LeftArrow => named("left"),
        Key::RightArrow => named("right"),
        Key::Pause => named("pause"),
        Key::F1 => named("f1"),
        Key::F2 => named("f2"),
        Key::F3 => named("f3"),
        Key::F4 => named("f4"),
        Key::F5 => named("f5"),
        Key::F6 => named("f6"),
        Key::F7 => named("f7"),
        Key::F8 => named("f8"),
        Key::F9 => named("f9"),
        Key::F10 => named("f10"),
        Key::F11 => named("f11"),
        Key::F12 => named("f12"),
        Key::Num0 => named("0"),
        Key::Num1 => named("1"),
        Key::Num2 => named("2"),
        Key::Num3 => named("3"),
        Key::Num4 => named("4"),
        Key::Num5 => named("5"),
        Key::Num6 => named("6"),
        Key::Num7 => named("7"),
        Key::Num8 => named("8"),
        Key::Num9 => named("9"),
        Key::Minus => named("-"),
        Key::Equal => named("="),
        Key::LeftBracket => named("["),
        Key::RightBracket => named("]"),
        Key::SemiColon => named(";"),
        Key::Quote => named("'"),
        Key::BackSlash => named("\\"),
        Key::BackQuote => named("`"),
        Key::Comma => named(","),
        Key::Dot => named("."),
        Key::Slash => named("/"),
        other => {
            // KeyA..KeyZ
            let name = format!("{:?}", other);
            let letter = name.strip_prefix("Key").filter(|l| l.len() == 1)?;
            Some(KeyInput::Key(letter.to_ascii_lowercase()))
        }
    }
}

/// Listen for the combination on a dedicated OS thread for the life of the
/// process.
#[cfg(feature = "hotkey")]
pub fn spawn_listener(combo: KeyCombo, estop: Arc<AtomicBool>) {
    info!("Emergency stop hotkey: {}", combo);
    let mut matcher = HotkeyMatcher::new(combo);
    std::thread::spawn(move || {
        let result = rdev::listen(move |event| {
            let (key, pressed) = match event.event_type {
                rdev::EventType::KeyPress(k) => (k, true),
                rdev::EventType::KeyRelease(k) => (k, false),
                _ => return,
            };
            if let Some(input) = translate(key) {
                handle_event(&mut matcher, input, pressed, &estop);
            }
        });
        if let Err(e) = result {
            warn!("Emergency stop hotkey unavailable: {:?}", e);
        }
    });
}

#[cfg(not(feature = "hotkey"))]
pub fn spawn_listener(combo: KeyCombo, _estop: Arc<AtomicBool>) {
    warn!(
        "Built without the `hotkey` feature; {} is not bound. Use Ctrl-C or 'estop'.",
        combo
    );
    info!("Rebuild with --features hotkey to bind it");
}
