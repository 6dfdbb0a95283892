mod auto_detect;
mod debounce;
mod events;
pub mod hero;
#[cfg(test)]
mod testing;
mod tracker;

pub use auto_detect::HeroAutoDetector;
pub use debounce::DebouncedSignal;
pub use events::{EventBuffer, EventKind, MAX_NOTIFICATIONS, NOTIFICATION_LIFETIME};
pub use hero::{AbilityFlags, DebounceConfig, Hero};
pub use tracker::{NewEvents, Snapshot, StateTracker};
