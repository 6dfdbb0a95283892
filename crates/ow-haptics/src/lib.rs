pub mod device;
mod error;
mod manager;
mod memory;
mod vibe;

pub use device::{actuator_level, ActuatorInfo, DeviceInfo, DeviceLink, LinkEvent};
pub use error::{DeviceError, PatternError};
pub use manager::{IntensityManager, ManagerSettings, INTENSITY_DECIMALS};
pub use memory::{Command, MemoryLink};
pub use vibe::{Lifetime, Pattern, Step, Vibe, PERMANENT_STEP};
