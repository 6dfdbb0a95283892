pub mod error;
pub mod frame;
pub mod matcher;
pub mod ncc;
pub mod template;

pub use error::VisionError;
pub use frame::Frame;
pub use matcher::{Detector, RegionMatcher, DEFAULT_THRESHOLD};
pub use ncc::ScoreMap;
pub use template::{Template, TemplateStore};
