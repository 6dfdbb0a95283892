use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device link is not connected")]
    Disconnected,

    #[error("unknown device {0}")]
    UnknownDevice(u32),

    #[error("device {device} rejected command: {reason}")]
    Rejected { device: u32, reason: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum PatternError {
    #[error("pattern has no steps")]
    Empty,

    #[error("step {index} has non-positive duration {duration}")]
    NonPositiveDuration { index: usize, duration: f64 },

    #[error("step {index} has non-finite intensity or duration")]
    NonFinite { index: usize },
}
