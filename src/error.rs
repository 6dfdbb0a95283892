use ow_haptics::DeviceError;
use ow_vision::VisionError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Why a control-loop tick failed
#[derive(Debug, Error)]
pub enum TickError {
    /// The device link dropped. Device effects halt until it comes back.
    #[error("device link error: {0}")]
    Link(#[from] DeviceError),

    /// Capture or matching failed. Ends the session.
    #[error("detection failed: {0:#}")]
    Detection(anyhow::Error),
}

impl TickError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TickError::Detection(_))
    }
}

impl From<VisionError> for TickError {
    fn from(e: VisionError) -> Self {
        TickError::Detection(e.into())
    }
}
