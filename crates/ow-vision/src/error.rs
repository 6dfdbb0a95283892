use std::path::PathBuf;
use thiserror::Error;

/// Failures of the template-matching backend.
///
/// Template errors surface while loading at startup; the rest can only
/// happen mid-session and end it.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("missing template '{name}' (expected {})", path.display())]
    MissingTemplate { name: String, path: PathBuf },

    #[error("malformed template '{name}': {reason}")]
    MalformedTemplate { name: String, reason: String },

    #[error("no region named '{0}'")]
    UnknownRegion(String),

    #[error("template '{name}' ({template_size:?}) does not fit its region ({region_size:?})")]
    TemplateTooLarge {
        name: String,
        template_size: (u32, u32),
        region_size: (u32, u32),
    },

    #[error("no frame has been captured yet")]
    NoFrame,
}
