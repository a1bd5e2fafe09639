use simple_error::SimpleError;
use thiserror::Error;

/// Camera could not be acquired: device missing, permission denied, or no
/// usable capture mode.
#[derive(Debug, Error)]
pub enum CameraAccessError {
    #[error("failed to open camera {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no usable capture mode on camera {device}: {source}")]
    Negotiate {
        device: String,
        #[source]
        source: SimpleError,
    },
    #[error("failed to start camera {device}: {reason}")]
    Start { device: String, reason: String },
    #[error("camera opener task failed: {0}")]
    Join(String),
}
