//! Common capture source types and traits.

use std::path::PathBuf;
use thiserror::Error;
use twin_data::Frame;

/// Errors that can occur while collecting frames.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid frame manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },
}

/// Anything that can hand over an ordered set of captured frames.
pub trait FrameSource {
    /// Short description used in logs.
    fn describe(&self) -> String;

    /// All frames available from the source, in capture order.
    fn frames(&self) -> Result<Vec<Frame>, CaptureError>;
}
