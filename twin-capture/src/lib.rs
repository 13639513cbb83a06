//! Twin Capture - the boundary with the frame capture collaborator
//!
//! Network camera discovery and stream grabbing happen elsewhere; what this
//! crate sees is a directory of still images they left behind. It recovers
//! `(path, camera_id, timestamp)` for each image and hands back the frames in
//! capture order.
//!
//! ## Example
//!
//! ```ignore
//! use twin_capture::{DirectoryFrames, FrameSource};
//!
//! let frames = DirectoryFrames::new("./images").with_interval(0.5).frames()?;
//! ```

mod directory;
mod source;

pub use directory::{DEFAULT_CAMERA, DirectoryFrames, MANIFEST_NAME, parse_frame_name};
pub use source::{CaptureError, FrameSource};

// Re-export the frame type for convenience
pub use twin_data::Frame;
