//! Frames recovered from a capture output directory.

use crate::source::{CaptureError, FrameSource};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use twin_data::{Frame, sort_frames};

/// Optional sidecar listing frames explicitly.
pub const MANIFEST_NAME: &str = "frames.json";

/// Camera id for images whose names carry no camera.
pub const DEFAULT_CAMERA: &str = "default";

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Deserialize, Debug)]
struct ManifestEntry {
    path: PathBuf,
    camera_id: String,
    timestamp: f64,
}

/// A directory of captured images.
///
/// Images named `<camera>_img_<NNNNNN>.<ext>` give camera id and sequence
/// number directly; the timestamp is the sequence number times the capture
/// interval. When a `frames.json` manifest is present it wins.
#[derive(Debug, Clone)]
pub struct DirectoryFrames {
    dir: PathBuf,
    interval: f64,
}

impl DirectoryFrames {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            interval: 1.0,
        }
    }

    /// Seconds between consecutive captures of one camera.
    pub fn with_interval(mut self, seconds: f64) -> Self {
        self.interval = seconds;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_manifest(&self, path: &Path) -> Result<Vec<Frame>, CaptureError> {
        let text = fs::read_to_string(path).map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(&text).map_err(|e| CaptureError::Manifest {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let path = if entry.path.is_absolute() {
                    entry.path
                } else {
                    self.dir.join(entry.path)
                };
                Frame::new(path, entry.camera_id, entry.timestamp)
            })
            .collect())
    }

    fn scan_images(&self) -> Result<Vec<Frame>, CaptureError> {
        let io_err = |source| CaptureError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut images = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && is_image(&path) {
                images.push(path);
            }
        }
        images.sort();

        let mut unnamed = 0u64;
        let frames = images
            .into_iter()
            .map(|path| {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let (camera, sequence) = match parse_frame_name(&stem) {
                    Some((camera, sequence)) => (camera.to_string(), sequence),
                    None => {
                        debug!("No camera in frame name {}, using '{}'", stem, DEFAULT_CAMERA);
                        unnamed += 1;
                        (DEFAULT_CAMERA.to_string(), unnamed - 1)
                    }
                };
                Frame::new(path, camera, sequence as f64 * self.interval)
            })
            .collect();
        Ok(frames)
    }
}

impl FrameSource for DirectoryFrames {
    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }

    #[tracing::instrument(skip_all, fields(dir = %self.dir.display()))]
    fn frames(&self) -> Result<Vec<Frame>, CaptureError> {
        if !self.dir.is_dir() {
            warn!("Frame directory does not exist");
            return Ok(Vec::new());
        }

        let manifest = self.dir.join(MANIFEST_NAME);
        let mut frames = if manifest.is_file() {
            info!("Reading frames from {}", MANIFEST_NAME);
            self.read_manifest(&manifest)?
        } else {
            self.scan_images()?
        };
        sort_frames(&mut frames);

        info!("Found {} frames", frames.len());
        Ok(frames)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Split a `<camera>_img_<NNNNNN>` file stem into camera id and sequence.
pub fn parse_frame_name(stem: &str) -> Option<(&str, u64)> {
    let (camera, sequence) = stem.rsplit_once("_img_")?;
    if camera.is_empty() || sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((camera, sequence.parse().ok()?))
}
