//! Core data types for captured frames and reconstructed point clouds.
//!
//! These are the CPU-side values handed from capture to reconstruction to
//! scene assembly. They are immutable once produced.

use glam::Vec3;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// A single captured image with camera identity and capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Image file on disk.
    pub path: PathBuf,
    /// Identifier of the camera that captured the image.
    pub camera_id: String,
    /// Capture time in seconds (relative to the start of capture).
    pub timestamp: f64,
}

impl Frame {
    /// Create a new frame.
    pub fn new(path: impl Into<PathBuf>, camera_id: impl Into<String>, timestamp: f64) -> Self {
        Self {
            path: path.into(),
            camera_id: camera_id.into(),
            timestamp,
        }
    }

    /// Image file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Order frames by capture time, breaking ties by camera id then path.
///
/// Timestamps use a total order so NaN never panics the sort.
pub fn sort_frames(frames: &mut [Frame]) {
    frames.sort_by(capture_order);
}

fn capture_order(a: &Frame, b: &Frame) -> Ordering {
    a.timestamp
        .total_cmp(&b.timestamp)
        .then_with(|| a.camera_id.cmp(&b.camera_id))
        .then_with(|| a.path.cmp(&b.path))
}

/// A reconstructed point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Position in world space.
    pub position: Vec3,
    /// RGB color (linear, 0-1 range), if the reconstruction produced one.
    pub color: Option<Vec3>,
    /// Surface normal, if the reconstruction produced one.
    pub normal: Option<Vec3>,
}

impl Point {
    /// Create an uncolored point with no normal.
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            color: None,
            normal: None,
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_normal(mut self, normal: Vec3) -> Self {
        self.normal = Some(normal);
        self
    }
}

/// An ordered set of reconstructed points.
///
/// An empty cloud means the reconstruction ran and produced nothing; a
/// missing cloud is represented by `Option::None` at the call site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point>,
}

impl PointCloud {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when every point has a normal (and there is at least one point).
    pub fn has_normals(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(|p| p.normal.is_some())
    }

    /// Axis-aligned bounds as (min, max), or `None` for an empty cloud.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.points.first()?.position;
        Some(self.points.iter().fold((first, first), |(min, max), p| {
            (min.min(p.position), max.max(p.position))
        }))
    }
}
