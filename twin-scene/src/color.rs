//! Representative colors for points the reconstruction left uncolored.
//!
//! Point `i` of `n` is assigned a pseudo-time spread evenly over the frame
//! time range; the frame nearest that time supplies the color of its center
//! pixel. Each image is decoded at most once per sampler.

use glam::Vec3;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use twin_data::Frame;

/// Used when a frame image cannot be decoded.
pub(crate) const NEUTRAL_GRAY: Vec3 = Vec3::splat(0.5);

pub(crate) struct FrameColorSampler<'a> {
    /// Sorted by timestamp.
    frames: &'a [Frame],
    cache: HashMap<PathBuf, Vec3>,
}

impl<'a> FrameColorSampler<'a> {
    pub(crate) fn new(frames: &'a [Frame]) -> Self {
        Self {
            frames,
            cache: HashMap::new(),
        }
    }

    /// Color for point `index` out of `count`.
    pub(crate) fn sample(&mut self, index: usize, count: usize) -> Vec3 {
        let Some(frame) = self.nearest_frame(self.pseudo_time(index, count)) else {
            return NEUTRAL_GRAY;
        };
        let path = frame.path().to_path_buf();
        self.center_color(&path)
    }

    fn pseudo_time(&self, index: usize, count: usize) -> f64 {
        let (Some(first), Some(last)) = (self.frames.first(), self.frames.last()) else {
            return 0.0;
        };
        if count <= 1 {
            return first.timestamp;
        }
        let t = index as f64 / (count - 1) as f64;
        first.timestamp + (last.timestamp - first.timestamp) * t
    }

    // Ties go to the earlier frame.
    fn nearest_frame(&self, time: f64) -> Option<&'a Frame> {
        let frames = self.frames;
        frames.iter().fold(None, |best: Option<&'a Frame>, frame| match best {
            Some(b) if (b.timestamp - time).abs() <= (frame.timestamp - time).abs() => Some(b),
            _ => Some(frame),
        })
    }

    fn center_color(&mut self, path: &Path) -> Vec3 {
        if let Some(color) = self.cache.get(path) {
            return *color;
        }
        let color = match image::open(path) {
            Ok(img) => {
                let rgb = img.to_rgb8();
                let (width, height) = rgb.dimensions();
                if width == 0 || height == 0 {
                    NEUTRAL_GRAY
                } else {
                    let [r, g, b] = rgb.get_pixel(width / 2, height / 2).0;
                    Vec3::new(r as f32, g as f32, b as f32) / 255.0
                }
            }
            Err(e) => {
                warn!("Could not decode {} for point colors: {}", path.display(), e);
                NEUTRAL_GRAY
            }
        };
        debug!("Center color of {}: {:?}", path.display(), color);
        self.cache.insert(path.to_path_buf(), color);
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_frame(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        let mut img = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        img.put_pixel(2, 2, Rgb(color));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_samples_center_of_nearest_frame() {
        let dir = tempfile::tempdir().unwrap();
        let red = write_frame(dir.path(), "a.png", [255, 0, 0]);
        let blue = write_frame(dir.path(), "b.png", [0, 0, 255]);
        let frames = vec![Frame::new(red, "cam", 0.0), Frame::new(blue, "cam", 1.0)];

        let mut sampler = FrameColorSampler::new(&frames);
        assert_eq!(sampler.sample(0, 3), Vec3::new(1.0, 0.0, 0.0));
        // Midpoint ties resolve to the earlier frame.
        assert_eq!(sampler.sample(1, 3), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(sampler.sample(2, 3), Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(sampler.cache.len(), 2);
    }

    #[test]
    fn test_undecodable_frame_is_gray() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        let frames = vec![Frame::new(path, "cam", 0.0)];

        let mut sampler = FrameColorSampler::new(&frames);
        assert_eq!(sampler.sample(0, 1), NEUTRAL_GRAY);
    }
}
