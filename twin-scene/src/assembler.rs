//! Scene assembly from frames and an optional point cloud.

use crate::color::FrameColorSampler;
use crate::graph::{
    CameraData, CameraPose, GraphError, MaterialData, MeshData, PointsData, PrimData, PrimPath,
    SceneGraph, TimeRange, sanitize_name,
};
use glam::Vec3;
use std::collections::HashSet;
use std::f32::consts::TAU;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use twin_data::{Frame, PlyError, PointCloud, asset_reference, sort_frames};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("no frames to build a scene from")]
    NoFrames,

    #[error(transparent)]
    PointCloud(#[from] PlyError),

    #[error("could not build scene graph: {0}")]
    Graph(#[from] GraphError),
}

/// Scene layout parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblerOptions {
    pub scene_name: String,
    pub time_codes_per_second: f64,
    /// Side length of the fallback plane.
    pub plane_size: f32,
    pub point_width: f32,
    /// Omit point and plane geometry entirely.
    pub skip_geometry: bool,
    /// Directory texture references are made relative to.
    pub asset_base: PathBuf,
    pub orbit_radius: f32,
    pub orbit_height: f32,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            scene_name: "twin".to_string(),
            time_codes_per_second: 24.0,
            plane_size: 10.0,
            point_width: 0.01,
            skip_geometry: false,
            asset_base: PathBuf::from("."),
            orbit_radius: 5.0,
            orbit_height: 1.5,
        }
    }
}

impl AssemblerOptions {
    pub fn with_scene_name(mut self, name: impl Into<String>) -> Self {
        self.scene_name = name.into();
        self
    }

    pub fn with_asset_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.asset_base = base.into();
        self
    }

    pub fn with_skip_geometry(mut self, skip: bool) -> Self {
        self.skip_geometry = skip;
        self
    }
}

/// Builds a [`SceneGraph`] from the frame sequence and whatever geometry
/// survived reconstruction.
///
/// A non-empty point cloud becomes a `Points` prim; otherwise a textured
/// plane bound to a material showing the earliest frame is used.
#[derive(Debug, Clone, Default)]
pub struct SceneAssembler {
    options: AssemblerOptions,
}

impl SceneAssembler {
    pub fn new(options: AssemblerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AssemblerOptions {
        &self.options
    }

    #[instrument(skip_all, fields(frames = frames.len(), points = cloud.map(PointCloud::len)))]
    pub fn assemble(
        &self,
        frames: &[Frame],
        cloud: Option<&PointCloud>,
    ) -> Result<SceneGraph, InputError> {
        if frames.is_empty() {
            return Err(InputError::NoFrames);
        }
        let mut frames = frames.to_vec();
        sort_frames(&mut frames);
        let range = TimeRange::new(frames[0].timestamp, frames[frames.len() - 1].timestamp);

        let mut graph = SceneGraph::new(&self.options.scene_name, self.options.time_codes_per_second);
        graph.set_time_range(range);
        let world = PrimPath::root("World")?;
        graph.add_prim(world.clone(), PrimData::World)?;

        let cameras = self.add_cameras(&mut graph, &world, &frames, range)?;

        let geometry = if self.options.skip_geometry {
            info!("Geometry skipped by configuration");
            "none"
        } else {
            match cloud.filter(|c| !c.is_empty()) {
                Some(cloud) => {
                    self.add_points(&mut graph, &world, &frames, cloud)?;
                    "points"
                }
                None => {
                    self.add_plane(&mut graph, &world, &frames[0])?;
                    "plane"
                }
            }
        };

        graph.validate()?;
        info!(
            "Assembled scene '{}': {} cameras, {} prims, geometry={}",
            graph.name(),
            cameras,
            graph.len(),
            geometry
        );
        Ok(graph)
    }

    fn add_cameras(
        &self,
        graph: &mut SceneGraph,
        world: &PrimPath,
        frames: &[Frame],
        range: TimeRange,
    ) -> Result<usize, GraphError> {
        let scope = world.child("Cameras")?;
        graph.add_prim(scope.clone(), PrimData::Scope)?;

        let mut ids: Vec<&str> = Vec::new();
        for frame in frames {
            if !ids.contains(&frame.camera_id.as_str()) {
                ids.push(&frame.camera_id);
            }
        }

        let mut taken = HashSet::new();
        for (index, id) in ids.iter().enumerate() {
            let mut camera = CameraData::new(*id);
            for frame in frames.iter().filter(|f| f.camera_id == *id) {
                let pose = self.orbit_pose(index, ids.len(), range.normalized(frame.timestamp));
                if !camera.add_keyframe(frame.timestamp, pose) {
                    warn!(
                        "Camera '{}' has two frames at t={}; keeping the later",
                        id, frame.timestamp
                    );
                }
            }

            let name = unique_name(&sanitize_name(id), &mut taken);
            debug!("Camera '{}' -> {} ({} keyframes)", id, name, camera.keyframe_count());
            graph.add_prim(scope.child(&name)?, PrimData::Camera(camera))?;
        }
        Ok(ids.len())
    }

    /// Pose on a circle around the origin, looking at it. Cameras start
    /// evenly spaced and sweep one revolution over the capture time range.
    fn orbit_pose(&self, index: usize, count: usize, progress: f64) -> CameraPose {
        let radius = self.options.orbit_radius;
        let height = self.options.orbit_height;
        let angle = TAU * (index as f32 / count.max(1) as f32) + TAU * progress as f32;
        let pitch = -height.atan2(radius).to_degrees();
        CameraPose {
            translate: Vec3::new(radius * angle.sin(), height, radius * angle.cos()),
            rotate: Vec3::new(pitch, angle.to_degrees().rem_euclid(360.0), 0.0),
        }
    }

    fn add_points(
        &self,
        graph: &mut SceneGraph,
        world: &PrimPath,
        frames: &[Frame],
        cloud: &PointCloud,
    ) -> Result<(), GraphError> {
        let count = cloud.len();
        let mut sampler = FrameColorSampler::new(frames);
        let mut sampled = 0;
        let colors = cloud
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.color.unwrap_or_else(|| {
                    sampled += 1;
                    sampler.sample(i, count)
                })
            })
            .collect();
        let normals = cloud
            .has_normals()
            .then(|| cloud.points.iter().filter_map(|p| p.normal).collect());
        if sampled > 0 {
            debug!("Sampled {} of {} point colors from frames", sampled, count);
        }

        let points = PointsData {
            positions: cloud.points.iter().map(|p| p.position).collect(),
            colors,
            normals,
            width: self.options.point_width,
            sampled_colors: sampled,
        };
        graph.add_prim(world.child("PointCloud")?, PrimData::Points(points))
    }

    fn add_plane(
        &self,
        graph: &mut SceneGraph,
        world: &PrimPath,
        first: &Frame,
    ) -> Result<(), GraphError> {
        let materials = world.child("Materials")?;
        let material = materials.child("FrameMaterial")?;
        let texture = asset_reference(first.path(), &self.options.asset_base);
        debug!("Plane texture: {}", texture);

        graph.add_prim(
            world.child("Plane")?,
            PrimData::Mesh(MeshData::plane(self.options.plane_size, Some(material.clone()))),
        )?;
        graph.add_prim(materials, PrimData::Scope)?;
        graph.add_prim(material, PrimData::Material(MaterialData::new(texture)))
    }
}

fn unique_name(base: &str, taken: &mut HashSet<String>) -> String {
    let mut name = base.to_string();
    let mut suffix = 2;
    while !taken.insert(name.clone()) {
        name = format!("{base}_{suffix}");
        suffix += 1;
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PrimKind;
    use twin_data::Point;

    fn frames(camera: &str, count: usize) -> Vec<Frame> {
        (0..count)
            .map(|i| Frame::new(format!("frames/{camera}_img_{i:06}.jpg"), camera, i as f64 * 0.5))
            .collect()
    }

    fn assembler() -> SceneAssembler {
        SceneAssembler::new(AssemblerOptions::default().with_asset_base("."))
    }

    #[test]
    fn test_no_frames_is_input_error() {
        let cloud = PointCloud::new(vec![Point::new(Vec3::ZERO)]);
        for cloud in [None, Some(&cloud)] {
            assert!(matches!(
                assembler().assemble(&[], cloud),
                Err(InputError::NoFrames)
            ));
        }
    }

    #[test]
    fn test_one_camera_per_id_with_keyframe_per_frame() {
        let mut all = frames("front", 3);
        all.extend(frames("back", 2));
        all.extend(frames("side-cam", 1));
        let graph = assembler().assemble(&all, None).unwrap();

        let cameras: Vec<_> = graph
            .prims_of_kind(PrimKind::Camera)
            .map(|p| match p.data() {
                PrimData::Camera(c) => (p.path().to_string(), c.camera_id.clone(), c.keyframe_count()),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(cameras.len(), 3);
        // Order of first appearance after sorting by (timestamp, camera id).
        assert_eq!(cameras[0], ("/World/Cameras/back".to_string(), "back".to_string(), 2));
        assert_eq!(cameras[1], ("/World/Cameras/front".to_string(), "front".to_string(), 3));
        assert_eq!(
            cameras[2],
            ("/World/Cameras/side_cam".to_string(), "side-cam".to_string(), 1)
        );
    }

    #[test]
    fn test_frames_sharing_a_timestamp_are_counted_as_merged() {
        let all = vec![
            Frame::new("lobby_a.jpg", "lobby", 1.0),
            Frame::new("lobby_b.jpg", "lobby", 1.0),
            Frame::new("lobby_c.jpg", "lobby", 2.0),
            Frame::new("door.jpg", "door", 1.0),
        ];
        let graph = assembler().assemble(&all, None).unwrap();
        let keyframes: Vec<_> = graph
            .prims_of_kind(PrimKind::Camera)
            .map(|p| match p.data() {
                PrimData::Camera(c) => (c.camera_id.clone(), c.keyframe_count(), c.merged_frames),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            keyframes,
            vec![("door".to_string(), 1, 0), ("lobby".to_string(), 2, 1)]
        );
        assert_eq!(graph.merged_frames(), 1);
    }

    #[test]
    fn test_colliding_camera_names_are_suffixed() {
        let all = vec![
            Frame::new("a.jpg", "cam-1", 0.0),
            Frame::new("b.jpg", "cam_1", 0.0),
            Frame::new("c.jpg", "cam.1", 0.0),
        ];
        let graph = assembler().assemble(&all, None).unwrap();
        let names: Vec<_> = graph
            .prims_of_kind(PrimKind::Camera)
            .map(|p| p.path().name().to_string())
            .collect();
        assert_eq!(names, vec!["cam_1", "cam_1_2", "cam_1_3"]);
    }

    #[test]
    fn test_empty_cloud_falls_back_to_textured_plane() {
        let mut all = frames("cam", 5);
        all.reverse();
        let empty = PointCloud::default();
        for cloud in [None, Some(&empty)] {
            let graph = assembler().assemble(&all, cloud).unwrap();
            assert_eq!(graph.prims_of_kind(PrimKind::Points).count(), 0);
            assert_eq!(graph.prims_of_kind(PrimKind::Mesh).count(), 1);

            let material = graph.prims_of_kind(PrimKind::Material).next().unwrap();
            assert_eq!(material.path().as_str(), "/World/Materials/FrameMaterial");
            let PrimData::Material(data) = material.data() else {
                panic!("expected material data");
            };
            assert_eq!(data.diffuse_texture, "./frames/cam_img_000000.jpg");
            assert_eq!(data.roughness, 0.4);
            assert_eq!(data.metallic, 0.0);

            let mesh = graph.prims_of_kind(PrimKind::Mesh).next().unwrap();
            let PrimData::Mesh(mesh) = mesh.data() else {
                panic!("expected mesh data");
            };
            assert_eq!(mesh.material.as_ref(), Some(material.path()));
        }
    }

    #[test]
    fn test_point_cloud_keeps_known_colors() {
        let cloud = PointCloud::new(vec![
            Point::new(Vec3::ZERO).with_color(Vec3::X),
            Point::new(Vec3::ONE).with_color(Vec3::Y),
        ]);
        let graph = assembler().assemble(&frames("cam", 2), Some(&cloud)).unwrap();
        assert_eq!(graph.prims_of_kind(PrimKind::Mesh).count(), 0);
        assert_eq!(graph.prims_of_kind(PrimKind::Material).count(), 0);

        let points = graph.prims_of_kind(PrimKind::Points).next().unwrap();
        let PrimData::Points(data) = points.data() else {
            panic!("expected points data");
        };
        assert_eq!(data.colors, vec![Vec3::X, Vec3::Y]);
        assert_eq!(data.sampled_colors, 0);
        assert_eq!(data.normals, None);
        assert_eq!(data.extent(), [Vec3::ZERO, Vec3::ONE]);
    }

    #[test]
    fn test_skip_geometry_omits_points_and_plane() {
        let options = AssemblerOptions::default().with_skip_geometry(true);
        let graph = SceneAssembler::new(options).assemble(&frames("cam", 2), None).unwrap();
        assert_eq!(graph.prims_of_kind(PrimKind::Mesh).count(), 0);
        assert_eq!(graph.prims_of_kind(PrimKind::Points).count(), 0);
        assert_eq!(graph.prims_of_kind(PrimKind::Camera).count(), 1);
    }

    #[test]
    fn test_orbit_looks_at_origin() {
        let pose = assembler().orbit_pose(0, 1, 0.0);
        assert!((pose.translate - Vec3::new(0.0, 1.5, 5.0)).length() < 1e-5);
        assert_eq!(pose.rotate.y, 0.0);
        assert!(pose.rotate.x < 0.0);

        let quarter = assembler().orbit_pose(1, 4, 0.0);
        assert!((quarter.translate - Vec3::new(5.0, 1.5, 0.0)).length() < 1e-4);
        assert!((quarter.rotate.y - 90.0).abs() < 1e-4);
    }
}
