//! Scene graph built by the assembler and read by the emitters.
//!
//! The graph is a rooted tree of prims stored in construction order. Each
//! prim carries the data for its kind; emitters walk the tree from the root
//! and visit children in the order they were added, so declaration order in
//! the output matches construction order here.

use glam::{Vec2, Vec3};
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Name of the shader prims every material expands into.
pub const SURFACE_SHADER: &str = "PBRShader";
pub const ST_READER: &str = "stReader";
pub const TEXTURE_SHADER: &str = "DiffuseTexture";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("invalid prim name '{0}'")]
    InvalidName(String),

    #[error("prim {0} already exists")]
    DuplicatePath(PrimPath),

    #[error("parent of {0} does not exist")]
    MissingParent(PrimPath),

    #[error("scene graph has no World root")]
    MissingRoot,

    #[error("camera {0} has no keyframes")]
    EmptyCamera(PrimPath),

    #[error("points prim {0} has no points")]
    EmptyPoints(PrimPath),

    #[error("{path}: {name} has {found} entries, expected {expected}")]
    PrimvarLength {
        path: PrimPath,
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("mesh {mesh} is bound to {target}, which is not a material")]
    UnboundMaterial { mesh: PrimPath, target: PrimPath },

    #[error("scene holds both point and mesh geometry")]
    ConflictingGeometry,
}

/// Absolute, slash-delimited prim path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimPath(String);

impl PrimPath {
    pub fn root(name: &str) -> Result<Self, GraphError> {
        if !is_valid_name(name) {
            return Err(GraphError::InvalidName(name.to_string()));
        }
        Ok(Self(format!("/{name}")))
    }

    pub fn child(&self, name: &str) -> Result<Self, GraphError> {
        if !is_valid_name(name) {
            return Err(GraphError::InvalidName(name.to_string()));
        }
        Ok(Self(format!("{}/{}", self.0, name)))
    }

    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn parent(&self) -> Option<PrimPath> {
        let (parent, _) = self.0.rsplit_once('/')?;
        (!parent.is_empty()).then(|| PrimPath(parent.to_string()))
    }

    /// `/a/b.prop`
    pub fn property(&self, name: &str) -> String {
        format!("{}.{}", self.0, name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Turn an arbitrary label (such as a camera id) into a valid prim name.
pub fn sanitize_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimKind {
    World,
    Scope,
    Camera,
    Points,
    Mesh,
    Material,
}

impl PrimKind {
    /// Schema type written for this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            PrimKind::World => "Xform",
            PrimKind::Scope => "Scope",
            PrimKind::Camera => "Camera",
            PrimKind::Points => "Points",
            PrimKind::Mesh => "Mesh",
            PrimKind::Material => "Material",
        }
    }
}

/// Inclusive time range in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Position of `time` within the range, in `[0, 1]`. Zero for an empty range.
    pub fn normalized(&self, time: f64) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            0.0
        } else {
            ((time - self.start) / duration).clamp(0.0, 1.0)
        }
    }
}

/// Camera transform at one keyframe. Rotation is XYZ Euler degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub translate: Vec3,
    pub rotate: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lens {
    pub focal_length: f32,
    pub horizontal_aperture: f32,
    pub vertical_aperture: f32,
}

impl Default for Lens {
    fn default() -> Self {
        Self {
            focal_length: 35.0,
            horizontal_aperture: 36.0,
            vertical_aperture: 24.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraData {
    pub camera_id: String,
    pub lens: Lens,
    /// Poses keyed by frame timestamp in seconds.
    pub keyframes: BTreeMap<OrderedFloat<f64>, CameraPose>,
    /// Frames that landed on an existing keyframe time and replaced it.
    pub merged_frames: usize,
}

impl CameraData {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            lens: Lens::default(),
            keyframes: BTreeMap::new(),
            merged_frames: 0,
        }
    }

    /// Returns `false` when a keyframe already existed at `time`; the new
    /// pose replaces it and the frame is counted as merged.
    pub fn add_keyframe(&mut self, time: f64, pose: CameraPose) -> bool {
        let fresh = self.keyframes.insert(OrderedFloat(time), pose).is_none();
        if !fresh {
            self.merged_frames += 1;
        }
        fresh
    }

    pub fn keyframe_count(&self) -> usize {
        self.keyframes.len()
    }

    /// A single keyframe is written as plain values rather than samples.
    pub fn is_static(&self) -> bool {
        self.keyframes.len() == 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointsData {
    pub positions: Vec<Vec3>,
    /// One color per point.
    pub colors: Vec<Vec3>,
    /// Present only when every point carries a normal.
    pub normals: Option<Vec<Vec3>>,
    pub width: f32,
    /// How many colors were sampled from frames rather than read from the cloud.
    pub sampled_colors: usize,
}

impl PointsData {
    pub fn extent(&self) -> [Vec3; 2] {
        bounds(&self.positions)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub points: Vec<Vec3>,
    pub face_vertex_counts: Vec<i32>,
    pub face_vertex_indices: Vec<i32>,
    pub normals: Vec<Vec3>,
    pub st: Vec<Vec2>,
    pub material: Option<PrimPath>,
}

impl MeshData {
    /// A single upward-facing quad of side `size` centered on the origin in
    /// the XZ plane.
    pub fn plane(size: f32, material: Option<PrimPath>) -> Self {
        let h = size * 0.5;
        Self {
            points: vec![
                Vec3::new(-h, 0.0, h),
                Vec3::new(h, 0.0, h),
                Vec3::new(h, 0.0, -h),
                Vec3::new(-h, 0.0, -h),
            ],
            face_vertex_counts: vec![4],
            face_vertex_indices: vec![0, 1, 2, 3],
            normals: vec![Vec3::Y; 4],
            st: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
            material,
        }
    }

    pub fn extent(&self) -> [Vec3; 2] {
        bounds(&self.points)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    /// Asset path of the diffuse texture, relative to the scene file.
    pub diffuse_texture: String,
    pub roughness: f32,
    pub metallic: f32,
}

impl MaterialData {
    pub fn new(diffuse_texture: impl Into<String>) -> Self {
        Self {
            diffuse_texture: diffuse_texture.into(),
            roughness: 0.4,
            metallic: 0.0,
        }
    }
}

/// Shader prims under a material, shared by both emitters.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialNetwork {
    pub surface: PrimPath,
    pub st_reader: PrimPath,
    pub texture: PrimPath,
}

impl MaterialNetwork {
    pub fn for_material(material: &PrimPath) -> Result<Self, GraphError> {
        Ok(Self {
            surface: material.child(SURFACE_SHADER)?,
            st_reader: material.child(ST_READER)?,
            texture: material.child(TEXTURE_SHADER)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrimData {
    World,
    Scope,
    Camera(CameraData),
    Points(PointsData),
    Mesh(MeshData),
    Material(MaterialData),
}

impl PrimData {
    pub fn kind(&self) -> PrimKind {
        match self {
            PrimData::World => PrimKind::World,
            PrimData::Scope => PrimKind::Scope,
            PrimData::Camera(_) => PrimKind::Camera,
            PrimData::Points(_) => PrimKind::Points,
            PrimData::Mesh(_) => PrimKind::Mesh,
            PrimData::Material(_) => PrimKind::Material,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prim {
    path: PrimPath,
    data: PrimData,
    children: Vec<PrimPath>,
}

impl Prim {
    pub fn path(&self) -> &PrimPath {
        &self.path
    }

    pub fn data(&self) -> &PrimData {
        &self.data
    }

    pub fn kind(&self) -> PrimKind {
        self.data.kind()
    }

    pub fn children(&self) -> &[PrimPath] {
        &self.children
    }
}

/// The assembled scene for one pipeline run.
#[derive(Debug, Clone)]
pub struct SceneGraph {
    name: String,
    time_codes_per_second: f64,
    time_range: Option<TimeRange>,
    prims: Vec<Prim>,
    index: HashMap<PrimPath, usize>,
}

impl SceneGraph {
    pub fn new(name: impl Into<String>, time_codes_per_second: f64) -> Self {
        Self {
            name: name.into(),
            time_codes_per_second,
            time_range: None,
            prims: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a prim below an existing parent (or as the root).
    pub fn add_prim(&mut self, path: PrimPath, data: PrimData) -> Result<(), GraphError> {
        if self.index.contains_key(&path) {
            return Err(GraphError::DuplicatePath(path));
        }
        if let Some(parent) = path.parent() {
            let &parent_index = self
                .index
                .get(&parent)
                .ok_or_else(|| GraphError::MissingParent(path.clone()))?;
            self.prims[parent_index].children.push(path.clone());
        }
        self.index.insert(path.clone(), self.prims.len());
        self.prims.push(Prim {
            path,
            data,
            children: Vec::new(),
        });
        Ok(())
    }

    pub fn set_time_range(&mut self, range: TimeRange) {
        self.time_range = Some(range);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time_codes_per_second(&self) -> f64 {
        self.time_codes_per_second
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    /// Convert a timestamp in seconds to a time code.
    pub fn time_code(&self, seconds: f64) -> f64 {
        seconds * self.time_codes_per_second
    }

    pub fn prim(&self, path: &PrimPath) -> Option<&Prim> {
        self.index.get(path).map(|&i| &self.prims[i])
    }

    /// Prims in construction order.
    pub fn prims(&self) -> &[Prim] {
        &self.prims
    }

    pub fn root(&self) -> Option<&Prim> {
        self.prims.first().filter(|p| p.path.parent().is_none())
    }

    pub fn prims_of_kind(&self, kind: PrimKind) -> impl Iterator<Item = &Prim> {
        self.prims.iter().filter(move |p| p.kind() == kind)
    }

    /// Frames folded into another frame's keyframe, over all cameras.
    pub fn merged_frames(&self) -> usize {
        self.prims
            .iter()
            .map(|p| match p.data() {
                PrimData::Camera(camera) => camera.merged_frames,
                _ => 0,
            })
            .sum()
    }

    pub fn len(&self) -> usize {
        self.prims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prims.is_empty()
    }

    /// Check the structural rules the emitters rely on.
    pub fn validate(&self) -> Result<(), GraphError> {
        let root = self.root().ok_or(GraphError::MissingRoot)?;
        if root.kind() != PrimKind::World || self.prims.iter().skip(1).any(|p| p.path.parent().is_none()) {
            return Err(GraphError::MissingRoot);
        }

        let has_points = self.prims_of_kind(PrimKind::Points).next().is_some();
        let has_mesh = self.prims_of_kind(PrimKind::Mesh).next().is_some();
        if has_points && has_mesh {
            return Err(GraphError::ConflictingGeometry);
        }

        for prim in &self.prims {
            match &prim.data {
                PrimData::Camera(camera) if camera.keyframes.is_empty() => {
                    return Err(GraphError::EmptyCamera(prim.path.clone()));
                }
                PrimData::Points(points) => self.validate_points(&prim.path, points)?,
                PrimData::Mesh(mesh) => {
                    if let Some(target) = &mesh.material {
                        let bound = self
                            .prim(target)
                            .is_some_and(|p| p.kind() == PrimKind::Material);
                        if !bound {
                            return Err(GraphError::UnboundMaterial {
                                mesh: prim.path.clone(),
                                target: target.clone(),
                            });
                        }
                    }
                }
                PrimData::Material(_) => {
                    let network = MaterialNetwork::for_material(&prim.path)?;
                    for shader in [network.surface, network.st_reader, network.texture] {
                        if self.index.contains_key(&shader) {
                            return Err(GraphError::DuplicatePath(shader));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn validate_points(&self, path: &PrimPath, points: &PointsData) -> Result<(), GraphError> {
        let expected = points.positions.len();
        if expected == 0 {
            return Err(GraphError::EmptyPoints(path.clone()));
        }
        let check = |name: &'static str, found: usize| {
            if found == expected {
                Ok(())
            } else {
                Err(GraphError::PrimvarLength {
                    path: path.clone(),
                    name,
                    expected,
                    found,
                })
            }
        };
        check("displayColor", points.colors.len())?;
        if let Some(normals) = &points.normals {
            check("normals", normals.len())?;
        }
        Ok(())
    }
}

fn bounds(points: &[Vec3]) -> [Vec3; 2] {
    let mut iter = points.iter().copied();
    let Some(first) = iter.next() else {
        return [Vec3::ZERO, Vec3::ZERO];
    };
    iter.fold([first, first], |[min, max], p| [min.min(p), max.max(p)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> (SceneGraph, PrimPath) {
        let mut graph = SceneGraph::new("test", 24.0);
        let world = PrimPath::root("World").unwrap();
        graph.add_prim(world.clone(), PrimData::World).unwrap();
        (graph, world)
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("front"), "front");
        assert_eq!(sanitize_name("cam-01"), "cam_01");
        assert_eq!(sanitize_name("0front"), "_0front");
        assert_eq!(sanitize_name(""), "_");
        assert!(is_valid_name(&sanitize_name("rtsp://10.0.0.2/stream")));
    }

    #[test]
    fn test_children_keep_construction_order() {
        let (mut graph, world) = world();
        for name in ["Cameras", "Materials", "Alpha"] {
            graph.add_prim(world.child(name).unwrap(), PrimData::Scope).unwrap();
        }
        let names: Vec<_> = graph
            .root()
            .unwrap()
            .children()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["Cameras", "Materials", "Alpha"]);

        let err = graph.add_prim(world.child("Alpha").unwrap(), PrimData::Scope).unwrap_err();
        assert!(matches!(err, GraphError::DuplicatePath(_)));
        let orphan = world.child("Missing").unwrap().child("Leaf").unwrap();
        assert!(matches!(
            graph.add_prim(orphan, PrimData::Scope),
            Err(GraphError::MissingParent(_))
        ));
    }

    #[test]
    fn test_validate_rejects_camera_without_keyframes() {
        let (mut graph, world) = world();
        graph
            .add_prim(world.child("cam").unwrap(), PrimData::Camera(CameraData::new("cam")))
            .unwrap();
        assert!(matches!(graph.validate(), Err(GraphError::EmptyCamera(_))));
    }

    #[test]
    fn test_validate_checks_material_binding() {
        let (mut graph, world) = world();
        let missing = world.child("Mat").unwrap();
        graph
            .add_prim(
                world.child("Plane").unwrap(),
                PrimData::Mesh(MeshData::plane(10.0, Some(missing))),
            )
            .unwrap();
        assert!(matches!(
            graph.validate(),
            Err(GraphError::UnboundMaterial { .. })
        ));
    }

    #[test]
    fn test_validate_primvar_lengths() {
        let (mut graph, world) = world();
        let points = PointsData {
            positions: vec![Vec3::ZERO, Vec3::ONE],
            colors: vec![Vec3::ONE],
            normals: None,
            width: 0.01,
            sampled_colors: 0,
        };
        graph
            .add_prim(world.child("PointCloud").unwrap(), PrimData::Points(points))
            .unwrap();
        assert!(matches!(
            graph.validate(),
            Err(GraphError::PrimvarLength { name: "displayColor", .. })
        ));
    }

    #[test]
    fn test_plane_faces_up() {
        let plane = MeshData::plane(10.0, None);
        let [a, b, c] = [plane.points[0], plane.points[1], plane.points[2]];
        assert!((b - a).cross(c - a).y > 0.0);
        assert_eq!(plane.extent(), [Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 0.0, 5.0)]);
    }

    #[test]
    fn test_time_range_normalized() {
        let range = TimeRange::new(2.0, 4.0);
        assert_eq!(range.normalized(3.0), 0.5);
        assert_eq!(range.normalized(10.0), 1.0);
        assert_eq!(TimeRange::new(1.0, 1.0).normalized(1.0), 0.0);
    }
}
