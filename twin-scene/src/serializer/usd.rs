//! Emission through the structured `twin-usd` stage API.

use super::{EmitterKind, SceneEmitter, SerializationError, scene_doc};
use crate::graph::{
    CameraData, CameraPose, MaterialData, MaterialNetwork, MeshData, PointsData, Prim, PrimData,
    PrimPath, SceneGraph,
};
use glam::Vec3;
use tracing::debug;
use twin_usd::{
    Attribute, Interpolation, PrimSpec, SdfPath, Stage, UpAxis, UsdError, Value, ValueType,
    Variability,
};

/// Builds a typed [`Stage`] from the graph and exports it.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsdStageEmitter;

impl SceneEmitter for UsdStageEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::Library
    }

    fn render(&self, graph: &SceneGraph) -> Result<String, SerializationError> {
        graph.validate()?;
        let stage = build_stage(graph)?;
        Ok(stage.export_to_string()?)
    }
}

/// Translate the scene graph into a stage, prim for prim in construction
/// order.
pub fn build_stage(graph: &SceneGraph) -> Result<Stage, UsdError> {
    let mut stage = Stage::new();
    if let Some(root) = graph.root() {
        stage.set_default_prim(root.path().name());
    }
    stage.set_doc(&scene_doc(graph));
    stage.set_up_axis(UpAxis::Y);
    stage.set_meters_per_unit(1.0);
    stage.set_time_codes_per_second(graph.time_codes_per_second());
    if let Some(range) = graph.time_range() {
        stage.set_time_code_range(graph.time_code(range.start), graph.time_code(range.end));
    }

    for prim in graph.prims() {
        define(&mut stage, graph, prim)?;
    }
    debug!("Built stage with {} prims", stage.prim_paths().len());
    Ok(stage)
}

fn sdf(path: &PrimPath) -> Result<SdfPath, UsdError> {
    SdfPath::new(path.as_str())
}

fn attr<'a>(
    prim: &'a mut PrimSpec,
    name: &str,
    value_type: ValueType,
    value: Value,
) -> Result<&'a mut Attribute, UsdError> {
    prim.create_attribute(name, value_type, Variability::Varying)?
        .set(value)
}

fn uniform(
    prim: &mut PrimSpec,
    name: &str,
    value_type: ValueType,
    value: Value,
) -> Result<(), UsdError> {
    prim.create_attribute(name, value_type, Variability::Uniform)?
        .set(value)?;
    Ok(())
}

fn declare<'a>(
    prim: &'a mut PrimSpec,
    name: &str,
    value_type: ValueType,
) -> Result<&'a mut Attribute, UsdError> {
    prim.create_attribute(name, value_type, Variability::Varying)
}

fn define(stage: &mut Stage, graph: &SceneGraph, prim: &Prim) -> Result<(), UsdError> {
    let path = sdf(prim.path())?;
    let spec = stage.define_prim(&path, prim.kind().type_name())?;
    match prim.data() {
        PrimData::World | PrimData::Scope => Ok(()),
        PrimData::Camera(camera) => camera_attributes(spec, graph, camera),
        PrimData::Points(points) => points_attributes(spec, points),
        PrimData::Mesh(mesh) => mesh_attributes(spec, mesh),
        PrimData::Material(material) => define_material(stage, prim.path(), material),
    }
}

fn camera_attributes(
    spec: &mut PrimSpec,
    graph: &SceneGraph,
    camera: &CameraData,
) -> Result<(), UsdError> {
    attr(spec, "focalLength", ValueType::Float, Value::Float(camera.lens.focal_length))?;
    attr(
        spec,
        "horizontalAperture",
        ValueType::Float,
        Value::Float(camera.lens.horizontal_aperture),
    )?;
    attr(
        spec,
        "verticalAperture",
        ValueType::Float,
        Value::Float(camera.lens.vertical_aperture),
    )?;

    let ops: [(&str, fn(&CameraPose) -> Vec3); 2] = [
        ("xformOp:translate", |p| p.translate),
        ("xformOp:rotateXYZ", |p| p.rotate),
    ];
    for (name, op) in ops {
        let attribute = declare(spec, name, ValueType::Float3)?;
        if camera.is_static() {
            if let Some(pose) = camera.keyframes.values().next() {
                attribute.set(Value::Vec3(op(pose)))?;
            }
        } else {
            for (time, pose) in &camera.keyframes {
                attribute.set_time_sample(graph.time_code(time.0), Value::Vec3(op(pose)))?;
            }
        }
    }
    uniform(
        spec,
        "xformOpOrder",
        ValueType::TokenArray,
        Value::TokenArray(vec!["xformOp:translate".into(), "xformOp:rotateXYZ".into()]),
    )?;
    attr(spec, "twin:cameraId", ValueType::String, Value::String(camera.camera_id.clone()))?;
    Ok(())
}

fn points_attributes(spec: &mut PrimSpec, points: &PointsData) -> Result<(), UsdError> {
    attr(spec, "extent", ValueType::Float3Array, Value::Vec3Array(points.extent().to_vec()))?;
    attr(spec, "points", ValueType::Point3fArray, Value::Vec3Array(points.positions.clone()))?;
    attr(
        spec,
        "primvars:displayColor",
        ValueType::Color3fArray,
        Value::Vec3Array(points.colors.clone()),
    )?
    .set_interpolation(Interpolation::Vertex);
    attr(spec, "widths", ValueType::FloatArray, Value::FloatArray(vec![points.width]))?
        .set_interpolation(Interpolation::Constant);
    if let Some(normals) = &points.normals {
        attr(spec, "normals", ValueType::Normal3fArray, Value::Vec3Array(normals.clone()))?
            .set_interpolation(Interpolation::Vertex);
    }
    Ok(())
}

fn mesh_attributes(spec: &mut PrimSpec, mesh: &MeshData) -> Result<(), UsdError> {
    if mesh.material.is_some() {
        spec.apply_api_schema("MaterialBindingAPI");
    }
    attr(spec, "extent", ValueType::Float3Array, Value::Vec3Array(mesh.extent().to_vec()))?;
    attr(
        spec,
        "faceVertexCounts",
        ValueType::IntArray,
        Value::IntArray(mesh.face_vertex_counts.clone()),
    )?;
    attr(
        spec,
        "faceVertexIndices",
        ValueType::IntArray,
        Value::IntArray(mesh.face_vertex_indices.clone()),
    )?;
    attr(spec, "points", ValueType::Point3fArray, Value::Vec3Array(mesh.points.clone()))?;
    attr(spec, "normals", ValueType::Normal3fArray, Value::Vec3Array(mesh.normals.clone()))?
        .set_interpolation(Interpolation::Vertex);
    attr(spec, "primvars:st", ValueType::TexCoord2fArray, Value::Vec2Array(mesh.st.clone()))?
        .set_interpolation(Interpolation::Vertex);
    uniform(spec, "subdivisionScheme", ValueType::Token, Value::token("none"))?;
    if let Some(material) = &mesh.material {
        spec.create_relationship("material:binding", sdf(material)?)?;
    }
    Ok(())
}

fn define_material(
    stage: &mut Stage,
    path: &PrimPath,
    material: &MaterialData,
) -> Result<(), UsdError> {
    let network = MaterialNetwork::for_material(path)
        .map_err(|_| UsdError::InvalidPath(path.to_string()))?;
    let material_path = sdf(path)?;
    stage
        .prim_mut(&material_path)
        .ok_or_else(|| UsdError::InvalidPath(path.to_string()))?
        .create_attribute("outputs:surface", ValueType::Token, Variability::Varying)?
        .connect_to(network.surface.property("outputs:surface"));

    let surface = stage.define_prim(&sdf(&network.surface)?, "Shader")?;
    uniform(surface, "info:id", ValueType::Token, Value::token("UsdPreviewSurface"))?;
    declare(surface, "inputs:diffuseColor", ValueType::Color3f)?
        .connect_to(network.texture.property("outputs:rgb"));
    attr(surface, "inputs:metallic", ValueType::Float, Value::Float(material.metallic))?;
    attr(surface, "inputs:roughness", ValueType::Float, Value::Float(material.roughness))?;
    declare(surface, "outputs:surface", ValueType::Token)?;

    let reader = stage.define_prim(&sdf(&network.st_reader)?, "Shader")?;
    uniform(reader, "info:id", ValueType::Token, Value::token("UsdPrimvarReader_float2"))?;
    attr(reader, "inputs:varname", ValueType::Token, Value::token("st"))?;
    declare(reader, "outputs:result", ValueType::Float2)?;

    let texture = stage.define_prim(&sdf(&network.texture)?, "Shader")?;
    uniform(texture, "info:id", ValueType::Token, Value::token("UsdUVTexture"))?;
    attr(
        texture,
        "inputs:file",
        ValueType::Asset,
        Value::asset(material.diffuse_texture.clone()),
    )?;
    declare(texture, "inputs:st", ValueType::Float2)?
        .connect_to(network.st_reader.property("outputs:result"));
    attr(texture, "inputs:wrapS", ValueType::Token, Value::token("repeat"))?;
    attr(texture, "inputs:wrapT", ValueType::Token, Value::token("repeat"))?;
    declare(texture, "outputs:rgb", ValueType::Float3)?;
    Ok(())
}
