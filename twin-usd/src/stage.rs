//! Stage, prim specs and properties.

use crate::error::UsdError;
use crate::path::{SdfPath, is_valid_identifier};
use crate::value::{Value, ValueType};
use crate::writer;
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpAxis {
    #[default]
    Y,
    Z,
}

impl UpAxis {
    pub fn token(self) -> &'static str {
        match self {
            UpAxis::Y => "Y",
            UpAxis::Z => "Z",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variability {
    #[default]
    Varying,
    Uniform,
}

/// Primvar interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Constant,
    Uniform,
    Vertex,
    FaceVarying,
}

impl Interpolation {
    pub fn token(self) -> &'static str {
        match self {
            Interpolation::Constant => "constant",
            Interpolation::Uniform => "uniform",
            Interpolation::Vertex => "vertex",
            Interpolation::FaceVarying => "faceVarying",
        }
    }
}

/// Layer-level metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StageMetadata {
    pub default_prim: Option<String>,
    pub doc: Option<String>,
    pub up_axis: UpAxis,
    pub meters_per_unit: f64,
    pub time_codes_per_second: f64,
    pub start_time_code: Option<f64>,
    pub end_time_code: Option<f64>,
}

impl Default for StageMetadata {
    fn default() -> Self {
        Self {
            default_prim: None,
            doc: None,
            up_axis: UpAxis::Y,
            meters_per_unit: 1.0,
            time_codes_per_second: 24.0,
            start_time_code: None,
            end_time_code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    value_type: ValueType,
    variability: Variability,
    default: Option<Value>,
    time_samples: BTreeMap<OrderedFloat<f64>, Value>,
    interpolation: Option<Interpolation>,
    connection: Option<String>,
}

impl Attribute {
    fn new(name: &str, value_type: ValueType, variability: Variability) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            variability,
            default: None,
            time_samples: BTreeMap::new(),
            interpolation: None,
            connection: None,
        }
    }

    fn check(&self, value: &Value) -> Result<(), UsdError> {
        if self.value_type.accepts(value) {
            Ok(())
        } else {
            Err(UsdError::TypeMismatch {
                attribute: self.name.clone(),
                expected: self.value_type.type_name(),
                found: value.kind_name(),
            })
        }
    }

    /// Set the default (non-animated) value.
    pub fn set(&mut self, value: Value) -> Result<&mut Self, UsdError> {
        self.check(&value)?;
        self.default = Some(value);
        Ok(self)
    }

    /// Author a value at a time code.
    pub fn set_time_sample(&mut self, time: f64, value: Value) -> Result<&mut Self, UsdError> {
        self.check(&value)?;
        self.time_samples.insert(OrderedFloat(time), value);
        Ok(self)
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) -> &mut Self {
        self.interpolation = Some(interpolation);
        self
    }

    /// Connect to a property path such as `/World/Mat/Shader.outputs:rgb`.
    pub fn connect_to(&mut self, source: impl Into<String>) -> &mut Self {
        self.connection = Some(source.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn variability(&self) -> Variability {
        self.variability
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn time_samples(&self) -> impl Iterator<Item = (f64, &Value)> {
        self.time_samples.iter().map(|(t, v)| (t.0, v))
    }

    pub fn has_time_samples(&self) -> bool {
        !self.time_samples.is_empty()
    }

    pub fn interpolation(&self) -> Option<Interpolation> {
        self.interpolation
    }

    pub fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    name: String,
    targets: Vec<SdfPath>,
}

impl Relationship {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targets(&self) -> &[SdfPath] {
        &self.targets
    }
}

/// A borrowed property in authoring order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Property<'a> {
    Attribute(&'a Attribute),
    Relationship(&'a Relationship),
}

impl Property<'_> {
    pub fn name(&self) -> &str {
        match self {
            Property::Attribute(a) => a.name(),
            Property::Relationship(r) => r.name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertySlot {
    Attribute(usize),
    Relationship(usize),
}

/// A defined prim and its authored properties.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimSpec {
    path: SdfPath,
    type_name: String,
    api_schemas: Vec<String>,
    attributes: Vec<Attribute>,
    relationships: Vec<Relationship>,
    order: Vec<PropertySlot>,
    children: Vec<SdfPath>,
}

fn valid_property_name(name: &str) -> bool {
    !name.is_empty() && name.split(':').all(is_valid_identifier)
}

impl PrimSpec {
    fn new(path: SdfPath, type_name: &str) -> Self {
        Self {
            path,
            type_name: type_name.to_string(),
            api_schemas: Vec::new(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            order: Vec::new(),
            children: Vec::new(),
        }
    }

    fn ensure_new_property(&self, name: &str) -> Result<(), UsdError> {
        if !valid_property_name(name) {
            return Err(UsdError::InvalidName(name.to_string()));
        }
        if self.properties().any(|p| p.name() == name) {
            return Err(UsdError::DuplicateProperty {
                prim: self.path.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn create_attribute(
        &mut self,
        name: &str,
        value_type: ValueType,
        variability: Variability,
    ) -> Result<&mut Attribute, UsdError> {
        self.ensure_new_property(name)?;
        let index = self.attributes.len();
        self.attributes
            .push(Attribute::new(name, value_type, variability));
        self.order.push(PropertySlot::Attribute(index));
        Ok(&mut self.attributes[index])
    }

    pub fn create_relationship(&mut self, name: &str, target: SdfPath) -> Result<&mut Relationship, UsdError> {
        self.ensure_new_property(name)?;
        let index = self.relationships.len();
        self.relationships.push(Relationship {
            name: name.to_string(),
            targets: vec![target],
        });
        self.order.push(PropertySlot::Relationship(index));
        Ok(&mut self.relationships[index])
    }

    pub fn apply_api_schema(&mut self, schema: &str) -> &mut Self {
        if !self.api_schemas.iter().any(|s| s == schema) {
            self.api_schemas.push(schema.to_string());
        }
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name() == name)
    }

    pub fn path(&self) -> &SdfPath {
        &self.path
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn api_schemas(&self) -> &[String] {
        &self.api_schemas
    }

    /// Properties in authoring order.
    pub fn properties(&self) -> impl Iterator<Item = Property<'_>> {
        self.order.iter().map(|slot| match *slot {
            PropertySlot::Attribute(i) => Property::Attribute(&self.attributes[i]),
            PropertySlot::Relationship(i) => Property::Relationship(&self.relationships[i]),
        })
    }

    pub fn children(&self) -> &[SdfPath] {
        &self.children
    }
}

/// An in-memory layer of prim definitions.
///
/// Prims keep definition order among siblings; properties keep authoring
/// order. Export is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    metadata: StageMetadata,
    prims: Vec<PrimSpec>,
    index: HashMap<SdfPath, usize>,
    root_prims: Vec<SdfPath>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a prim. Its parent must already be defined.
    pub fn define_prim(&mut self, path: &SdfPath, type_name: &str) -> Result<&mut PrimSpec, UsdError> {
        if self.index.contains_key(path) {
            return Err(UsdError::DuplicatePrim(path.clone()));
        }
        match path.parent() {
            Some(parent) => {
                let &parent_index = self
                    .index
                    .get(&parent)
                    .ok_or_else(|| UsdError::MissingParent(path.clone()))?;
                self.prims[parent_index].children.push(path.clone());
            }
            None => self.root_prims.push(path.clone()),
        }

        debug!("Defined {} {}", type_name, path);
        let index = self.prims.len();
        self.index.insert(path.clone(), index);
        self.prims.push(PrimSpec::new(path.clone(), type_name));
        Ok(&mut self.prims[index])
    }

    pub fn prim(&self, path: &SdfPath) -> Option<&PrimSpec> {
        self.index.get(path).map(|&i| &self.prims[i])
    }

    pub fn prim_mut(&mut self, path: &SdfPath) -> Option<&mut PrimSpec> {
        self.index.get(path).map(|&i| &mut self.prims[i])
    }

    pub fn metadata(&self) -> &StageMetadata {
        &self.metadata
    }

    pub fn set_default_prim(&mut self, name: &str) {
        self.metadata.default_prim = Some(name.to_string());
    }

    pub fn set_doc(&mut self, doc: &str) {
        self.metadata.doc = Some(doc.to_string());
    }

    pub fn set_up_axis(&mut self, axis: UpAxis) {
        self.metadata.up_axis = axis;
    }

    pub fn set_meters_per_unit(&mut self, meters: f64) {
        self.metadata.meters_per_unit = meters;
    }

    pub fn set_time_codes_per_second(&mut self, fps: f64) {
        self.metadata.time_codes_per_second = fps;
    }

    pub fn set_time_code_range(&mut self, start: f64, end: f64) {
        self.metadata.start_time_code = Some(start);
        self.metadata.end_time_code = Some(end);
    }

    pub fn root_prims(&self) -> &[SdfPath] {
        &self.root_prims
    }

    /// Every prim path in depth-first definition order.
    pub fn prim_paths(&self) -> Vec<SdfPath> {
        let mut out = Vec::with_capacity(self.prims.len());
        let mut pending: Vec<&SdfPath> = self.root_prims.iter().rev().collect();
        while let Some(path) = pending.pop() {
            out.push(path.clone());
            if let Some(prim) = self.prim(path) {
                pending.extend(prim.children.iter().rev());
            }
        }
        out
    }

    /// Check default prim, relationship targets and connection sources.
    pub fn validate(&self) -> Result<(), UsdError> {
        if let Some(name) = &self.metadata.default_prim {
            if !self.root_prims.iter().any(|p| p.name() == name) {
                return Err(UsdError::MissingDefaultPrim(name.clone()));
            }
        }
        for prim in &self.prims {
            for property in prim.properties() {
                let targets: Vec<String> = match property {
                    Property::Relationship(rel) => {
                        rel.targets.iter().map(|t| t.as_str().to_string()).collect()
                    }
                    Property::Attribute(attr) => attr
                        .connection()
                        .map(|c| c.split('.').next().unwrap_or(c).to_string())
                        .into_iter()
                        .collect(),
                };
                for target in targets {
                    let known = SdfPath::new(&target)
                        .ok()
                        .is_some_and(|path| self.index.contains_key(&path));
                    if !known {
                        return Err(UsdError::UnknownTarget {
                            from: prim.path.property(property.name()),
                            target,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate and render the stage as USDA text.
    pub fn export_to_string(&self) -> Result<String, UsdError> {
        self.validate()?;
        Ok(writer::write_stage(self))
    }

    /// Validate and write the stage to `path`.
    pub fn save(&self, path: &Path) -> Result<(), UsdError> {
        let text = self.export_to_string()?;
        fs::write(path, text).map_err(|source| UsdError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn path(p: &str) -> SdfPath {
        SdfPath::new(p).unwrap()
    }

    #[test]
    fn test_define_requires_parent() {
        let mut stage = Stage::new();
        let err = stage.define_prim(&path("/World/Plane"), "Mesh").unwrap_err();
        assert!(matches!(err, UsdError::MissingParent(_)));
        stage.define_prim(&path("/World"), "Xform").unwrap();
        stage.define_prim(&path("/World/Plane"), "Mesh").unwrap();
        let err = stage.define_prim(&path("/World/Plane"), "Mesh").unwrap_err();
        assert!(matches!(err, UsdError::DuplicatePrim(_)));
    }

    #[test]
    fn test_prim_paths_depth_first() {
        let mut stage = Stage::new();
        for (p, t) in [
            ("/World", "Xform"),
            ("/World/A", "Scope"),
            ("/World/B", "Scope"),
            ("/World/A/Child", "Camera"),
        ] {
            stage.define_prim(&path(p), t).unwrap();
        }
        let paths: Vec<_> = stage.prim_paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["/World", "/World/A", "/World/A/Child", "/World/B"]);
    }

    #[test]
    fn test_attribute_type_checked() {
        let mut stage = Stage::new();
        let prim = stage.define_prim(&path("/World"), "Xform").unwrap();
        let attr = prim
            .create_attribute("xformOp:translate", ValueType::Float3, Variability::Varying)
            .unwrap();
        assert!(attr.set(Value::Float(1.0)).is_err());
        attr.set_time_sample(24.0, Value::Vec3(Vec3::X)).unwrap();
        attr.set_time_sample(0.0, Value::Vec3(Vec3::ZERO)).unwrap();
        let times: Vec<_> = attr.time_samples().map(|(t, _)| t).collect();
        assert_eq!(times, vec![0.0, 24.0]);

        let err = prim
            .create_attribute("xformOp:translate", ValueType::Float3, Variability::Varying)
            .unwrap_err();
        assert!(matches!(err, UsdError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_validate_catches_dangling_targets() {
        let mut stage = Stage::new();
        stage.define_prim(&path("/World"), "Xform").unwrap();
        let mesh = stage.define_prim(&path("/World/Plane"), "Mesh").unwrap();
        mesh.create_relationship("material:binding", path("/World/Looks/Missing"))
            .unwrap();
        let err = stage.validate().unwrap_err();
        assert!(matches!(err, UsdError::UnknownTarget { .. }));
    }

    #[test]
    fn test_default_prim_must_exist() {
        let mut stage = Stage::new();
        stage.set_default_prim("World");
        assert!(matches!(
            stage.export_to_string(),
            Err(UsdError::MissingDefaultPrim(_))
        ));
    }

    #[test]
    fn test_save_writes_exported_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut stage = Stage::new();
        stage.define_prim(&path("/World"), "Xform").unwrap();
        stage.set_default_prim("World");

        let file = dir.path().join("scene.usda");
        stage.save(&file).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), stage.export_to_string().unwrap());

        let err = stage.save(&dir.path().join("missing").join("scene.usda")).unwrap_err();
        assert!(matches!(err, UsdError::Io { .. }));
    }
}
