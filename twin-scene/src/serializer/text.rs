//! Direct USDA text emission, used when the scene library is not built in.

use super::{EmitterKind, SceneEmitter, SerializationError, scene_doc};
use crate::graph::{
    CameraData, CameraPose, GraphError, MaterialData, MaterialNetwork, MeshData, PointsData, Prim,
    PrimData, PrimKind, SceneGraph,
};
use glam::{Vec2, Vec3};
use std::fmt::Write as _;

const INDENT: &str = "    ";

/// Writes USDA by hand, prim for prim as the library emitter would, with
/// comments where the output relies on conventions the library would
/// otherwise check.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextEmitter;

impl SceneEmitter for TextEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::Text
    }

    fn render(&self, graph: &SceneGraph) -> Result<String, SerializationError> {
        graph.validate()?;
        let root = graph.root().ok_or(GraphError::MissingRoot)?;

        let mut out = Usda::default();
        out.header(graph, root);
        out.comment(0, "Written as plain text; prim layout matches the scene-library output.");
        out.text.push('\n');
        out.prim(graph, root, 0)?;
        Ok(out.text)
    }
}

fn has_geometry(graph: &SceneGraph) -> bool {
    graph.prims_of_kind(PrimKind::Points).next().is_some()
        || graph.prims_of_kind(PrimKind::Mesh).next().is_some()
}

fn real(value: f32) -> String {
    real64(value as f64)
}

// Six decimals, trailing zeros trimmed, no negative zero.
fn real64(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_string()
        } else if value > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    let mut s = format!("{value:.6}");
    if s.contains('.') {
        let len = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(len);
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn vec2(v: Vec2) -> String {
    format!("({}, {})", real(v.x), real(v.y))
}

fn vec3(v: Vec3) -> String {
    format!("({}, {}, {})", real(v.x), real(v.y), real(v.z))
}

fn list<T>(items: &[T], f: impl Fn(&T) -> String) -> String {
    format!("[{}]", items.iter().map(f).collect::<Vec<_>>().join(", "))
}

#[derive(Default)]
struct Usda {
    text: String,
}

impl Usda {
    fn header(&mut self, graph: &SceneGraph, root: &Prim) {
        self.text.push_str("#usda 1.0\n(\n");
        let range = graph.time_range();
        let mut meta = |key: &str, value: String| {
            let _ = writeln!(self.text, "{INDENT}{key} = {value}");
        };
        meta("defaultPrim", quoted(root.path().name()));
        meta("doc", quoted(&scene_doc(graph)));
        if let Some(range) = range {
            meta("endTimeCode", real64(graph.time_code(range.end)));
        }
        meta("metersPerUnit", real64(1.0));
        if let Some(range) = range {
            meta("startTimeCode", real64(graph.time_code(range.start)));
        }
        meta("timeCodesPerSecond", real64(graph.time_codes_per_second()));
        meta("upAxis", quoted("Y"));
        self.text.push_str(")\n");
    }

    fn comment(&mut self, depth: usize, text: &str) {
        let _ = writeln!(self.text, "{}# {}", INDENT.repeat(depth), text);
    }

    fn open(&mut self, depth: usize, type_name: &str, name: &str, api_schemas: &[&str]) {
        let pad = INDENT.repeat(depth);
        let _ = write!(self.text, "{pad}def {type_name} {}", quoted(name));
        if !api_schemas.is_empty() {
            let _ = write!(
                self.text,
                " (\n{pad}{INDENT}prepend apiSchemas = {}\n{pad})",
                list(api_schemas, |s| quoted(s))
            );
        }
        let _ = writeln!(self.text, "\n{pad}{{");
    }

    fn close(&mut self, depth: usize) {
        let _ = writeln!(self.text, "{}}}", INDENT.repeat(depth));
    }

    fn attr(&mut self, depth: usize, decl: &str, value: String) {
        let _ = writeln!(self.text, "{}{decl} = {value}", INDENT.repeat(depth));
    }

    fn primvar(&mut self, depth: usize, decl: &str, value: String, interpolation: &str) {
        let pad = INDENT.repeat(depth);
        let _ = writeln!(
            self.text,
            "{pad}{decl} = {value} (\n{pad}{INDENT}interpolation = {}\n{pad})",
            quoted(interpolation)
        );
    }

    fn samples(&mut self, depth: usize, decl: &str, samples: &[(f64, String)]) {
        let pad = INDENT.repeat(depth);
        let _ = writeln!(self.text, "{pad}{decl}.timeSamples = {{");
        for (time, value) in samples {
            let _ = writeln!(self.text, "{pad}{INDENT}{}: {value},", real64(*time));
        }
        let _ = writeln!(self.text, "{pad}}}");
    }

    fn connect(&mut self, depth: usize, decl: &str, source: &str) {
        let _ = writeln!(self.text, "{}{decl}.connect = <{source}>", INDENT.repeat(depth));
    }

    fn declare(&mut self, depth: usize, decl: &str) {
        let _ = writeln!(self.text, "{}{decl}", INDENT.repeat(depth));
    }

    fn rel(&mut self, depth: usize, name: &str, target: &str) {
        let _ = writeln!(self.text, "{}rel {name} = <{target}>", INDENT.repeat(depth));
    }

    fn prim(&mut self, graph: &SceneGraph, prim: &Prim, depth: usize) -> Result<(), GraphError> {
        let api_schemas: &[&str] = match prim.data() {
            PrimData::Mesh(MeshData { material: Some(_), .. }) => &["MaterialBindingAPI"],
            _ => &[],
        };
        self.open(depth, prim.kind().type_name(), prim.path().name(), api_schemas);

        let inner = depth + 1;
        let mut wrote_any = match prim.data() {
            PrimData::World | PrimData::Scope => false,
            PrimData::Camera(camera) => self.camera(graph, inner, camera),
            PrimData::Points(points) => self.points(inner, points),
            PrimData::Mesh(mesh) => self.mesh(inner, mesh),
            PrimData::Material(material) => {
                self.material(prim, inner, material)?;
                true
            }
        };

        for child in prim.children() {
            let Some(child) = graph.prim(child) else {
                continue;
            };
            if wrote_any {
                self.text.push('\n');
            }
            self.prim(graph, child, inner)?;
            wrote_any = true;
        }

        if prim.kind() == PrimKind::World && !has_geometry(graph) {
            self.comment(inner, "Geometry omitted by configuration: no PointCloud or Plane prim.");
        }
        self.close(depth);
        Ok(())
    }

    fn camera(&mut self, graph: &SceneGraph, depth: usize, camera: &CameraData) -> bool {
        self.attr(depth, "float focalLength", real(camera.lens.focal_length));
        self.attr(depth, "float horizontalAperture", real(camera.lens.horizontal_aperture));
        self.attr(depth, "float verticalAperture", real(camera.lens.vertical_aperture));

        let ops: [(&str, fn(&CameraPose) -> Vec3); 2] = [
            ("float3 xformOp:translate", |p| p.translate),
            ("float3 xformOp:rotateXYZ", |p| p.rotate),
        ];
        for (decl, op) in ops {
            if camera.is_static() {
                if let Some(pose) = camera.keyframes.values().next() {
                    self.attr(depth, decl, vec3(op(pose)));
                }
            } else {
                let samples: Vec<_> = camera
                    .keyframes
                    .iter()
                    .map(|(time, pose)| (graph.time_code(time.0), vec3(op(pose))))
                    .collect();
                self.samples(depth, decl, &samples);
            }
        }
        self.attr(
            depth,
            "uniform token[] xformOpOrder",
            list(&["xformOp:translate", "xformOp:rotateXYZ"], |s| quoted(s)),
        );
        self.attr(depth, "string twin:cameraId", quoted(&camera.camera_id));
        true
    }

    fn points(&mut self, depth: usize, points: &PointsData) -> bool {
        self.attr(depth, "float3[] extent", list(&points.extent(), |v| vec3(*v)));
        self.attr(depth, "point3f[] points", list(&points.positions, |v| vec3(*v)));
        if points.sampled_colors > 0 {
            self.comment(
                depth,
                &format!(
                    "{} of {} colors sampled from frame centers.",
                    points.sampled_colors,
                    points.positions.len()
                ),
            );
        }
        self.primvar(
            depth,
            "color3f[] primvars:displayColor",
            list(&points.colors, |v| vec3(*v)),
            "vertex",
        );
        self.primvar(depth, "float[] widths", list(&[points.width], |w| real(*w)), "constant");
        if let Some(normals) = &points.normals {
            self.primvar(depth, "normal3f[] normals", list(normals, |v| vec3(*v)), "vertex");
        }
        true
    }

    fn mesh(&mut self, depth: usize, mesh: &MeshData) -> bool {
        self.attr(depth, "float3[] extent", list(&mesh.extent(), |v| vec3(*v)));
        self.attr(depth, "int[] faceVertexCounts", list(&mesh.face_vertex_counts, |i| i.to_string()));
        self.attr(
            depth,
            "int[] faceVertexIndices",
            list(&mesh.face_vertex_indices, |i| i.to_string()),
        );
        self.attr(depth, "point3f[] points", list(&mesh.points, |v| vec3(*v)));
        self.primvar(depth, "normal3f[] normals", list(&mesh.normals, |v| vec3(*v)), "vertex");
        self.primvar(depth, "texCoord2f[] primvars:st", list(&mesh.st, |v| vec2(*v)), "vertex");
        self.attr(depth, "uniform token subdivisionScheme", quoted("none"));
        if let Some(material) = &mesh.material {
            self.rel(depth, "material:binding", material.as_str());
        }
        true
    }

    fn material(&mut self, prim: &Prim, depth: usize, material: &MaterialData) -> Result<(), GraphError> {
        let network = MaterialNetwork::for_material(prim.path())?;
        self.connect(depth, "token outputs:surface", &network.surface.property("outputs:surface"));

        self.text.push('\n');
        self.open(depth, "Shader", network.surface.name(), &[]);
        let inner = depth + 1;
        self.attr(inner, "uniform token info:id", quoted("UsdPreviewSurface"));
        self.connect(
            inner,
            "color3f inputs:diffuseColor",
            &network.texture.property("outputs:rgb"),
        );
        self.attr(inner, "float inputs:metallic", real(material.metallic));
        self.attr(inner, "float inputs:roughness", real(material.roughness));
        self.declare(inner, "token outputs:surface");
        self.close(depth);

        self.text.push('\n');
        self.open(depth, "Shader", network.st_reader.name(), &[]);
        self.attr(inner, "uniform token info:id", quoted("UsdPrimvarReader_float2"));
        self.attr(inner, "token inputs:varname", quoted("st"));
        self.declare(inner, "float2 outputs:result");
        self.close(depth);

        self.text.push('\n');
        self.open(depth, "Shader", network.texture.name(), &[]);
        self.attr(inner, "uniform token info:id", quoted("UsdUVTexture"));
        self.attr(inner, "asset inputs:file", format!("@{}@", material.diffuse_texture));
        self.connect(inner, "float2 inputs:st", &network.st_reader.property("outputs:result"));
        self.attr(inner, "token inputs:wrapS", quoted("repeat"));
        self.attr(inner, "token inputs:wrapT", quoted("repeat"));
        self.declare(inner, "float3 outputs:rgb");
        self.close(depth);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{AssemblerOptions, SceneAssembler};
    use twin_data::{Frame, Point, PointCloud};

    #[test]
    fn test_real_formatting() {
        assert_eq!(real(0.01), "0.01");
        assert_eq!(real(-0.0), "0");
        assert_eq!(real64(96.0), "96");
        assert_eq!(real64(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn test_static_camera_has_plain_values() {
        let frames = vec![Frame::new("a.jpg", "solo", 2.0)];
        let graph = SceneAssembler::new(AssemblerOptions::default())
            .assemble(&frames, None)
            .unwrap();
        let text = TextEmitter.render(&graph).unwrap();
        assert!(!text.contains("timeSamples"));
        assert!(text.contains("        float3 xformOp:translate = (0, 1.5, 5)\n"));
        assert!(text.contains("string twin:cameraId = \"solo\""));
        assert!(text.contains("    startTimeCode = 48\n"));
    }

    #[test]
    fn test_camera_id_with_newline_stays_on_one_line() {
        let frames = vec![Frame::new("a.jpg", "lobby\nnorth", 0.0)];
        let graph = SceneAssembler::new(AssemblerOptions::default())
            .assemble(&frames, None)
            .unwrap();
        let text = TextEmitter.render(&graph).unwrap();
        assert!(text.contains(r#"string twin:cameraId = "lobby\nnorth""#));
        assert!(!text.contains("lobby\n"));
    }

    #[test]
    fn test_sampled_colors_are_called_out() {
        let frames = vec![Frame::new("missing.jpg", "cam", 0.0)];
        let cloud = PointCloud::new(vec![Point::new(Vec3::ZERO), Point::new(Vec3::X)]);
        let graph = SceneAssembler::new(AssemblerOptions::default())
            .assemble(&frames, Some(&cloud))
            .unwrap();
        let text = TextEmitter.render(&graph).unwrap();
        assert!(text.contains("# 2 of 2 colors sampled from frame centers."));
        assert!(text.contains("color3f[] primvars:displayColor = [(0.5, 0.5, 0.5), (0.5, 0.5, 0.5)] (\n"));
        assert!(text.contains("float[] widths = [0.01] (\n            interpolation = \"constant\"\n        )\n"));
        assert!(!text.contains("normals"));
    }

    #[test]
    fn test_skipped_geometry_is_called_out() {
        let frames = vec![Frame::new("a.jpg", "cam", 0.0)];
        let graph = SceneAssembler::new(AssemblerOptions::default().with_skip_geometry(true))
            .assemble(&frames, None)
            .unwrap();
        let text = TextEmitter.render(&graph).unwrap();
        assert!(text.contains("    # Geometry omitted by configuration"));
        assert!(!text.contains("def Mesh"));
    }
}
