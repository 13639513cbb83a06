//! Scene serialization.
//!
//! Two emitters render the same [`SceneGraph`] to USDA: [`UsdStageEmitter`]
//! builds a structured stage through `twin-usd` (cargo feature `usd`), and
//! [`TextEmitter`] writes the text directly. Both produce the same prims,
//! hierarchy and attribute values. Which one runs is decided once from the
//! run's capabilities via [`emitter_for`].

mod text;
#[cfg(feature = "usd")]
mod usd;

pub use text::TextEmitter;
#[cfg(feature = "usd")]
pub use usd::UsdStageEmitter;

use crate::graph::{GraphError, SceneGraph};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("scene graph is invalid: {0}")]
    InvalidGraph(#[from] GraphError),

    #[error("cannot write scene to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "usd")]
    #[error("scene library rejected the stage: {0}")]
    Library(#[from] twin_usd::UsdError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterKind {
    Library,
    Text,
}

impl fmt::Display for EmitterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitterKind::Library => write!(f, "scene library"),
            EmitterKind::Text => write!(f, "direct text"),
        }
    }
}

/// Renders a scene graph to a file.
pub trait SceneEmitter {
    fn kind(&self) -> EmitterKind;

    /// Render the graph to USDA text without touching the filesystem.
    fn render(&self, graph: &SceneGraph) -> Result<String, SerializationError>;

    /// Render and write atomically to `path`. On error no file is left at
    /// `path` (an existing file is left untouched).
    #[instrument(skip_all, fields(emitter = %self.kind(), path = %path.display()))]
    fn emit(&self, graph: &SceneGraph, path: &Path) -> Result<PathBuf, SerializationError> {
        let text = self.render(graph)?;
        write_atomic(path, &text)?;
        info!("Wrote {} ({} bytes)", path.display(), text.len());
        Ok(path.to_path_buf())
    }
}

/// Whether this build carries the structured scene library.
pub fn library_available() -> bool {
    cfg!(feature = "usd")
}

/// Pick the emitter for a run. The library path is used only when it is
/// both built in and wanted.
pub fn emitter_for(use_library: bool) -> Box<dyn SceneEmitter> {
    #[cfg(feature = "usd")]
    if use_library {
        return Box::new(UsdStageEmitter);
    }
    #[cfg(not(feature = "usd"))]
    let _ = use_library;
    Box::new(TextEmitter)
}

pub(crate) fn scene_doc(graph: &SceneGraph) -> String {
    format!("Digital twin scene '{}'", graph.name())
}

/// Write through a temporary file in the destination directory, then rename
/// it over `path`.
fn write_atomic(path: &Path, text: &str) -> Result<(), SerializationError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let write_err = |source: std::io::Error| SerializationError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| SerializationError::Write {
        path: dir.clone(),
        source,
    })?;
    debug!("Staging scene in {}", tmp.path().display());
    tmp.write_all(text.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{AssemblerOptions, SceneAssembler};
    use glam::Vec3;
    use twin_data::{Frame, Point, PointCloud};

    /// Prim paths declared in a USDA document, reconstructed from `def`
    /// lines and brace nesting.
    fn declared_prim_paths(usda: &str) -> Vec<String> {
        let mut stack: Vec<String> = Vec::new();
        let mut pending: Option<String> = None;
        let mut open_blocks = 0;
        let mut paths = Vec::new();
        for line in usda.lines().map(str::trim) {
            if line.starts_with("def ") {
                let name = line.split('"').nth(1).unwrap_or_default().to_string();
                let parent = stack.last().cloned().unwrap_or_default();
                let path = format!("{parent}/{name}");
                paths.push(path.clone());
                pending = Some(path);
            } else if line == "{" {
                if let Some(path) = pending.take() {
                    stack.push(path);
                }
            } else if line.ends_with('{') {
                // e.g. `float3 xformOp:translate.timeSamples = {`
                open_blocks += 1;
            } else if line == "}" {
                if open_blocks > 0 {
                    open_blocks -= 1;
                } else {
                    stack.pop();
                }
            }
        }
        paths
    }

    fn frames(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|i| Frame::new(format!("frames/cam_img_{i:06}.jpg"), "cam", i as f64))
            .collect()
    }

    fn plane_scene() -> SceneGraph {
        SceneAssembler::new(AssemblerOptions::default())
            .assemble(&frames(5), None)
            .unwrap()
    }

    fn points_scene() -> SceneGraph {
        let cloud = PointCloud::new(vec![
            Point::new(Vec3::new(0.0, 1.0, 2.0)).with_color(Vec3::X).with_normal(Vec3::Y),
            Point::new(Vec3::new(-1.0, 0.5, 0.25)).with_color(Vec3::Z).with_normal(Vec3::Y),
        ]);
        let mut all = frames(2);
        all.push(Frame::new("frames/side_img_000000.jpg", "side", 0.0));
        SceneAssembler::new(AssemblerOptions::default())
            .assemble(&all, Some(&cloud))
            .unwrap()
    }

    #[test]
    fn test_text_output_is_deterministic() {
        for graph in [plane_scene(), points_scene()] {
            let first = TextEmitter.render(&graph).unwrap();
            let second = TextEmitter.render(&graph).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_text_plane_layout() {
        let text = TextEmitter.render(&plane_scene()).unwrap();
        assert!(text.starts_with("#usda 1.0\n(\n    defaultPrim = \"World\"\n"));
        assert!(text.contains("    upAxis = \"Y\"\n"));
        assert!(text.contains("    endTimeCode = 96\n"));
        assert_eq!(
            declared_prim_paths(&text),
            vec![
                "/World",
                "/World/Cameras",
                "/World/Cameras/cam",
                "/World/Plane",
                "/World/Materials",
                "/World/Materials/FrameMaterial",
                "/World/Materials/FrameMaterial/PBRShader",
                "/World/Materials/FrameMaterial/stReader",
                "/World/Materials/FrameMaterial/DiffuseTexture",
            ]
        );
        assert!(text.contains("rel material:binding = </World/Materials/FrameMaterial>"));
        assert!(text.contains("asset inputs:file = @./frames/cam_img_000000.jpg@"));
        assert!(text.contains("float inputs:roughness = 0.4"));
        assert_eq!(text.matches(": (").count(), 10, "5 keyframes x 2 transform ops");
    }

    #[test]
    fn test_invalid_graph_is_rejected() {
        let graph = SceneGraph::new("empty", 24.0);
        assert!(matches!(
            TextEmitter.render(&graph),
            Err(SerializationError::InvalidGraph(GraphError::MissingRoot))
        ));
    }

    #[test]
    fn test_emit_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.usda");
        let written = TextEmitter.emit(&plane_scene(), &path).unwrap();
        assert_eq!(written, path);
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, TextEmitter.render(&plane_scene()).unwrap());
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1, "no temporary files left behind");
    }

    #[test]
    fn test_failed_render_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.usda");
        let result = TextEmitter.emit(&SceneGraph::new("empty", 24.0), &path);
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unwritable_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("scene.usda");
        assert!(matches!(
            TextEmitter.emit(&plane_scene(), &path),
            Err(SerializationError::Write { .. })
        ));
    }

    #[test]
    fn test_emitter_selection() {
        assert_eq!(emitter_for(false).kind(), EmitterKind::Text);
        let expected = if library_available() {
            EmitterKind::Library
        } else {
            EmitterKind::Text
        };
        assert_eq!(emitter_for(true).kind(), expected);
    }

    #[cfg(feature = "usd")]
    #[test]
    fn test_both_paths_declare_the_same_prims() {
        for graph in [plane_scene(), points_scene()] {
            let library = UsdStageEmitter.render(&graph).unwrap();
            let text = TextEmitter.render(&graph).unwrap();
            assert_eq!(declared_prim_paths(&library), declared_prim_paths(&text));
            let unique: std::collections::BTreeSet<_> = declared_prim_paths(&text).into_iter().collect();
            assert_eq!(unique.len(), declared_prim_paths(&text).len());
        }
    }

    #[cfg(feature = "usd")]
    #[test]
    fn test_text_matches_library_apart_from_comments() {
        for graph in [plane_scene(), points_scene()] {
            let library = UsdStageEmitter.render(&graph).unwrap();
            let text = TextEmitter.render(&graph).unwrap();
            let uncommented: String = text
                .lines()
                .filter(|line| {
                    let line = line.trim_start();
                    !line.starts_with('#') || line.starts_with("#usda")
                })
                .map(|line| format!("{line}\n"))
                .collect();
            assert_eq!(uncommented, library);
        }
    }
}
