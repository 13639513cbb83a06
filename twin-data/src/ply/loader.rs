//! PLY point-cloud loading

use crate::types::{Point, PointCloud};
use glam::Vec3;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while reading a point-cloud file.
#[derive(Debug, Error)]
pub enum PlyError {
    #[error("failed to open point cloud {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse point cloud {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("vertex {index} in {path} is missing '{field}'")]
    MissingField {
        path: PathBuf,
        index: usize,
        field: &'static str,
    },
}

// Only the vertex element matters; faces and other elements are ignored.
#[derive(Deserialize, Debug)]
struct PlyFile {
    #[serde(default, rename = "vertex")]
    vertex: Vec<HashMap<String, JsonValue>>,
}

fn get_f32(prop: Option<&JsonValue>) -> Option<f32> {
    prop.and_then(|v| match v {
        JsonValue::Number(n) => n.as_f64().map(|f| f as f32),
        _ => None,
    })
}

fn get_u8(prop: Option<&JsonValue>) -> Option<u8> {
    prop.and_then(|v| match v {
        JsonValue::Number(n) => n
            .as_u64()
            .map(|u| u.min(255) as u8)
            .or_else(|| n.as_i64().map(|i| i.clamp(0, 255) as u8)),
        _ => None,
    })
}

fn get_color(vertex: &HashMap<String, JsonValue>) -> Option<Vec3> {
    let channels = |r: &str, g: &str, b: &str| {
        Some((
            get_u8(vertex.get(r))?,
            get_u8(vertex.get(g))?,
            get_u8(vertex.get(b))?,
        ))
    };
    channels("red", "green", "blue")
        .or_else(|| channels("r", "g", "b"))
        .map(|(r, g, b)| Vec3::new(r as f32, g as f32, b as f32) / 255.0)
}

fn get_normal(vertex: &HashMap<String, JsonValue>) -> Option<Vec3> {
    Some(Vec3::new(
        get_f32(vertex.get("nx"))?,
        get_f32(vertex.get("ny"))?,
        get_f32(vertex.get("nz"))?,
    ))
}

/// Load a point cloud from a PLY file (ASCII or binary).
///
/// Positions are required; colors (`red/green/blue` or `r/g/b`) and normals
/// (`nx/ny/nz`) are kept when present. A file with zero vertices yields an
/// empty cloud rather than an error.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_point_cloud(path: &Path) -> Result<PointCloud, PlyError> {
    debug!("Loading PLY point cloud");
    let file = File::open(path).map_err(|source| PlyError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let ply_data: PlyFile = serde_ply::from_reader(reader).map_err(|e| {
        warn!("Failed to parse PLY file: {}", e);
        PlyError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    let mut points = Vec::with_capacity(ply_data.vertex.len());
    for (index, vertex) in ply_data.vertex.iter().enumerate() {
        let coord = |field: &'static str| {
            get_f32(vertex.get(field)).ok_or_else(|| PlyError::MissingField {
                path: path.to_path_buf(),
                index,
                field,
            })
        };
        points.push(Point {
            position: Vec3::new(coord("x")?, coord("y")?, coord("z")?),
            color: get_color(vertex),
            normal: get_normal(vertex),
        });
    }

    info!("PLY file parsed: {} points", points.len());
    Ok(PointCloud::new(points))
}
