//! On-disk layout for a single pipeline run.
//!
//! Every artifact a run reads or writes is addressed through an
//! [`ArtifactStore`], so two runs with distinct work directories never touch
//! the same files. Two runs sharing one work directory are not supported.

use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove stale artifact {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Directories for frames, reconstruction workspace and scene output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    frames_dir: PathBuf,
    work_dir: PathBuf,
    scene_path: PathBuf,
}

impl ArtifactStore {
    pub fn new(
        frames_dir: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        scene_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            frames_dir: frames_dir.into(),
            work_dir: work_dir.into(),
            scene_path: scene_path.into(),
        }
    }

    /// Create the workspace and scene output directories.
    pub fn prepare(&self) -> Result<(), StoreError> {
        for dir in [
            self.work_dir.clone(),
            self.sparse_dir(),
            self.dense_dir(),
            self.scene_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        debug!("Prepared artifact directories under {}", self.work_dir.display());
        Ok(())
    }

    /// Remove every reconstruction artifact left in the work directory by
    /// an earlier run, then recreate the empty stage directories. Frames and
    /// the scene file are not touched.
    pub fn clear_outputs(&self) -> Result<(), StoreError> {
        for file in [self.database_path(), self.image_list_path()] {
            match fs::remove_file(&file) {
                Ok(()) => debug!("Removed stale {}", file.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::Remove { path: file, source }),
            }
        }
        for dir in [self.sparse_dir(), self.dense_dir()] {
            match fs::remove_dir_all(&dir) {
                Ok(()) => debug!("Removed stale {}", dir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::Remove { path: dir, source }),
            }
            fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames_dir
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn scene_path(&self) -> &Path {
        &self.scene_path
    }

    /// Directory the scene file is written into (`.` for a bare file name).
    pub fn scene_dir(&self) -> PathBuf {
        match self.scene_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.work_dir.join("database.db")
    }

    pub fn image_list_path(&self) -> PathBuf {
        self.work_dir.join("image_list.txt")
    }

    pub fn sparse_dir(&self) -> PathBuf {
        self.work_dir.join("sparse")
    }

    /// First (and only kept) model written by the mapper.
    pub fn sparse_model_dir(&self) -> PathBuf {
        self.sparse_dir().join("0")
    }

    pub fn dense_dir(&self) -> PathBuf {
        self.work_dir.join("dense")
    }

    pub fn depth_maps_dir(&self) -> PathBuf {
        self.dense_dir().join("stereo").join("depth_maps")
    }

    pub fn fused_point_cloud(&self) -> PathBuf {
        self.dense_dir().join("fused.ply")
    }
}

/// Asset reference for `target` as seen from the directory `base`.
///
/// Uses forward slashes and a leading `./` for paths below `base`. Falls
/// back to the target as given when no relative form exists (e.g. different
/// drive prefixes).
pub fn asset_reference(target: &Path, base: &Path) -> String {
    let absolute = |p: &Path| std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf());
    let Some(relative) = relative_path(&absolute(target), &absolute(base)) else {
        return target.to_string_lossy().replace('\\', "/");
    };
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{joined}")
    }
}

/// Express `target` relative to the directory `base`.
///
/// Both paths must be absolute or both relative, and `base` must not contain
/// `..` components; otherwise there is no lexical answer and `None` is
/// returned.
pub fn relative_path(target: &Path, base: &Path) -> Option<PathBuf> {
    if target.is_absolute() != base.is_absolute() {
        return None;
    }
    fn normal(p: &Path) -> Vec<Component<'_>> {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }
    let target = normal(target);
    let base = normal(base);
    if base.iter().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }

    let common = target
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 && base.first().is_some_and(|c| matches!(c, Component::Prefix(_))) {
        return None;
    }

    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for component in &target[common..] {
        out.push(component.as_os_str());
    }
    Some(out)
}

/// A file with at least one byte, or a directory with at least one entry.
pub fn is_non_empty(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len() > 0,
        Ok(meta) if meta.is_dir() => fs::read_dir(path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false),
        _ => false,
    }
}
