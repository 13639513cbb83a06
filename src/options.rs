//! The immutable options record for one pipeline run.

use std::path::{Path, PathBuf};
use twin_data::ArtifactStore;
use twin_recon::EngineConfig;
use twin_scene::AssemblerOptions;

/// Everything the coordinator needs to know, fixed at pipeline start.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Captured frames.
    pub frames_dir: PathBuf,
    /// Reconstruction workspace; one per run.
    pub work_dir: PathBuf,
    /// Scene file to write.
    pub output_path: PathBuf,
    pub scene_name: String,
    /// Run the reconstruction engine at all.
    pub photogrammetry: bool,
    pub engine: EngineConfig,
    /// Prefer the structured scene library when it is built in.
    pub use_scene_library: bool,
    /// Build cameras only, no point or plane geometry.
    pub skip_geometry: bool,
    /// Use this PLY instead of running reconstruction.
    pub point_cloud: Option<PathBuf>,
    /// Seconds between numbered frames of one camera.
    pub frame_interval: f64,
    pub time_codes_per_second: f64,
    /// Side length of the fallback plane.
    pub plane_size: f32,
    pub point_width: f32,
}

impl PipelineOptions {
    pub fn new(
        frames_dir: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        let scene = AssemblerOptions::default();
        Self {
            frames_dir: frames_dir.into(),
            work_dir: work_dir.into(),
            output_path: output_path.into(),
            scene_name: scene.scene_name,
            photogrammetry: true,
            engine: EngineConfig::default(),
            use_scene_library: true,
            skip_geometry: false,
            point_cloud: None,
            frame_interval: 1.0,
            time_codes_per_second: scene.time_codes_per_second,
            plane_size: scene.plane_size,
            point_width: scene.point_width,
        }
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_photogrammetry(mut self, enabled: bool) -> Self {
        self.photogrammetry = enabled;
        self
    }

    pub fn with_scene_library(mut self, enabled: bool) -> Self {
        self.use_scene_library = enabled;
        self
    }

    pub fn with_point_cloud(mut self, path: impl Into<PathBuf>) -> Self {
        self.point_cloud = Some(path.into());
        self
    }

    pub fn with_scene_name(mut self, name: impl Into<String>) -> Self {
        self.scene_name = name.into();
        self
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.frames_dir, &self.work_dir, &self.output_path)
    }

    /// Scene layout for the assembler; textures resolve relative to `scene_dir`.
    pub fn assembler_options(&self, scene_dir: &Path) -> AssemblerOptions {
        AssemblerOptions {
            scene_name: self.scene_name.clone(),
            time_codes_per_second: self.time_codes_per_second,
            plane_size: self.plane_size,
            point_width: self.point_width,
            skip_geometry: self.skip_geometry,
            asset_base: scene_dir.to_path_buf(),
            ..AssemblerOptions::default()
        }
    }
}
