//! JSON configuration file and its mapping onto pipeline options.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use twin::PipelineOptions;
use twin::recon::{EngineConfig, FeatureMethod, MatchingStrategy, Quality};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Settings read from `--config`; every field may be omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub frames_dir: PathBuf,
    pub work_dir: PathBuf,
    pub output: PathBuf,
    pub scene_name: String,
    pub photogrammetry: bool,
    pub colmap: PathBuf,
    pub feature_method: FeatureMethod,
    pub matching: MatchingStrategy,
    pub quality: Quality,
    pub use_gpu: bool,
    pub gpu_index: u32,
    pub dense: bool,
    pub stage_timeout_secs: u64,
    pub scene_library: bool,
    pub skip_geometry: bool,
    pub point_cloud: Option<PathBuf>,
    /// Seconds between numbered frames.
    pub frame_interval: f64,
    pub time_codes_per_second: f64,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            frames_dir: PathBuf::from("./images"),
            work_dir: PathBuf::from("./colmap_workspace"),
            output: PathBuf::from("photoreal_scene.usda"),
            scene_name: "twin".to_string(),
            photogrammetry: true,
            colmap: engine.program,
            feature_method: engine.feature_method,
            matching: engine.matching,
            quality: engine.quality,
            use_gpu: engine.use_gpu,
            gpu_index: engine.gpu_index,
            dense: engine.dense,
            stage_timeout_secs: engine.stage_timeout.as_secs(),
            scene_library: true,
            skip_geometry: false,
            point_cloud: None,
            frame_interval: 1.0,
            time_codes_per_second: 24.0,
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            program: self.colmap.clone(),
            feature_method: self.feature_method,
            matching: self.matching,
            quality: self.quality,
            use_gpu: self.use_gpu,
            gpu_index: self.gpu_index,
            dense: self.dense,
            stage_timeout: Duration::from_secs(self.stage_timeout_secs),
            ..EngineConfig::default()
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        let mut options = PipelineOptions::new(&self.frames_dir, &self.work_dir, &self.output)
            .with_scene_name(&self.scene_name)
            .with_photogrammetry(self.photogrammetry)
            .with_engine(self.engine_config())
            .with_scene_library(self.scene_library);
        if let Some(path) = &self.point_cloud {
            options = options.with_point_cloud(path);
        }
        options.skip_geometry = self.skip_geometry;
        options.frame_interval = self.frame_interval;
        options.time_codes_per_second = self.time_codes_per_second;
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_all_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.frames_dir, PathBuf::from("./images"));
        assert_eq!(config.logging.level, "info");
        assert!(config.dense);
        assert!(config.scene_library);
    }

    #[test]
    fn test_partial_config_maps_onto_options() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "output": "out/scene.usda",
                "matching": "sequential",
                "quality": "low",
                "dense": false,
                "scene_library": false,
                "point_cloud": "cloud.ply",
                "logging": { "level": "debug" }
            }"#,
        )
        .unwrap();
        let options = config.pipeline_options();
        assert_eq!(options.output_path, PathBuf::from("out/scene.usda"));
        assert_eq!(options.engine.matching, MatchingStrategy::Sequential);
        assert_eq!(options.engine.quality, Quality::Low);
        assert!(!options.engine.dense);
        assert!(!options.use_scene_library);
        assert_eq!(options.point_cloud, Some(PathBuf::from("cloud.ply")));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_reports_bad_json_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twin.json");
        fs::write(&path, "{ not json").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("twin.json"));

        let missing = AppConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
