//! Pipeline coordinator: reconstruction, assembly, serialization.
//!
//! Reconstruction problems never abort a run. An unavailable engine, a
//! failed stage, a sparse-only result or an empty cloud all degrade to
//! "no point cloud" and the scene falls back to a textured plane. Missing
//! frames, an unreadable point cloud and write failures are fatal.

use crate::capabilities::Capabilities;
use crate::options::PipelineOptions;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, instrument, warn};
use twin_capture::{CaptureError, DirectoryFrames, FrameSource};
use twin_data::{ArtifactStore, Frame, PointCloud, StoreError, load_point_cloud};
use twin_recon::{
    Availability, CommandRunner, ProcessRunner, ReconstructionEngine, ReconstructionResult,
    ReconstructionStatus, StageFailure,
};
use twin_scene::{EmitterKind, InputError, SceneAssembler, SerializationError, emitter_for};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to prepare workspace: {0}")]
    Store(#[from] StoreError),

    #[error("failed to read frames: {0}")]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Why a run produced no point-cloud geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    EngineUnavailable(String),
    StageFailed(StageFailure),
    SparseOnly,
    EmptyPointCloud,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::EngineUnavailable(reason) => {
                write!(f, "reconstruction skipped ({reason})")
            }
            Degradation::StageFailed(failure) => {
                write!(f, "reconstruction failed at {}", failure.stage)
            }
            Degradation::SparseOnly => write!(f, "sparse reconstruction only"),
            Degradation::EmptyPointCloud => write!(f, "point cloud is empty"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub scene_path: PathBuf,
    pub emitter: EmitterKind,
    pub frame_count: usize,
    pub point_count: usize,
    /// Frames dropped because another frame of the same camera had the
    /// same timestamp.
    pub merged_frames: usize,
    /// `None` when reconstruction was bypassed by a point-cloud override.
    pub reconstruction: Option<ReconstructionResult>,
    pub degradation: Option<Degradation>,
}

impl PipelineReport {
    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }
}

/// Sequences reconstruction, scene assembly and serialization.
pub struct Pipeline<R: CommandRunner = ProcessRunner> {
    options: PipelineOptions,
    capabilities: Capabilities,
    engine: ReconstructionEngine<R>,
}

impl Pipeline<ProcessRunner> {
    /// Build a pipeline around the real engine binary, probing capabilities.
    pub fn new(options: PipelineOptions) -> Self {
        let engine = ReconstructionEngine::with_process_runner(options.engine.clone());
        let capabilities = Capabilities::detect(&options, &engine);
        Self::with_engine(options, capabilities, engine)
    }
}

impl<R: CommandRunner> Pipeline<R> {
    pub fn with_engine(
        options: PipelineOptions,
        capabilities: Capabilities,
        engine: ReconstructionEngine<R>,
    ) -> Self {
        Self {
            options,
            capabilities,
            engine,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn engine(&self) -> &ReconstructionEngine<R> {
        &self.engine
    }

    /// Run on the frames found in the configured frames directory.
    pub fn run(&self) -> Result<PipelineReport, PipelineError> {
        let source = DirectoryFrames::new(&self.options.frames_dir)
            .with_interval(self.options.frame_interval);
        self.run_from(&source)
    }

    #[instrument(skip_all, fields(scene = %self.options.scene_name))]
    pub fn run_from(&self, source: &dyn FrameSource) -> Result<PipelineReport, PipelineError> {
        let frames = source.frames()?;
        info!("{} frames from {}", frames.len(), source.describe());
        if frames.is_empty() {
            return Err(InputError::NoFrames.into());
        }

        let store = self.options.store();
        store.prepare()?;

        let (cloud_path, reconstruction, mut degradation) = self.reconstruct(&frames, &store);
        let cloud = match &cloud_path {
            Some(path) => Some(load_point_cloud(path).map_err(InputError::from)?),
            None => None,
        };
        if cloud.as_ref().is_some_and(PointCloud::is_empty) {
            warn!("Point cloud is empty; using the textured plane");
            degradation.get_or_insert(Degradation::EmptyPointCloud);
        }

        let assembler = SceneAssembler::new(self.options.assembler_options(&store.scene_dir()));
        let graph = assembler.assemble(&frames, cloud.as_ref())?;
        let merged_frames = graph.merged_frames();
        if merged_frames > 0 {
            warn!("{} frames shared a camera timestamp and were merged", merged_frames);
        }

        let emitter = emitter_for(self.capabilities.scene_library);
        let scene_path = emitter.emit(&graph, store.scene_path())?;

        if let Some(degradation) = &degradation {
            warn!("Scene written in degraded mode: {}", degradation);
        }
        info!("Scene ready: {} ({})", scene_path.display(), emitter.kind());
        Ok(PipelineReport {
            scene_path,
            emitter: emitter.kind(),
            frame_count: frames.len(),
            point_count: cloud.as_ref().map_or(0, PointCloud::len),
            merged_frames,
            reconstruction,
            degradation,
        })
    }

    /// Point-cloud path to load, if any, and why there is none otherwise.
    fn reconstruct(
        &self,
        frames: &[Frame],
        store: &ArtifactStore,
    ) -> (Option<PathBuf>, Option<ReconstructionResult>, Option<Degradation>) {
        if let Some(path) = &self.options.point_cloud {
            info!("Using point cloud {}", path.display());
            return (Some(path.clone()), None, None);
        }

        let result = self.engine.run(&self.capabilities.engine, frames, store);
        let degradation = match &result.status {
            ReconstructionStatus::Complete => None,
            ReconstructionStatus::SparseOnly => Some(Degradation::SparseOnly),
            ReconstructionStatus::Failed(failure) => {
                warn!("Continuing without a point cloud: {}", failure);
                Some(Degradation::StageFailed(failure.clone()))
            }
            ReconstructionStatus::EngineUnavailable => {
                let reason = match &self.capabilities.engine {
                    Availability::Unavailable(reason) => reason.clone(),
                    Availability::Available => "engine unavailable".to_string(),
                };
                warn!("Continuing without reconstruction: {}", reason);
                Some(Degradation::EngineUnavailable(reason))
            }
        };
        (result.point_cloud_path.clone(), Some(result), degradation)
    }
}
