//! Stage driver for the external photogrammetry engine.

use crate::config::EngineConfig;
use crate::runner::{CommandRunner, Invocation, ProcessRunner, RunError};
use crate::stage::{EngineState, Stage, StageFailure};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use twin_data::{ArtifactStore, Frame, is_non_empty};

/// Lines of engine stderr kept in a failure report.
const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// Outcome of probing for the engine binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// How a reconstruction run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconstructionStatus {
    /// Dense point cloud written.
    Complete,
    /// Sparse model only; no point cloud file.
    SparseOnly,
    Failed(StageFailure),
    /// The engine binary was not found; nothing was attempted.
    EngineUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructionResult {
    pub status: ReconstructionStatus,
    /// Fused point cloud; set only for [`ReconstructionStatus::Complete`].
    pub point_cloud_path: Option<PathBuf>,
    /// Stages whose external invocations actually ran, in order.
    pub stages_run: Vec<Stage>,
}

/// Runs the engine one stage at a time, validating artifacts in between.
pub struct ReconstructionEngine<R: CommandRunner = ProcessRunner> {
    config: EngineConfig,
    runner: R,
}

impl ReconstructionEngine<ProcessRunner> {
    pub fn with_process_runner(config: EngineConfig) -> Self {
        Self::new(config, ProcessRunner::new())
    }
}

impl<R: CommandRunner> ReconstructionEngine<R> {
    pub fn new(config: EngineConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Check that the engine binary starts and answers `help`.
    pub fn probe(&self) -> Availability {
        let invocation = Invocation::new(&self.config.program).arg("help");
        match self.runner.run(&invocation, self.config.probe_timeout) {
            Ok(output) if output.success() => {
                info!("Reconstruction engine found at {}", self.config.program.display());
                Availability::Available
            }
            Ok(output) => Availability::Unavailable(format!(
                "{} help exited with status {:?}",
                self.config.program.display(),
                output.status
            )),
            Err(e) => Availability::Unavailable(e.to_string()),
        }
    }

    /// Drive the state machine from `NotStarted` to a terminal state.
    ///
    /// `availability` is the cached result of [`probe`](Self::probe); when it
    /// reports the engine missing, no stage is invoked.
    #[tracing::instrument(skip_all, fields(frames = frames.len(), work_dir = %store.work_dir().display()))]
    pub fn run(
        &self,
        availability: &Availability,
        frames: &[Frame],
        store: &ArtifactStore,
    ) -> ReconstructionResult {
        let mut stages_run = Vec::new();
        let mut state = EngineState::NotStarted;

        while !state.is_terminal() {
            state = match state {
                EngineState::NotStarted => match availability {
                    Availability::Available => EngineState::Running(Stage::FeatureExtraction),
                    Availability::Unavailable(reason) => {
                        warn!("Reconstruction engine unavailable: {}", reason);
                        EngineState::Unavailable
                    }
                },
                EngineState::Running(stage) => match self.step(stage, frames, store, &mut stages_run) {
                    Ok(()) => EngineState::after_success(stage, self.config.dense),
                    Err(failure) => {
                        error!("Pipeline failed at {}: {}", stage, failure.diagnostics);
                        EngineState::Failed(failure)
                    }
                },
                terminal => terminal,
            };
        }

        let (status, point_cloud_path) = match state {
            EngineState::Complete => {
                let path = store.fused_point_cloud();
                info!("Reconstruction complete: {}", path.display());
                (ReconstructionStatus::Complete, Some(path))
            }
            EngineState::SparseOnly => {
                info!("Reconstruction finished at sparse resolution");
                (ReconstructionStatus::SparseOnly, None)
            }
            EngineState::Failed(failure) => (ReconstructionStatus::Failed(failure), None),
            _ => (ReconstructionStatus::EngineUnavailable, None),
        };
        ReconstructionResult {
            status,
            point_cloud_path,
            stages_run,
        }
    }

    fn step(
        &self,
        stage: Stage,
        frames: &[Frame],
        store: &ArtifactStore,
        stages_run: &mut Vec<Stage>,
    ) -> Result<(), StageFailure> {
        let fail = |message: String| StageFailure::new(stage, message);

        self.check_inputs(stage, frames, store).map_err(fail)?;
        let invocations = self.invocations(stage, frames, store);

        info!("Starting {}", stage);
        stages_run.push(stage);
        let start = Instant::now();
        for invocation in &invocations {
            let remaining = self.config.stage_timeout.saturating_sub(start.elapsed());
            self.invoke(invocation, remaining).map_err(fail)?;
        }

        self.check_outputs(stage, store).map_err(fail)?;
        info!(
            "{} completed successfully in {:.2} seconds",
            stage,
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn invoke(&self, invocation: &Invocation, timeout: Duration) -> Result<(), String> {
        let name = invocation.subcommand().unwrap_or("engine").to_string();
        match self.runner.run(invocation, timeout) {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => {
                let status = output
                    .status
                    .map_or_else(|| "a signal".to_string(), |code| format!("status {code}"));
                Err(format!("{name} exited with {status}\n{}", tail(&output.stderr)))
            }
            Err(RunError::Timeout { elapsed }) => Err(format!(
                "{name} timed out after {:.1}s and was terminated",
                elapsed.as_secs_f64()
            )),
            Err(e) => Err(format!("{name}: {e}")),
        }
    }

    /// Preconditions: the previous stage's artifacts exist and are non-empty.
    fn check_inputs(&self, stage: Stage, frames: &[Frame], store: &ArtifactStore) -> Result<(), String> {
        match stage {
            Stage::FeatureExtraction => {
                if frames.is_empty() {
                    return Err("no frames to reconstruct from".to_string());
                }
                // Every later check must see only what this run produced.
                store.clear_outputs().map_err(|e| e.to_string())?;
                for frame in frames {
                    if !is_non_empty(&frame.path) {
                        return Err(format!("missing or empty frame {}", frame.path.display()));
                    }
                    if frame_relative_name(frame, store.frames_dir()).is_none() {
                        return Err(format!(
                            "frame {} is outside {}",
                            frame.path.display(),
                            store.frames_dir().display()
                        ));
                    }
                }
                write_image_list(frames, store)
            }
            Stage::FeatureMatching | Stage::SparseReconstruction => {
                require(&store.database_path())
            }
            Stage::DenseReconstruction => require(&store.sparse_model_dir()),
            Stage::StereoFusion => require(&store.depth_maps_dir()),
        }
    }

    fn check_outputs(&self, stage: Stage, store: &ArtifactStore) -> Result<(), String> {
        match stage {
            Stage::FeatureExtraction => require(&store.database_path()),
            Stage::SparseReconstruction => require(&store.sparse_model_dir()),
            Stage::StereoFusion => require(&store.fused_point_cloud()),
            Stage::FeatureMatching | Stage::DenseReconstruction => Ok(()),
        }
    }

    fn invocations(&self, stage: Stage, frames: &[Frame], store: &ArtifactStore) -> Vec<Invocation> {
        let cfg = &self.config;
        let engine = || Invocation::new(&cfg.program).current_dir(store.work_dir());
        let gpu = if cfg.use_gpu { 1 } else { 0 };
        let max_size = cfg.quality.max_image_size();

        match stage {
            Stage::FeatureExtraction => {
                let mut cameras: Vec<&str> = frames.iter().map(|f| f.camera_id.as_str()).collect();
                cameras.sort_unstable();
                cameras.dedup();
                let single = if cameras.len() == 1 { 1 } else { 0 };

                let mut inv = engine()
                    .arg("feature_extractor")
                    .path_flag("database_path", &store.database_path())
                    .path_flag("image_path", store.frames_dir())
                    .path_flag("image_list_path", &store.image_list_path())
                    .flag("ImageReader.camera_model", "SIMPLE_RADIAL")
                    .flag("ImageReader.single_camera", single)
                    .flag("SiftExtraction.use_gpu", gpu)
                    .flag("SiftExtraction.gpu_index", cfg.gpu_index)
                    .flag("SiftExtraction.max_image_size", max_size);
                for (name, value) in cfg.feature_method.extraction_flags() {
                    inv = inv.flag(name, value);
                }
                vec![inv]
            }
            Stage::FeatureMatching => {
                let mut inv = engine()
                    .arg(cfg.matching.command())
                    .path_flag("database_path", &store.database_path())
                    .flag("SiftMatching.use_gpu", gpu)
                    .flag("SiftMatching.gpu_index", cfg.gpu_index);
                for (name, value) in cfg.feature_method.matching_flags() {
                    inv = inv.flag(name, value);
                }
                vec![inv]
            }
            Stage::SparseReconstruction => vec![
                engine()
                    .arg("mapper")
                    .path_flag("database_path", &store.database_path())
                    .path_flag("image_path", store.frames_dir())
                    .path_flag("output_path", &store.sparse_dir()),
            ],
            Stage::DenseReconstruction => vec![
                engine()
                    .arg("image_undistorter")
                    .path_flag("image_path", store.frames_dir())
                    .path_flag("input_path", &store.sparse_model_dir())
                    .path_flag("output_path", &store.dense_dir())
                    .flag("output_type", "COLMAP")
                    .flag("max_image_size", max_size),
                engine()
                    .arg("patch_match_stereo")
                    .path_flag("workspace_path", &store.dense_dir())
                    .flag("workspace_format", "COLMAP")
                    .flag("PatchMatchStereo.geom_consistency", "true")
                    .flag("PatchMatchStereo.gpu_index", cfg.gpu_index)
                    .flag("PatchMatchStereo.max_image_size", max_size),
            ],
            Stage::StereoFusion => vec![
                engine()
                    .arg("stereo_fusion")
                    .path_flag("workspace_path", &store.dense_dir())
                    .flag("workspace_format", "COLMAP")
                    .flag("input_type", "geometric")
                    .path_flag("output_path", &store.fused_point_cloud()),
            ],
        }
    }
}

fn require(path: &Path) -> Result<(), String> {
    if is_non_empty(path) {
        Ok(())
    } else {
        Err(format!("required artifact missing or empty: {}", path.display()))
    }
}

/// Frame path relative to the frames directory, with `/` separators.
fn frame_relative_name(frame: &Frame, frames_dir: &Path) -> Option<String> {
    let relative = frame
        .path
        .strip_prefix(frames_dir)
        .ok()
        .map(Path::to_path_buf)
        .or_else(|| {
            let base = std::path::absolute(frames_dir).ok()?;
            let path = std::path::absolute(&frame.path).ok()?;
            path.strip_prefix(&base).ok().map(Path::to_path_buf)
        })?;
    let name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    (!name.is_empty()).then_some(name)
}

// The engine reads images in list order, which keeps capture order.
fn write_image_list(frames: &[Frame], store: &ArtifactStore) -> Result<(), String> {
    let mut list = String::new();
    for frame in frames {
        if let Some(name) = frame_relative_name(frame, store.frames_dir()) {
            list.push_str(&name);
            list.push('\n');
        }
    }
    let path = store.image_list_path();
    fs::write(&path, list).map_err(|e| format!("failed to write {}: {e}", path.display()))
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    lines[start..].join("\n")
}
