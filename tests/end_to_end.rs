//! Whole-pipeline runs against a scripted reconstruction engine.

use image::{Rgb, RgbImage};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use twin::capture::{CaptureError, FrameSource};
use twin::data::{ArtifactStore, Frame};
use twin::recon::{
    Availability, CommandRunner, EngineConfig, Invocation, ReconstructionEngine, RunError,
    RunOutput, Stage,
};
use twin::scene::{EmitterKind, InputError};
use twin::{Capabilities, Degradation, Pipeline, PipelineError, PipelineOptions};

const UNCOLORED_PLY: &str = "ply\nformat ascii 1.0\nelement vertex 3\n\
    property float x\nproperty float y\nproperty float z\n\
    end_header\n0 0 0\n1 0 0\n0 1 0\n";

/// Stands in for the engine binary, producing each stage's artifacts.
struct FakeEngine {
    store: ArtifactStore,
    missing: bool,
    fail_on: Option<&'static str>,
    calls: RefCell<Vec<String>>,
}

impl FakeEngine {
    fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            missing: false,
            fail_on: None,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl CommandRunner for FakeEngine {
    fn run(&self, invocation: &Invocation, _timeout: Duration) -> Result<RunOutput, RunError> {
        if self.missing {
            return Err(RunError::NotFound(invocation.program.clone()));
        }
        let sub = invocation.subcommand().unwrap_or_default().to_string();
        self.calls.borrow_mut().push(sub.clone());
        if self.fail_on == Some(sub.as_str()) {
            return Ok(RunOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: "no good matches".to_string(),
            });
        }

        let s = &self.store;
        match sub.as_str() {
            "feature_extractor" => fs::write(s.database_path(), b"db").unwrap(),
            "mapper" => {
                fs::create_dir_all(s.sparse_model_dir()).unwrap();
                fs::write(s.sparse_model_dir().join("points3D.bin"), b"pts").unwrap();
            }
            "patch_match_stereo" => {
                fs::create_dir_all(s.depth_maps_dir()).unwrap();
                fs::write(s.depth_maps_dir().join("cam_img_000000.png.geometric.bin"), b"d")
                    .unwrap();
            }
            "stereo_fusion" => fs::write(s.fused_point_cloud(), UNCOLORED_PLY).unwrap(),
            _ => {}
        }
        Ok(RunOutput {
            status: Some(0),
            ..RunOutput::default()
        })
    }
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// `count` frames from one camera, each a solid color.
    fn with_frames(count: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir_all(&frames).unwrap();
        for i in 0..count {
            let shade = (i * 50) as u8;
            RgbImage::from_pixel(8, 8, Rgb([shade, 100, 200]))
                .save(frames.join(format!("cam_img_{i:06}.png")))
                .unwrap();
        }
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions::new(self.path("frames"), self.path("work"), self.path("scene.usda"))
            .with_scene_library(false)
    }

    fn pipeline(&self, options: PipelineOptions, engine: FakeEngine) -> Pipeline<FakeEngine> {
        let engine = ReconstructionEngine::new(options.engine.clone(), engine);
        let capabilities = Capabilities::detect(&options, &engine);
        Pipeline::with_engine(options, capabilities, engine)
    }

    fn engine(&self) -> FakeEngine {
        FakeEngine::new(self.options().store())
    }

    fn scene(&self) -> String {
        fs::read_to_string(self.path("scene.usda")).unwrap()
    }
}

fn count(text: &str, needle: &str) -> usize {
    text.matches(needle).count()
}

#[test]
fn test_sparse_only_run_falls_back_to_textured_plane() {
    let fixture = Fixture::with_frames(5);
    let options = fixture
        .options()
        .with_engine(EngineConfig::default().with_dense(false));
    let pipeline = fixture.pipeline(options, fixture.engine());

    let report = pipeline.run().unwrap();
    assert_eq!(report.frame_count, 5);
    assert_eq!(report.point_count, 0);
    assert_eq!(report.degradation, Some(Degradation::SparseOnly));
    assert_eq!(report.emitter, EmitterKind::Text);
    let reconstruction = report.reconstruction.unwrap();
    assert_eq!(
        reconstruction.stages_run,
        vec![
            Stage::FeatureExtraction,
            Stage::FeatureMatching,
            Stage::SparseReconstruction
        ]
    );

    let scene = fixture.scene();
    assert_eq!(count(&scene, "def Camera \""), 1);
    assert!(scene.contains("def Camera \"cam\""));
    assert_eq!(count(&scene, ": ("), 10, "5 keyframes x 2 transform ops");
    assert_eq!(count(&scene, "def Mesh \"Plane\""), 1);
    assert_eq!(count(&scene, "def Material \"FrameMaterial\""), 1);
    assert!(scene.contains("asset inputs:file = @./frames/cam_img_000000.png@"));
    assert!(!scene.contains("def Points"));
}

#[test]
fn test_dense_cloud_becomes_points_with_sampled_colors() {
    let fixture = Fixture::with_frames(5);
    let pipeline = fixture.pipeline(fixture.options(), fixture.engine());

    let report = pipeline.run().unwrap();
    assert!(!report.is_degraded());
    assert_eq!(report.point_count, 3);
    assert_eq!(report.merged_frames, 0);

    let scene = fixture.scene();
    assert_eq!(count(&scene, "def Points \"PointCloud\""), 1);
    assert!(scene.contains("# 3 of 3 colors sampled from frame centers."));
    // Points map onto frames 0, 2 and 4, whose red channel is 0, 100 and 200.
    assert!(scene.contains(
        "color3f[] primvars:displayColor = [(0, 0.392157, 0.784314), \
         (0.392157, 0.392157, 0.784314), (0.784314, 0.392157, 0.784314)]"
    ));
    assert!(!scene.contains("def Mesh"));
    assert!(!scene.contains("def Material"));
}

/// A fixed frame list, as a capture manifest would supply it.
struct ListedFrames(Vec<Frame>);

impl FrameSource for ListedFrames {
    fn describe(&self) -> String {
        format!("{} listed frames", self.0.len())
    }

    fn frames(&self) -> Result<Vec<Frame>, CaptureError> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_repeated_timestamps_are_reported_as_merged() {
    let fixture = Fixture::with_frames(3);
    let frame = |i: usize, t: f64| {
        Frame::new(fixture.path("frames").join(format!("cam_img_{i:06}.png")), "cam", t)
    };
    let source = ListedFrames(vec![frame(0, 0.0), frame(1, 0.0), frame(2, 1.0)]);
    let options = fixture
        .options()
        .with_engine(EngineConfig::default().with_dense(false));
    let pipeline = fixture.pipeline(options, fixture.engine());

    let report = pipeline.run_from(&source).unwrap();
    assert_eq!(report.frame_count, 3);
    assert_eq!(report.merged_frames, 1);
    assert_eq!(count(&fixture.scene(), ": ("), 4, "2 keyframes x 2 transform ops");
}

#[test]
fn test_missing_engine_degrades_instead_of_failing() {
    let fixture = Fixture::with_frames(2);
    let mut engine = fixture.engine();
    engine.missing = true;
    let pipeline = fixture.pipeline(fixture.options(), engine);
    assert!(!pipeline.capabilities().engine_available());

    let report = pipeline.run().unwrap();
    assert!(matches!(report.degradation, Some(Degradation::EngineUnavailable(_))));
    assert!(report.reconstruction.unwrap().stages_run.is_empty());
    assert!(fixture.scene().contains("def Mesh \"Plane\""));
}

#[test]
fn test_matching_failure_stops_later_stages() {
    let fixture = Fixture::with_frames(3);
    let mut engine = fixture.engine();
    engine.fail_on = Some("exhaustive_matcher");
    let pipeline = fixture.pipeline(fixture.options(), engine);

    let report = pipeline.run().unwrap();
    match &report.degradation {
        Some(Degradation::StageFailed(failure)) => {
            assert_eq!(failure.stage, Stage::FeatureMatching);
            assert!(failure.diagnostics.contains("no good matches"));
        }
        other => panic!("expected a stage failure, got {other:?}"),
    }
    let calls = pipeline.engine().runner().calls.borrow().clone();
    assert_eq!(calls, vec!["help", "feature_extractor", "exhaustive_matcher"]);
    assert!(fixture.scene().contains("def Mesh \"Plane\""));
}

#[test]
fn test_no_frames_is_an_input_error() {
    let fixture = Fixture::with_frames(0);
    let pipeline = fixture.pipeline(fixture.options(), fixture.engine());

    let err = pipeline.run().unwrap_err();
    assert!(matches!(err, PipelineError::Input(InputError::NoFrames)));
    assert!(!fixture.path("scene.usda").exists());
}

#[test]
fn test_corrupt_point_cloud_is_an_input_error() {
    let fixture = Fixture::with_frames(2);
    let ply = fixture.path("broken.ply");
    fs::write(&ply, "this is not a ply file\n").unwrap();
    let options = fixture.options().with_point_cloud(&ply);
    let pipeline = fixture.pipeline(options, fixture.engine());
    assert!(matches!(pipeline.capabilities().engine, Availability::Unavailable(_)));

    let err = pipeline.run().unwrap_err();
    assert!(matches!(err, PipelineError::Input(InputError::PointCloud(_))));
    assert!(!fixture.path("scene.usda").exists());
    assert!(pipeline.engine().runner().calls.borrow().is_empty());
}

#[test]
fn test_point_cloud_override_skips_reconstruction() {
    let fixture = Fixture::with_frames(2);
    let ply = fixture.path("given.ply");
    fs::write(&ply, UNCOLORED_PLY).unwrap();
    let options = fixture.options().with_point_cloud(&ply);
    let pipeline = fixture.pipeline(options, fixture.engine());

    let report = pipeline.run().unwrap();
    assert!(report.reconstruction.is_none());
    assert!(report.degradation.is_none());
    assert_eq!(report.point_count, 3);
    assert!(pipeline.engine().runner().calls.borrow().is_empty());
}

#[test]
fn test_disabled_photogrammetry_never_probes() {
    let fixture = Fixture::with_frames(2);
    let options = fixture.options().with_photogrammetry(false);
    let pipeline = fixture.pipeline(options, fixture.engine());

    let report = pipeline.run().unwrap();
    assert!(matches!(report.degradation, Some(Degradation::EngineUnavailable(_))));
    assert!(pipeline.engine().runner().calls.borrow().is_empty());
}

#[cfg(feature = "usd")]
#[test]
fn test_library_and_text_paths_declare_the_same_prims() {
    fn declarations(text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|line| line.starts_with("def "))
            .map(str::to_string)
            .collect()
    }

    let fixture = Fixture::with_frames(4);
    let mut outputs = Vec::new();
    for library in [true, false] {
        let options = fixture
            .options()
            .with_scene_library(library)
            .with_engine(EngineConfig::default().with_dense(false));
        let pipeline = fixture.pipeline(options, fixture.engine());
        let report = pipeline.run().unwrap();
        let expected = if library { EmitterKind::Library } else { EmitterKind::Text };
        assert_eq!(report.emitter, expected);
        outputs.push(fixture.scene());
    }
    assert_eq!(declarations(&outputs[0]), declarations(&outputs[1]));
    assert!(!outputs[0].contains("\n#"));
}
