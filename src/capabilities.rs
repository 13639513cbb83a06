//! What this run can use, detected once at startup.

use crate::options::PipelineOptions;
use tracing::info;
use twin_recon::{Availability, CommandRunner, ReconstructionEngine};

/// Capability record passed explicitly to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub engine: Availability,
    /// The structured scene library is built in and wanted.
    pub scene_library: bool,
}

impl Capabilities {
    /// Probe the reconstruction engine (unless disabled or overridden by a
    /// point cloud) and check for the scene library.
    pub fn detect<R: CommandRunner>(
        options: &PipelineOptions,
        engine: &ReconstructionEngine<R>,
    ) -> Self {
        let engine = if !options.photogrammetry {
            Availability::Unavailable("photogrammetry disabled by configuration".to_string())
        } else if let Some(path) = &options.point_cloud {
            Availability::Unavailable(format!("point cloud supplied: {}", path.display()))
        } else {
            engine.probe()
        };
        let scene_library = options.use_scene_library && twin_scene::library_available();

        info!(
            "Capabilities: engine={}, scene library={}",
            if engine.is_available() { "available" } else { "unavailable" },
            scene_library
        );
        Self {
            engine,
            scene_library,
        }
    }

    pub fn engine_available(&self) -> bool {
        self.engine.is_available()
    }
}
