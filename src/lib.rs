//! Twin
//!
//! Turns captured camera frames, plus a point cloud from an external
//! photogrammetry engine when one can be produced, into a USDA scene.
//!
//! The [`Pipeline`] runs three steps in order:
//!
//! 1. reconstruction through [`twin_recon`], whose failures are absorbed;
//! 2. scene assembly through [`twin_scene::SceneAssembler`];
//! 3. serialization through the emitter selected from [`Capabilities`].
//!
//! ```ignore
//! use twin::{Pipeline, PipelineOptions};
//!
//! let options = PipelineOptions::new("./images", "./work", "./scene.usda");
//! let report = Pipeline::new(options).run()?;
//! println!("{}", report.scene_path.display());
//! ```

mod capabilities;
mod options;
mod pipeline;

pub use capabilities::Capabilities;
pub use options::PipelineOptions;
pub use pipeline::{Degradation, Pipeline, PipelineError, PipelineReport};

pub use twin_capture as capture;
pub use twin_data as data;
pub use twin_recon as recon;
pub use twin_scene as scene;
