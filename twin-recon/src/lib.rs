//! Twin Reconstruction Crate
//!
//! Drives an external multi-stage photogrammetry binary (COLMAP command
//! line conventions) one stage at a time and reports how far it got.
//!
//! ## Modules
//!
//! - [`stage`]: stage names and the engine state machine
//! - [`runner`]: blocking process execution with a timeout
//! - [`config`]: matching, feature and quality options
//! - [`engine`]: the stage driver itself
//!
//! Failures never escape as errors: a run always ends in a
//! [`ReconstructionStatus`], and the caller decides what a failure means.

pub mod config;
pub mod engine;
pub mod runner;
pub mod stage;

pub use config::{EngineConfig, FeatureMethod, MatchingStrategy, ParseOptionError, Quality};
pub use engine::{Availability, ReconstructionEngine, ReconstructionResult, ReconstructionStatus};
pub use runner::{CommandRunner, Invocation, ProcessRunner, RunError, RunOutput};
pub use stage::{EngineState, Stage, StageFailure};
