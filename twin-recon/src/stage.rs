//! Reconstruction stages and the engine state machine
//!
//! ```text
//! NotStarted -> FeatureExtraction -> FeatureMatching -> SparseReconstruction
//!            -> DenseReconstruction -> StereoFusion -> Complete
//! ```
//!
//! With dense reconstruction disabled, `SparseReconstruction` is the last
//! stage and the machine ends in `SparseOnly`. Any running stage may move to
//! `Failed`, which is absorbing. `Unavailable` is only reachable from
//! `NotStarted`.

use std::fmt;
use thiserror::Error;

/// One ordered phase of the external reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    FeatureExtraction,
    FeatureMatching,
    SparseReconstruction,
    DenseReconstruction,
    StereoFusion,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::FeatureExtraction,
        Stage::FeatureMatching,
        Stage::SparseReconstruction,
        Stage::DenseReconstruction,
        Stage::StereoFusion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::FeatureExtraction => "feature extraction",
            Stage::FeatureMatching => "feature matching",
            Stage::SparseReconstruction => "sparse reconstruction",
            Stage::DenseReconstruction => "dense reconstruction",
            Stage::StereoFusion => "stereo fusion",
        }
    }

    /// The stage that follows this one, or `None` if this one is last.
    pub fn next(self, dense: bool) -> Option<Stage> {
        match self {
            Stage::FeatureExtraction => Some(Stage::FeatureMatching),
            Stage::FeatureMatching => Some(Stage::SparseReconstruction),
            Stage::SparseReconstruction if dense => Some(Stage::DenseReconstruction),
            Stage::SparseReconstruction => None,
            Stage::DenseReconstruction => Some(Stage::StereoFusion),
            Stage::StereoFusion => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage that did not produce its output.
///
/// Covers a non-zero exit, a timeout, a missing input artifact (the tool was
/// never invoked) and a missing output artifact after a clean exit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} failed: {diagnostics}")]
pub struct StageFailure {
    pub stage: Stage,
    pub diagnostics: String,
}

impl StageFailure {
    pub fn new(stage: Stage, diagnostics: impl Into<String>) -> Self {
        Self {
            stage,
            diagnostics: diagnostics.into(),
        }
    }
}

/// State of a single engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Running(Stage),
    Complete,
    SparseOnly,
    Failed(StageFailure),
    Unavailable,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineState::NotStarted | EngineState::Running(_))
    }

    /// State after `stage` finished cleanly.
    pub fn after_success(stage: Stage, dense: bool) -> Self {
        match stage.next(dense) {
            Some(next) => EngineState::Running(next),
            None if stage == Stage::SparseReconstruction => EngineState::SparseOnly,
            None => EngineState::Complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_chain_reaches_complete() {
        let mut state = EngineState::Running(Stage::FeatureExtraction);
        let mut visited = Vec::new();
        while let EngineState::Running(stage) = state {
            visited.push(stage);
            state = EngineState::after_success(stage, true);
        }
        assert_eq!(visited, Stage::ALL.to_vec());
        assert_eq!(state, EngineState::Complete);
    }

    #[test]
    fn test_sparse_only_when_dense_disabled() {
        assert_eq!(
            EngineState::after_success(Stage::SparseReconstruction, false),
            EngineState::SparseOnly
        );
        assert_eq!(Stage::SparseReconstruction.next(false), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!EngineState::NotStarted.is_terminal());
        assert!(!EngineState::Running(Stage::StereoFusion).is_terminal());
        assert!(EngineState::Unavailable.is_terminal());
        assert!(
            EngineState::Failed(StageFailure::new(Stage::FeatureMatching, "x")).is_terminal()
        );
    }
}
