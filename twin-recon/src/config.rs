//! Engine options passed through to the external tool.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseOptionError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

/// Feature detector flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureMethod {
    /// Plain SIFT.
    #[default]
    Sift,
    /// Domain-size pooled SIFT with affine shape estimation.
    DspSift,
}

impl FeatureMethod {
    /// Extra feature extractor flags.
    pub fn extraction_flags(self) -> &'static [(&'static str, &'static str)] {
        match self {
            FeatureMethod::Sift => &[],
            FeatureMethod::DspSift => &[
                ("SiftExtraction.domain_size_pooling", "1"),
                ("SiftExtraction.estimate_affine_shape", "1"),
            ],
        }
    }

    /// Extra matcher flags.
    pub fn matching_flags(self) -> &'static [(&'static str, &'static str)] {
        match self {
            FeatureMethod::Sift => &[],
            FeatureMethod::DspSift => &[("SiftMatching.guided_matching", "1")],
        }
    }
}

impl FromStr for FeatureMethod {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sift" => Ok(FeatureMethod::Sift),
            "dsp-sift" | "dspsift" => Ok(FeatureMethod::DspSift),
            _ => Err(ParseOptionError {
                kind: "feature method",
                value: s.to_string(),
                expected: "sift, dsp-sift",
            }),
        }
    }
}

/// How image pairs are chosen for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchingStrategy {
    /// Every pair; slow but robust for small frame sets.
    #[default]
    Exhaustive,
    /// Neighbors in capture order; suited to video-like sequences.
    Sequential,
    /// Neighbors by position prior.
    Spatial,
}

impl MatchingStrategy {
    pub fn command(self) -> &'static str {
        match self {
            MatchingStrategy::Exhaustive => "exhaustive_matcher",
            MatchingStrategy::Sequential => "sequential_matcher",
            MatchingStrategy::Spatial => "spatial_matcher",
        }
    }
}

impl FromStr for MatchingStrategy {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exhaustive" => Ok(MatchingStrategy::Exhaustive),
            "sequential" => Ok(MatchingStrategy::Sequential),
            "spatial" => Ok(MatchingStrategy::Spatial),
            _ => Err(ParseOptionError {
                kind: "matching strategy",
                value: s.to_string(),
                expected: "exhaustive, sequential, spatial",
            }),
        }
    }
}

/// Reconstruction quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
    Extreme,
}

impl Quality {
    /// Largest image dimension fed to extraction and stereo.
    pub fn max_image_size(self) -> u32 {
        match self {
            Quality::Low => 1000,
            Quality::Medium => 1600,
            Quality::High => 2400,
            Quality::Extreme => 3200,
        }
    }
}

impl FromStr for Quality {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "extreme" => Ok(Quality::Extreme),
            _ => Err(ParseOptionError {
                kind: "quality",
                value: s.to_string(),
                expected: "low, medium, high, extreme",
            }),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::Extreme => "extreme",
        };
        f.write_str(name)
    }
}

/// Configuration for [`ReconstructionEngine`](crate::ReconstructionEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine executable.
    pub program: PathBuf,
    pub feature_method: FeatureMethod,
    pub matching: MatchingStrategy,
    pub quality: Quality,
    pub use_gpu: bool,
    pub gpu_index: u32,
    /// Run dense reconstruction and stereo fusion after the sparse model.
    pub dense: bool,
    /// Wall-clock budget for one stage (all of its invocations).
    pub stage_timeout: Duration,
    /// Budget for the availability probe.
    pub probe_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("colmap"),
            feature_method: FeatureMethod::default(),
            matching: MatchingStrategy::default(),
            quality: Quality::default(),
            use_gpu: true,
            gpu_index: 0,
            dense: true,
            stage_timeout: Duration::from_secs(60 * 60),
            probe_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_dense(mut self, dense: bool) -> Self {
        self.dense = dense;
        self
    }

    pub fn with_matching(mut self, matching: MatchingStrategy) -> Self {
        self.matching = matching;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        assert_eq!("Sequential".parse::<MatchingStrategy>(), Ok(MatchingStrategy::Sequential));
        assert_eq!("dsp-sift".parse::<FeatureMethod>(), Ok(FeatureMethod::DspSift));
        assert_eq!("high".parse::<Quality>(), Ok(Quality::High));
        let err = "fast".parse::<Quality>().unwrap_err();
        assert!(err.to_string().contains("low, medium, high, extreme"));
    }

    #[test]
    fn test_quality_sizes_increase() {
        let sizes: Vec<_> = [Quality::Low, Quality::Medium, Quality::High, Quality::Extreme]
            .iter()
            .map(|q| q.max_image_size())
            .collect();
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
    }
}
