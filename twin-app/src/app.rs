//! Application runner with builder pattern.

use crate::config::{AppConfig, LoggingConfig};
use std::error::Error;
use twin::{Pipeline, PipelineReport};

/// Builder for configuring and running one pipeline invocation.
pub struct AppBuilder {
    config: AppConfig,
    logging: LoggingConfig,
}

impl AppBuilder {
    /// Create a new AppBuilder with default settings.
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Use settings loaded from a config file (or assembled by the CLI).
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.logging = config.logging.clone();
        self.config = config;
        self
    }

    /// Run the pipeline and print where the scene went.
    pub fn run(self) -> Result<PipelineReport, Box<dyn Error>> {
        self.init_logging();

        let options = self.config.pipeline_options();
        tracing::info!(
            "Building scene from {} into {}",
            options.frames_dir.display(),
            options.output_path.display()
        );
        let report = Pipeline::new(options).run()?;

        println!("Scene written to {}", report.scene_path.display());
        if let Some(degradation) = &report.degradation {
            println!("Note: {degradation}; the scene uses fallback geometry");
        }
        if report.merged_frames > 0 {
            println!(
                "Note: {} frames repeated a camera timestamp and were merged",
                report.merged_frames
            );
        }
        Ok(report)
    }

    fn init_logging(&self) {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.logging.level)),
            )
            .with_target(false)
            .init();
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
