//! Twin Application
//!
//! Builds a USDA digital-twin scene from a directory of captured frames.
//!
//! Steps:
//! - Reconstruct a point cloud with the external engine when it is present
//! - Assemble cameras plus points (or a textured plane)
//! - Write the scene through the scene library or as plain text

mod app;
mod config;

use app::AppBuilder;
use clap::Parser;
use config::{AppConfig, LoggingConfig};
use std::path::PathBuf;
use twin::recon::{MatchingStrategy, Quality};

/// Twin - photogrammetry to USD scene pipeline
#[derive(Parser, Debug)]
#[command(name = "twin")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of captured frames
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Reconstruction workspace
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// Scene file to write
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Use this PLY instead of running reconstruction
    #[arg(long)]
    point_cloud: Option<PathBuf>,

    /// Reconstruction engine executable
    #[arg(long)]
    colmap: Option<PathBuf>,

    /// Skip reconstruction entirely
    #[arg(long)]
    no_photogrammetry: bool,

    /// Stop after sparse reconstruction
    #[arg(long)]
    no_dense: bool,

    /// Write USDA text directly instead of through the scene library
    #[arg(long)]
    no_scene_library: bool,

    /// Image pair selection (exhaustive, sequential, spatial)
    #[arg(long)]
    matcher: Option<MatchingStrategy>,

    /// Reconstruction quality (low, medium, high, extreme)
    #[arg(long)]
    quality: Option<Quality>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(frames) = self.frames {
            config.frames_dir = frames;
        }
        if let Some(work_dir) = self.work_dir {
            config.work_dir = work_dir;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(point_cloud) = self.point_cloud {
            config.point_cloud = Some(point_cloud);
        }
        if let Some(colmap) = self.colmap {
            config.colmap = colmap;
        }
        if let Some(matcher) = self.matcher {
            config.matching = matcher;
        }
        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        config.photogrammetry &= !self.no_photogrammetry;
        config.dense &= !self.no_dense;
        config.scene_library &= !self.no_scene_library;
        if let Some(level) = self.log_level {
            config.logging = LoggingConfig { level };
        }
        config
    }
}

fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match AppConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Application error: {}", e);
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };

    if let Err(e) = AppBuilder::new().with_config(args.apply(config)).run() {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
