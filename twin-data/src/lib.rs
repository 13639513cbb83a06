//! Twin Data Crate
//!
//! Plain data shared by every stage of the pipeline: captured frames,
//! reconstructed point clouds, PLY parsing, and the directory layout that
//! holds frames, intermediate reconstruction artifacts and the final scene.
//! Nothing in here talks to the reconstruction engine or writes scenes.

pub mod ply;
pub mod store;
pub mod types;

pub use ply::{PlyError, load_point_cloud};
pub use store::{ArtifactStore, StoreError, asset_reference, is_non_empty, relative_path};
pub use types::{Frame, Point, PointCloud, sort_frames};
