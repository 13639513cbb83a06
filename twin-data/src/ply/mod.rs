//! PLY file loading and parsing

mod loader;

pub use loader::{PlyError, load_point_cloud};
