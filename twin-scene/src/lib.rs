//! Twin Scene Crate
//!
//! Turns captured frames and an optional point cloud into a [`SceneGraph`],
//! then writes it as a USDA layer.
//!
//! ## Modules
//!
//! - [`graph`]: prim tree with per-kind data and structural validation
//! - [`assembler`]: builds the graph, choosing point or plane geometry
//! - [`serializer`]: interchangeable emitters (structured stage or direct text)

pub mod assembler;
mod color;
pub mod graph;
pub mod serializer;

pub use assembler::{AssemblerOptions, InputError, SceneAssembler};
pub use graph::{
    CameraData, CameraPose, GraphError, Lens, MaterialData, MaterialNetwork, MeshData, PointsData,
    Prim, PrimData, PrimKind, PrimPath, SceneGraph, TimeRange,
};
pub use serializer::{
    EmitterKind, SceneEmitter, SerializationError, TextEmitter, emitter_for, library_available,
};

#[cfg(feature = "usd")]
pub use serializer::UsdStageEmitter;
