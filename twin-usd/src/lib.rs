//! Twin USD Crate
//!
//! A small structured API for authoring Universal Scene Description layers:
//! define prims at paths, create typed attributes and relationships, set
//! default values or time samples, and export the layer as USDA text.
//!
//! Values are checked against their declared attribute type when set, and
//! paths are validated when prims are defined, so a stage that exports is
//! structurally sound.
//!
//! ```ignore
//! use twin_usd::{SdfPath, Stage, Value, ValueType, Variability};
//!
//! let mut stage = Stage::new();
//! let world = SdfPath::new("/World")?;
//! stage.define_prim(&world, "Xform")?;
//! stage.set_default_prim("World");
//! let text = stage.export_to_string()?;
//! ```

mod error;
mod path;
mod stage;
mod value;
mod writer;

pub use error::UsdError;
pub use path::{SdfPath, is_valid_identifier};
pub use stage::{
    Attribute, Interpolation, PrimSpec, Property, Relationship, Stage, StageMetadata, UpAxis,
    Variability,
};
pub use value::{Value, ValueType};
pub use writer::format_real;
