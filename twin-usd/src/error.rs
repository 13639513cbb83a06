//! Error types for stage authoring and export.

use crate::path::SdfPath;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsdError {
    #[error("invalid prim path '{0}'")]
    InvalidPath(String),

    #[error("invalid identifier '{0}'")]
    InvalidName(String),

    #[error("prim {0} is already defined")]
    DuplicatePrim(SdfPath),

    #[error("parent of {0} is not defined")]
    MissingParent(SdfPath),

    #[error("property '{name}' already exists on {prim}")]
    DuplicateProperty { prim: SdfPath, name: String },

    #[error("attribute '{attribute}' holds {expected}, got {found}")]
    TypeMismatch {
        attribute: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{from} targets {target}, which is not defined")]
    UnknownTarget { from: String, target: String },

    #[error("default prim '{0}' is not a root prim of the stage")]
    MissingDefaultPrim(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
