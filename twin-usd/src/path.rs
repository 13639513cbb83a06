//! Absolute prim paths.

use crate::error::UsdError;
use std::fmt;

/// An absolute prim path such as `/World/Cameras/front`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SdfPath(String);

impl SdfPath {
    /// Parse an absolute prim path. The pseudo-root `/` is not a prim path.
    pub fn new(path: &str) -> Result<Self, UsdError> {
        let invalid = || UsdError::InvalidPath(path.to_string());
        let rest = path.strip_prefix('/').ok_or_else(invalid)?;
        if rest.is_empty() || !rest.split('/').all(is_valid_identifier) {
            return Err(invalid());
        }
        Ok(Self(path.to_string()))
    }

    pub fn append_child(&self, name: &str) -> Result<Self, UsdError> {
        if !is_valid_identifier(name) {
            return Err(UsdError::InvalidName(name.to_string()));
        }
        Ok(Self(format!("{}/{}", self.0, name)))
    }

    /// Path of a property on this prim, e.g. `/World/Mat.outputs:surface`.
    pub fn property(&self, name: &str) -> String {
        format!("{}.{}", self.0, name)
    }

    /// Last path element.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Parent prim path; `None` for root prims.
    pub fn parent(&self) -> Option<SdfPath> {
        let (parent, _) = self.0.rsplit_once('/')?;
        (!parent.is_empty()).then(|| SdfPath(parent.to_string()))
    }

    pub fn depth(&self) -> usize {
        self.0.matches('/').count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SdfPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
