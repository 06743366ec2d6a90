use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transform::SimilarityTransform;

/// A layer identifier, unique within a scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A coordinate system shared by the overlay objects placed in it.
///
/// Layers do not stack; two layers only differ by their layer→world transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: LayerId,
    #[serde(default)]
    pub name: String,
    /// Layer→world transform.
    #[serde(default)]
    pub transform: SimilarityTransform,
    #[serde(default = "default_true")]
    pub visibility: bool,
    #[serde(default = "default_one")]
    pub opacity: f64,
    /// Multiplies every point size drawn in this layer.
    #[serde(default = "default_one")]
    pub point_size_factor: f64,
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_one() -> f64 {
    1.0
}

impl Layer {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: LayerId::from(id),
            name: name.to_string(),
            transform: SimilarityTransform::IDENTITY,
            visibility: true,
            opacity: 1.0,
            point_size_factor: 1.0,
        }
    }

    pub fn with_transform(mut self, transform: SimilarityTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_visibility(mut self, visibility: bool) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_point_size_factor(mut self, factor: f64) -> Self {
        self.point_size_factor = factor;
        self
    }
}
