use serde::{Deserialize, Serialize};

use crate::binding::BindingMaps;
use crate::layer::{Layer, LayerId};
use crate::object::{ImageObject, LabelsObject, PointsObject, ShapesObject, Table};

/// The declarative scene: layers, tables, overlay objects, and value maps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Scene {
    pub layers: Vec<Layer>,
    pub tables: Vec<Table>,
    pub images: Vec<ImageObject>,
    pub labels: Vec<LabelsObject>,
    pub points: Vec<PointsObject>,
    pub shapes: Vec<ShapesObject>,
    pub maps: BindingMaps,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lookup ───────────────────────────────────────────────────────

    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    pub fn layer_mut(&mut self, id: &LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| &l.id == id)
    }

    pub fn table(&self, id: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    pub fn points_mut(&mut self, id: &str) -> Option<&mut PointsObject> {
        self.points.iter_mut().find(|p| p.id.as_str() == id)
    }

    pub fn shapes_mut(&mut self, id: &str) -> Option<&mut ShapesObject> {
        self.shapes.iter_mut().find(|s| s.id.as_str() == id)
    }

    pub fn visible_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.visibility)
    }

    // ── Serialization ────────────────────────────────────────────────

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
