use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::binding::Binding;
use crate::color::Color;
use crate::layer::{default_one, default_true, Layer, LayerId};
use crate::marker::Marker;
use crate::transform::SimilarityTransform;

/// An overlay object identifier, unique among objects of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw data-source description. Only the loader registered for `kind`
/// interprets `options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl DataSource {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }
}

/// A project table that bindings can reference by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub data_source: DataSource,
}

/// Reference to a column of a project table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

/// Where a layer config places its object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerSource {
    /// Every item goes to this layer.
    Id(LayerId),
    /// Each item names its layer in a table column.
    Column(ColumnRef),
}

/// Places an overlay object into a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub layer: LayerSource,
    #[serde(default)]
    pub flip: bool,
    /// Data→layer transform.
    #[serde(default)]
    pub transform: SimilarityTransform,
}

impl LayerConfig {
    pub fn new(layer_id: &str) -> Self {
        Self {
            layer: LayerSource::Id(LayerId::from(layer_id)),
            flip: false,
            transform: SimilarityTransform::IDENTITY,
        }
    }

    pub fn from_column(table: &str, column: &str) -> Self {
        Self {
            layer: LayerSource::Column(ColumnRef {
                table: table.to_string(),
                column: column.to_string(),
            }),
            flip: false,
            transform: SimilarityTransform::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: SimilarityTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_flip(mut self, flip: bool) -> Self {
        self.flip = flip;
        self
    }

    /// Column-sourced configs match every layer; membership is then per item.
    pub fn matches(&self, layer: &Layer) -> bool {
        match &self.layer {
            LayerSource::Id(id) => *id == layer.id,
            LayerSource::Column(_) => true,
        }
    }

    pub fn layer_column(&self) -> Option<&ColumnRef> {
        match &self.layer {
            LayerSource::Column(column) => Some(column),
            LayerSource::Id(_) => None,
        }
    }
}

/// Fields every overlay object kind shares.
pub trait OverlayObject {
    fn id(&self) -> &ObjectId;
    fn name(&self) -> &str;
    fn data_source(&self) -> &DataSource;
    fn visibility(&self) -> bool;
    fn opacity(&self) -> f64;
    fn layer_configs(&self) -> &[LayerConfig];
}

macro_rules! impl_overlay_object {
    ($($ty:ty),* $(,)?) => {
        $(
            impl OverlayObject for $ty {
                fn id(&self) -> &ObjectId {
                    &self.id
                }
                fn name(&self) -> &str {
                    &self.name
                }
                fn data_source(&self) -> &DataSource {
                    &self.data_source
                }
                fn visibility(&self) -> bool {
                    self.visibility
                }
                fn opacity(&self) -> f64 {
                    self.opacity
                }
                fn layer_configs(&self) -> &[LayerConfig] {
                    &self.layer_configs
                }
            }
        )*
    };
}

impl_overlay_object!(PointsObject, ShapesObject, ImageObject, LabelsObject);

/// Unit that point sizes are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SizeUnit {
    /// Scaled with the full data→world transform.
    #[default]
    Data,
    /// Scaled with the layer→world transform only.
    Layer,
    World,
}

fn default_point_color() -> Binding<Color> {
    Binding::Value(crate::color::default_palette()[0])
}

fn default_size() -> Binding<f64> {
    Binding::Value(1.0)
}

fn default_marker() -> Binding<Marker> {
    Binding::Value(Marker::Disc)
}

fn default_visible() -> Binding<bool> {
    Binding::Value(true)
}

fn default_opaque() -> Binding<f64> {
    Binding::Value(1.0)
}

fn default_fill_color() -> Binding<Color> {
    Binding::Value(Color::GRAY)
}

fn default_stroke_color() -> Binding<Color> {
    Binding::Value(Color::BLACK)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsObject {
    pub id: ObjectId,
    #[serde(default)]
    pub name: String,
    pub data_source: DataSource,
    #[serde(default = "default_true")]
    pub visibility: bool,
    #[serde(default = "default_one")]
    pub opacity: f64,
    #[serde(default)]
    pub layer_configs: Vec<LayerConfig>,
    #[serde(default = "default_point_color")]
    pub point_color: Binding<Color>,
    #[serde(default = "default_size")]
    pub point_size: Binding<f64>,
    #[serde(default = "default_marker")]
    pub point_marker: Binding<Marker>,
    #[serde(default = "default_visible")]
    pub point_visibility: Binding<bool>,
    /// Per-item opacity in `[0, 1]`.
    #[serde(default = "default_opaque")]
    pub point_opacity: Binding<f64>,
    #[serde(default)]
    pub size_unit: SizeUnit,
    #[serde(default = "default_one")]
    pub size_factor: f64,
}

impl PointsObject {
    pub fn new(id: &str, data_source: DataSource) -> Self {
        Self {
            id: ObjectId::from(id),
            name: id.to_string(),
            data_source,
            visibility: true,
            opacity: 1.0,
            layer_configs: Vec::new(),
            point_color: default_point_color(),
            point_size: default_size(),
            point_marker: default_marker(),
            point_visibility: default_visible(),
            point_opacity: default_opaque(),
            size_unit: SizeUnit::Data,
            size_factor: 1.0,
        }
    }

    pub fn in_layer(mut self, config: LayerConfig) -> Self {
        self.layer_configs.push(config);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapesObject {
    pub id: ObjectId,
    #[serde(default)]
    pub name: String,
    pub data_source: DataSource,
    #[serde(default = "default_true")]
    pub visibility: bool,
    #[serde(default = "default_one")]
    pub opacity: f64,
    #[serde(default)]
    pub layer_configs: Vec<LayerConfig>,
    #[serde(default = "default_fill_color")]
    pub fill_color: Binding<Color>,
    #[serde(default = "default_visible")]
    pub fill_visibility: Binding<bool>,
    #[serde(default = "default_opaque")]
    pub fill_opacity: Binding<f64>,
    #[serde(default = "default_stroke_color")]
    pub stroke_color: Binding<Color>,
    #[serde(default = "default_visible")]
    pub stroke_visibility: Binding<bool>,
    #[serde(default = "default_opaque")]
    pub stroke_opacity: Binding<f64>,
    /// Stroke width in screen pixels.
    #[serde(default = "default_one")]
    pub stroke_width: f64,
}

impl ShapesObject {
    pub fn new(id: &str, data_source: DataSource) -> Self {
        Self {
            id: ObjectId::from(id),
            name: id.to_string(),
            data_source,
            visibility: true,
            opacity: 1.0,
            layer_configs: Vec::new(),
            fill_color: default_fill_color(),
            fill_visibility: default_visible(),
            fill_opacity: default_opaque(),
            stroke_color: default_stroke_color(),
            stroke_visibility: default_visible(),
            stroke_opacity: default_opaque(),
            stroke_width: 1.0,
        }
    }

    pub fn in_layer(mut self, config: LayerConfig) -> Self {
        self.layer_configs.push(config);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageObject {
    pub id: ObjectId,
    #[serde(default)]
    pub name: String,
    pub data_source: DataSource,
    #[serde(default = "default_true")]
    pub visibility: bool,
    #[serde(default = "default_one")]
    pub opacity: f64,
    #[serde(default)]
    pub layer_configs: Vec<LayerConfig>,
}

impl ImageObject {
    pub fn new(id: &str, data_source: DataSource) -> Self {
        Self {
            id: ObjectId::from(id),
            name: id.to_string(),
            data_source,
            visibility: true,
            opacity: 1.0,
            layer_configs: Vec::new(),
        }
    }

    pub fn in_layer(mut self, config: LayerConfig) -> Self {
        self.layer_configs.push(config);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelsObject {
    pub id: ObjectId,
    #[serde(default)]
    pub name: String,
    pub data_source: DataSource,
    #[serde(default = "default_true")]
    pub visibility: bool,
    #[serde(default = "default_one")]
    pub opacity: f64,
    #[serde(default)]
    pub layer_configs: Vec<LayerConfig>,
    /// Draw label outlines instead of filled regions.
    #[serde(default)]
    pub outline: bool,
}

impl LabelsObject {
    pub fn new(id: &str, data_source: DataSource) -> Self {
        Self {
            id: ObjectId::from(id),
            name: id.to_string(),
            data_source,
            visibility: true,
            opacity: 1.0,
            layer_configs: Vec::new(),
            outline: false,
        }
    }

    pub fn in_layer(mut self, config: LayerConfig) -> Self {
        self.layer_configs.push(config);
        self
    }
}
