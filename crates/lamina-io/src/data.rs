//! Read interfaces for tables and overlay data.
//!
//! Concrete readers (CSV, Parquet, GeoJSON, tile pyramids, ...) implement these
//! traits; the renderer only ever sees them through here.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lamina_core::geometry::{BBox, MultiPolygon, Point};

use crate::error::DataError;
use crate::signal::AbortSignal;

/// Stable per-item identifier, shared between overlay data and tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Int(i64),
    Text(Arc<str>),
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        ItemId::Int(id)
    }
}

impl From<usize> for ItemId {
    fn from(id: usize) -> Self {
        ItemId::Int(id as i64)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        ItemId::Text(Arc::from(id))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Int(id) => write!(f, "{id}"),
            ItemId::Text(id) => f.write_str(id),
        }
    }
}

/// `0..len` as integer ids, the index of data without explicit ids.
pub fn sequential_index(len: usize) -> Vec<ItemId> {
    (0..len).map(ItemId::from).collect()
}

/// A typed table column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Number(Vec<f64>),
    Integer(Vec<i64>),
    Text(Vec<String>),
    Bool(Vec<bool>),
    Json(Vec<Value>),
}

impl Column {
    /// Picks the narrowest variant that holds every value.
    pub fn from_json_values(values: Vec<Value>) -> Self {
        if values.iter().all(|v| v.is_i64()) {
            Column::Integer(values.iter().filter_map(Value::as_i64).collect())
        } else if values.iter().all(Value::is_number) {
            Column::Number(values.iter().filter_map(Value::as_f64).collect())
        } else if values.iter().all(Value::is_string) {
            Column::Text(
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            )
        } else if values.iter().all(Value::is_boolean) {
            Column::Bool(values.iter().filter_map(Value::as_bool).collect())
        } else {
            Column::Json(values)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Number(v) => v.len(),
            Column::Integer(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Json(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Number(_) | Column::Integer(_))
    }

    pub fn number(&self, row: usize) -> Option<f64> {
        match self {
            Column::Number(v) => v.get(row).copied(),
            Column::Integer(v) => v.get(row).map(|&i| i as f64),
            Column::Text(v) => v.get(row).and_then(|s| s.trim().parse().ok()),
            Column::Bool(v) => v.get(row).map(|&b| if b { 1.0 } else { 0.0 }),
            Column::Json(v) => v.get(row).and_then(Value::as_f64),
        }
    }

    pub fn text(&self, row: usize) -> Option<&str> {
        match self {
            Column::Text(v) => v.get(row).map(String::as_str),
            Column::Json(v) => v.get(row).and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn boolean(&self, row: usize) -> Option<bool> {
        match self {
            Column::Bool(v) => v.get(row).copied(),
            Column::Number(v) => v.get(row).filter(|n| !n.is_nan()).map(|&n| n != 0.0),
            Column::Integer(v) => v.get(row).map(|&i| i != 0),
            Column::Text(v) => v.get(row).and_then(|s| match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            }),
            Column::Json(v) => v.get(row).and_then(Value::as_bool),
        }
    }

    /// Stable string form of a cell, used as a group name.
    ///
    /// Text is taken verbatim. Integral numbers print without a fraction
    /// (`3`, not `3.0`) so integer and float columns group alike. Other JSON
    /// values use compact `serde_json` output, whose object keys are sorted.
    pub fn group_name(&self, row: usize) -> Option<Cow<'_, str>> {
        match self {
            Column::Text(v) => v.get(row).map(|s| Cow::Borrowed(s.as_str())),
            Column::Number(v) => v.get(row).map(|&n| Cow::Owned(format_number(n))),
            Column::Integer(v) => v.get(row).map(|i| Cow::Owned(i.to_string())),
            Column::Bool(v) => v.get(row).map(|b| Cow::Owned(b.to_string())),
            Column::Json(v) => v.get(row).map(|value| match value {
                Value::String(s) => Cow::Borrowed(s.as_str()),
                Value::Number(n) => Cow::Owned(
                    n.as_f64()
                        .map(format_number)
                        .unwrap_or_else(|| n.to_string()),
                ),
                other => Cow::Owned(other.to_string()),
            }),
        }
    }
}

fn format_number(n: f64) -> String {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_EXACT {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Tabular data keyed by an item index.
#[async_trait(?Send)]
pub trait TableData {
    /// Item id of every row, in row order.
    fn index(&self) -> &[ItemId];

    fn column_names(&self) -> Vec<String>;

    async fn load_column(&self, name: &str, signal: &AbortSignal)
        -> Result<Arc<Column>, DataError>;
}

/// Common read surface of points and shapes data.
pub trait ItemsData {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item id of every item, in item order.
    fn index(&self) -> &[ItemId];

    /// Data-space bounds, when cheaply known; used as the flip/rotation pivot.
    fn bounds(&self) -> Option<BBox> {
        None
    }
}

#[async_trait(?Send)]
pub trait PointsData: ItemsData {
    /// One coordinate per item for the named dimension (`"x"` or `"y"`).
    async fn load_coordinates(
        &self,
        dimension: &str,
        signal: &AbortSignal,
    ) -> Result<Arc<[f32]>, DataError>;
}

#[async_trait(?Send)]
pub trait ShapesData: ItemsData {
    /// One multipolygon per item.
    async fn load_multi_polygons(
        &self,
        signal: &AbortSignal,
    ) -> Result<Arc<[MultiPolygon]>, DataError>;
}

/// Descriptor of a tiled image pyramid, handed to the tiled-image viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSource {
    pub url: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default)]
    pub levels: u32,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_tile_size() -> u32 {
    256
}

fn default_format() -> String {
    "png".to_string()
}

impl TileSource {
    /// Content center in pixel coordinates.
    pub fn center(&self) -> Point {
        Point::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }
}

pub trait ImageData {
    fn tile_source(&self) -> &TileSource;
}

pub trait LabelsData {
    fn tile_source(&self) -> &TileSource;
}
