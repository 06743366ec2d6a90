//! Built-in loaders: data embedded directly in the data-source options
//! (`"type": "inline"`), and points read from two columns of a project table
//! (`"type": "table"`).
//!
//! ```json
//! {"type": "inline", "index": [10, 11], "columns": {"cluster": ["T", "B"]}}
//! {"type": "inline", "x": [0.5, 3.0], "y": [1.0, 2.0]}
//! {"type": "inline", "polygons": [[[[[0, 0], [4, 0], [4, 4]]]]]}
//! {"type": "inline", "tileSource": {"url": "he.dzi", "width": 4096, "height": 4096}}
//! {"type": "table", "table": "cells", "x": "centroid_x", "y": "centroid_y"}
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use lamina_core::geometry::{BBox, MultiPolygon, Point, Polygon};
use lamina_core::object::DataSource;

use crate::data::{
    sequential_index, Column, ImageData, ItemId, ItemsData, LabelsData, PointsData, ShapesData,
    TableData, TileSource,
};
use crate::error::DataError;
use crate::registry::{DataLoader, LoaderRegistry, TableProvider};
use crate::signal::AbortSignal;

pub const INLINE: &str = "inline";
pub const TABLE: &str = "table";

pub fn register_builtin_loaders(registry: &mut LoaderRegistry) {
    registry.register_table_loader(INLINE, |source, _root| {
        Ok(Box::new(Ready(MemoryTable::from_source(source)?)) as Box<dyn DataLoader<dyn TableData>>)
    });
    registry.register_points_loader(INLINE, |source, _root| {
        Ok(Box::new(Ready(MemoryPoints::from_source(source)?))
            as Box<dyn DataLoader<dyn PointsData>>)
    });
    registry.register_points_loader(TABLE, |source, _root| {
        Ok(Box::new(TablePointsLoader::from_source(source)?)
            as Box<dyn DataLoader<dyn PointsData>>)
    });
    registry.register_shapes_loader(INLINE, |source, _root| {
        Ok(Box::new(Ready(MemoryShapes::from_source(source)?))
            as Box<dyn DataLoader<dyn ShapesData>>)
    });
    registry.register_image_loader(INLINE, |source, _root| {
        Ok(Box::new(Ready(MemoryImage(tile_source_option(source)?)))
            as Box<dyn DataLoader<dyn ImageData>>)
    });
    registry.register_labels_loader(INLINE, |source, _root| {
        Ok(Box::new(Ready(MemoryImage(tile_source_option(source)?)))
            as Box<dyn DataLoader<dyn LabelsData>>)
    });
}

// ── Option parsing ───────────────────────────────────────────────────

fn required<'a>(source: &'a DataSource, option: &str) -> Result<&'a Value, DataError> {
    source.option(option).ok_or_else(|| DataError::MissingOption {
        source_type: source.kind.clone(),
        option: option.to_string(),
    })
}

fn required_str<'a>(source: &'a DataSource, option: &str) -> Result<&'a str, DataError> {
    required(source, option)?
        .as_str()
        .ok_or_else(|| DataError::invalid_option(option, "expected a string"))
}

fn index_option(source: &DataSource, len: usize) -> Result<Vec<ItemId>, DataError> {
    match source.option("index") {
        None => Ok(sequential_index(len)),
        Some(value) => {
            let index: Vec<ItemId> = serde_json::from_value(value.clone())
                .map_err(|e| DataError::invalid_option("index", e))?;
            if index.len() != len {
                return Err(DataError::invalid_option(
                    "index",
                    format!("expected {len} ids, found {}", index.len()),
                ));
            }
            Ok(index)
        }
    }
}

fn f32_array(source: &DataSource, option: &str) -> Result<Vec<f32>, DataError> {
    let values = required(source, option)?
        .as_array()
        .ok_or_else(|| DataError::invalid_option(option, "expected an array"))?;
    Ok(values
        .iter()
        .map(|v| v.as_f64().map_or(f32::NAN, |f| f as f32))
        .collect())
}

fn tile_source_option(source: &DataSource) -> Result<TileSource, DataError> {
    serde_json::from_value(required(source, "tileSource")?.clone())
        .map_err(|e| DataError::invalid_option("tileSource", e))
}

fn parse_point(value: &Value) -> Option<Point> {
    let pair = value.as_array()?;
    match pair.as_slice() {
        [x, y, ..] => Some(Point::new(x.as_f64()?, y.as_f64()?)),
        _ => None,
    }
}

fn parse_ring(value: &Value) -> Option<Vec<Point>> {
    value.as_array()?.iter().map(parse_point).collect()
}

fn parse_polygon(value: &Value) -> Option<Polygon> {
    let mut rings = value
        .as_array()?
        .iter()
        .map(parse_ring)
        .collect::<Option<Vec<_>>>()?
        .into_iter();
    let exterior = rings.next()?;
    Some(Polygon {
        exterior,
        interiors: rings.collect(),
    })
}

fn parse_multi_polygon(value: &Value) -> Option<MultiPolygon> {
    value
        .as_array()?
        .iter()
        .map(parse_polygon)
        .collect::<Option<Vec<_>>>()
        .map(MultiPolygon::new)
}

/// A loader whose data was fully parsed by the factory.
struct Ready<T>(T);

macro_rules! impl_ready_loader {
    ($data:ty => $($dyn:ty),+) => {
        $(
            #[async_trait(?Send)]
            impl DataLoader<$dyn> for Ready<$data> {
                async fn load(
                    &self,
                    _tables: &dyn TableProvider,
                    signal: &AbortSignal,
                ) -> Result<Arc<$dyn>, DataError> {
                    signal.check()?;
                    Ok(Arc::new(self.0.clone()))
                }
            }
        )+
    };
}

impl_ready_loader!(MemoryTable => dyn TableData);
impl_ready_loader!(MemoryPoints => dyn PointsData);
impl_ready_loader!(MemoryShapes => dyn ShapesData);
impl_ready_loader!(MemoryImage => dyn ImageData, dyn LabelsData);

// ── Tables ───────────────────────────────────────────────────────────

/// A fully materialised table.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    index: Vec<ItemId>,
    columns: HashMap<String, Arc<Column>>,
}

impl MemoryTable {
    pub fn new(index: Vec<ItemId>) -> Self {
        Self {
            index,
            columns: HashMap::new(),
        }
    }

    pub fn with_column(mut self, name: &str, column: Column) -> Self {
        self.columns.insert(name.to_string(), Arc::new(column));
        self
    }

    fn from_source(source: &DataSource) -> Result<Self, DataError> {
        let mut columns = HashMap::new();
        if let Some(value) = source.option("columns") {
            let object = value
                .as_object()
                .ok_or_else(|| DataError::invalid_option("columns", "expected an object"))?;
            for (name, values) in object {
                let values = values.as_array().ok_or_else(|| {
                    DataError::invalid_option("columns", format!("column '{name}' is not an array"))
                })?;
                columns.insert(
                    name.clone(),
                    Arc::new(Column::from_json_values(values.clone())),
                );
            }
        }
        let len = columns.values().map(|c| c.len()).max().unwrap_or(0);
        if let Some(name) = columns.iter().find(|(_, c)| c.len() != len).map(|(n, _)| n) {
            return Err(DataError::invalid_option(
                "columns",
                format!("column '{name}' is shorter than {len} rows"),
            ));
        }
        // A table without columns takes its length from the index.
        let index = match source.option("index") {
            Some(value) if columns.is_empty() => serde_json::from_value(value.clone())
                .map_err(|e| DataError::invalid_option("index", e))?,
            _ => index_option(source, len)?,
        };
        Ok(Self { index, columns })
    }
}

#[async_trait(?Send)]
impl TableData for MemoryTable {
    fn index(&self) -> &[ItemId] {
        &self.index
    }

    fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.columns.keys().cloned().collect();
        names.sort();
        names
    }

    async fn load_column(
        &self,
        name: &str,
        signal: &AbortSignal,
    ) -> Result<Arc<Column>, DataError> {
        signal.check()?;
        self.columns
            .get(name)
            .cloned()
            .ok_or_else(|| DataError::MissingColumn {
                table: "inline".to_string(),
                column: name.to_string(),
            })
    }
}

// ── Points ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPoints {
    index: Vec<ItemId>,
    x: Arc<[f32]>,
    y: Arc<[f32]>,
}

impl MemoryPoints {
    pub fn new(x: Vec<f32>, y: Vec<f32>) -> Self {
        let index = sequential_index(x.len());
        Self::with_index(index, x, y)
    }

    pub fn with_index(index: Vec<ItemId>, x: Vec<f32>, y: Vec<f32>) -> Self {
        Self {
            index,
            x: x.into(),
            y: y.into(),
        }
    }

    fn from_source(source: &DataSource) -> Result<Self, DataError> {
        let x = f32_array(source, "x")?;
        let y = f32_array(source, "y")?;
        if x.len() != y.len() {
            return Err(DataError::invalid_option(
                "y",
                format!("expected {} coordinates, found {}", x.len(), y.len()),
            ));
        }
        let index = index_option(source, x.len())?;
        Ok(Self::with_index(index, x, y))
    }
}

impl ItemsData for MemoryPoints {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn index(&self) -> &[ItemId] {
        &self.index
    }

    fn bounds(&self) -> Option<BBox> {
        BBox::from_coordinates(&self.x, &self.y)
    }
}

#[async_trait(?Send)]
impl PointsData for MemoryPoints {
    async fn load_coordinates(
        &self,
        dimension: &str,
        signal: &AbortSignal,
    ) -> Result<Arc<[f32]>, DataError> {
        signal.check()?;
        match dimension {
            "x" => Ok(Arc::clone(&self.x)),
            "y" => Ok(Arc::clone(&self.y)),
            other => Err(DataError::MissingDimension(other.to_string())),
        }
    }
}

/// Points whose coordinates are two numeric columns of a project table.
struct TablePointsLoader {
    table: String,
    x: String,
    y: String,
}

impl TablePointsLoader {
    fn from_source(source: &DataSource) -> Result<Self, DataError> {
        Ok(Self {
            table: required_str(source, "table")?.to_string(),
            x: required_str(source, "x")?.to_string(),
            y: required_str(source, "y")?.to_string(),
        })
    }
}

#[async_trait(?Send)]
impl DataLoader<dyn PointsData> for TablePointsLoader {
    async fn load(
        &self,
        tables: &dyn TableProvider,
        signal: &AbortSignal,
    ) -> Result<Arc<dyn PointsData>, DataError> {
        let table = tables.load_table(&self.table, signal).await?;
        let mut coordinates = Vec::with_capacity(2);
        for name in [&self.x, &self.y] {
            let column = table.load_column(name, signal).await?;
            if !column.is_numeric() {
                return Err(DataError::Load {
                    what: format!("coordinates from '{}.{name}'", self.table),
                    message: "column is not numeric".to_string(),
                });
            }
            let values: Vec<f32> = (0..column.len())
                .map(|row| column.number(row).map_or(f32::NAN, |v| v as f32))
                .collect();
            coordinates.push(values);
        }
        let y = coordinates.pop().unwrap_or_default();
        let x = coordinates.pop().unwrap_or_default();
        Ok(Arc::new(MemoryPoints::with_index(
            table.index().to_vec(),
            x,
            y,
        )))
    }
}

// ── Shapes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryShapes {
    index: Vec<ItemId>,
    shapes: Arc<[MultiPolygon]>,
}

impl MemoryShapes {
    pub fn new(shapes: Vec<MultiPolygon>) -> Self {
        Self {
            index: sequential_index(shapes.len()),
            shapes: shapes.into(),
        }
    }

    fn from_source(source: &DataSource) -> Result<Self, DataError> {
        let items = required(source, "polygons")?
            .as_array()
            .ok_or_else(|| DataError::invalid_option("polygons", "expected an array"))?;
        let shapes = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                parse_multi_polygon(item).ok_or_else(|| {
                    DataError::invalid_option("polygons", format!("item {i} is not a multipolygon"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let index = index_option(source, shapes.len())?;
        Ok(Self {
            index,
            shapes: shapes.into(),
        })
    }
}

impl ItemsData for MemoryShapes {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn index(&self) -> &[ItemId] {
        &self.index
    }

    fn bounds(&self) -> Option<BBox> {
        self.shapes
            .iter()
            .filter_map(MultiPolygon::bbox)
            .reduce(|a, b| a.union(&b))
    }
}

#[async_trait(?Send)]
impl ShapesData for MemoryShapes {
    async fn load_multi_polygons(
        &self,
        signal: &AbortSignal,
    ) -> Result<Arc<[MultiPolygon]>, DataError> {
        signal.check()?;
        Ok(Arc::clone(&self.shapes))
    }
}

// ── Images and labels ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryImage(pub TileSource);

impl ImageData for MemoryImage {
    fn tile_source(&self) -> &TileSource {
        &self.0
    }
}

impl LabelsData for MemoryImage {
    fn tile_source(&self) -> &TileSource {
        &self.0
    }
}
