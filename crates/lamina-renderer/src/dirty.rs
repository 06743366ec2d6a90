//! Per-stream dependencies and the predicates that decide re-uploads.
//!
//! Each GPU stream of a slot depends on a small set of inputs. A snapshot of
//! those inputs is kept per slot; on the next pass a stream is re-uploaded
//! only when its own inputs differ.

use std::collections::HashMap;

use lamina_core::binding::{Binding, BindingMaps, ValueMap};
use lamina_core::color::Color;
use lamina_core::geometry::Matrix3;
use lamina_core::layer::LayerId;
use lamina_core::marker::Marker;
use lamina_core::object::{ColumnRef, DataSource};
use lamina_io::DataStore;

/// Everything a resolved attribute array depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDeps<T> {
    /// Generation of the object data the item ids come from.
    pub items: u64,
    pub binding: Binding<T>,
    /// The project-global map the binding references, if any.
    pub map: Option<ValueMap<T>>,
    /// Data source of the table the binding reads, if any.
    pub table: Option<DataSource>,
}

impl<T: Clone> AttributeDeps<T> {
    pub fn new(
        items: u64,
        binding: &Binding<T>,
        maps: &HashMap<String, ValueMap<T>>,
        store: &DataStore,
    ) -> Self {
        Self {
            items,
            binding: binding.clone(),
            map: binding.map_id().and_then(|id| maps.get(id)).cloned(),
            table: binding
                .table()
                .and_then(|table| store.table_source(table))
                .cloned(),
        }
    }
}

/// Per-item layer membership of a column-sourced layer config.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipDeps {
    pub items: u64,
    pub column: ColumnRef,
    pub layer_id: LayerId,
    pub table: Option<DataSource>,
}

impl MembershipDeps {
    pub fn new(items: u64, column: &ColumnRef, layer_id: &LayerId, store: &DataStore) -> Self {
        Self {
            items,
            column: column.clone(),
            layer_id: layer_id.clone(),
            table: store.table_source(&column.table).cloned(),
        }
    }
}

/// Inputs of one packed color stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintDeps {
    pub color: AttributeDeps<Color>,
    pub visibility: AttributeDeps<bool>,
    pub opacity: AttributeDeps<f64>,
    /// Object and layer visibility combined.
    pub instance_visible: bool,
    /// Object and layer opacity combined.
    pub instance_opacity: f64,
    pub membership: Option<MembershipDeps>,
}

impl PaintDeps {
    pub fn new(
        items: u64,
        color: &Binding<Color>,
        visibility: &Binding<bool>,
        opacity: &Binding<f64>,
        maps: &BindingMaps,
        store: &DataStore,
    ) -> Self {
        Self {
            color: AttributeDeps::new(items, color, &maps.colors, store),
            visibility: AttributeDeps::new(items, visibility, &maps.visibilities, store),
            opacity: AttributeDeps::new(items, opacity, &maps.opacities, store),
            instance_visible: true,
            instance_opacity: 1.0,
            membership: None,
        }
    }

    pub fn in_instance(
        mut self,
        visible: bool,
        opacity: f64,
        membership: Option<MembershipDeps>,
    ) -> Self {
        self.instance_visible = visible;
        self.instance_opacity = opacity;
        self.membership = membership;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeDeps {
    pub size: AttributeDeps<f64>,
    /// Size factor × layer point-size factor × unit scale.
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointsDeps {
    pub items: u64,
    pub marker: AttributeDeps<Marker>,
    pub size: SizeDeps,
    pub color: PaintDeps,
    pub transform: Matrix3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapesDeps {
    pub items: u64,
    pub fill: PaintDeps,
    pub stroke: PaintDeps,
    pub transform: Matrix3,
}

pub fn coordinates_dirty(old: &PointsDeps, new: &PointsDeps) -> bool {
    old.items != new.items
}

pub fn marker_dirty(old: &PointsDeps, new: &PointsDeps) -> bool {
    old.marker != new.marker
}

pub fn size_dirty(old: &PointsDeps, new: &PointsDeps) -> bool {
    old.size != new.size
}

pub fn color_dirty(old: &PointsDeps, new: &PointsDeps) -> bool {
    old.color != new.color
}

pub fn transform_dirty(old: &Matrix3, new: &Matrix3) -> bool {
    old != new
}

pub fn edges_dirty(old: &ShapesDeps, new: &ShapesDeps) -> bool {
    old.items != new.items
}

/// Edge→item indices are absolute, so they also move with the slot's item
/// offset; offset changes force a full slot upload anyway.
pub fn edge_item_dirty(old: &ShapesDeps, new: &ShapesDeps) -> bool {
    old.items != new.items
}

pub fn fill_dirty(old: &ShapesDeps, new: &ShapesDeps) -> bool {
    old.fill != new.fill
}

pub fn stroke_dirty(old: &ShapesDeps, new: &ShapesDeps) -> bool {
    old.stroke != new.stroke
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_core::object::Table;
    use serde_json::json;

    fn paint(store: &DataStore, color: Binding<Color>) -> PaintDeps {
        PaintDeps::new(
            1,
            &color,
            &Binding::Value(true),
            &Binding::Value(1.0),
            &BindingMaps::default(),
            store,
        )
    }

    fn points(store: &DataStore, color: Binding<Color>, size: f64) -> PointsDeps {
        PointsDeps {
            items: 1,
            marker: AttributeDeps::new(1, &Binding::Value(Marker::Disc), &HashMap::new(), store),
            size: SizeDeps {
                size: AttributeDeps::new(1, &Binding::Value(size), &HashMap::new(), store),
                scale: 1.0,
            },
            color: paint(store, color),
            transform: Matrix3::IDENTITY,
        }
    }

    #[test]
    fn test_color_change_only_dirties_color() {
        let store = DataStore::in_memory();
        let old = points(&store, Binding::Value(Color::WHITE), 2.0);
        let new = points(&store, Binding::Value(Color::BLACK), 2.0);
        assert!(color_dirty(&old, &new));
        assert!(!coordinates_dirty(&old, &new));
        assert!(!marker_dirty(&old, &new));
        assert!(!size_dirty(&old, &new));
        assert!(!transform_dirty(&old.transform, &new.transform));
    }

    #[test]
    fn test_size_scale_dirties_size() {
        let store = DataStore::in_memory();
        let old = points(&store, Binding::Value(Color::WHITE), 2.0);
        let mut new = old.clone();
        new.size.scale = 2.0;
        assert!(size_dirty(&old, &new));
        assert!(!color_dirty(&old, &new));
    }

    #[test]
    fn test_global_map_and_table_edits_are_tracked() {
        let mut store = DataStore::in_memory();
        let table = |kind: &str| Table {
            id: "cells".to_string(),
            name: "Cells".to_string(),
            data_source: serde_json::from_value(json!({"type": "inline", "tag": kind})).unwrap(),
        };
        store.set_tables(&[table("a")]);
        let binding: Binding<f64> = Binding::group_by(
            "cells",
            "type",
            Some(lamina_core::binding::MapRef::Id("sizes".to_string())),
        );
        let maps = HashMap::from([("sizes".to_string(), ValueMap::new().with("T", 2.0))]);
        let before = AttributeDeps::new(1, &binding, &maps, &store);

        let edited = HashMap::from([("sizes".to_string(), ValueMap::new().with("T", 3.0))]);
        assert_ne!(before, AttributeDeps::new(1, &binding, &edited, &store));

        store.set_tables(&[table("b")]);
        assert_ne!(before, AttributeDeps::new(1, &binding, &maps, &store));
    }
}
