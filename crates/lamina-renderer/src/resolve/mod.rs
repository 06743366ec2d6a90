//! Attribute resolution.
//!
//! Turns one binding into a dense array holding one value per item id, in
//! id order, optionally zero-padded for the GPU buffer layout. Data problems
//! never fail a resolution: affected items get the supplied default and one
//! aggregated [`Warning`] is recorded per binding.

mod attribute;
mod group;

pub use attribute::Attribute;
pub use group::{djb2, group_index};

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use thiserror::Error;

use lamina_core::binding::{Binding, FromBinding, GroupByBinding, MapRef, ValueMap};
use lamina_core::color::Color;
use lamina_core::layer::LayerId;
use lamina_core::object::ColumnRef;
use lamina_io::{AbortSignal, Column, DataError, ItemId, TableData, TableProvider};

use crate::diagnostics::{Diagnostics, Warning};
use attribute::named_palette;

/// Palette of continuous color bindings that name none.
pub const CONTINUOUS_PALETTE: &str = "viridis";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("random bindings are not supported for {0} attributes")]
    RandomUnsupported(&'static str),
}

impl ResolveError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, ResolveError::Data(e) if e.is_aborted())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolveOptions {
    /// Output length is rounded up to a multiple of this.
    pub padding_multiple: usize,
    /// Factor applied to every binding-derived number. Supplied defaults are
    /// used as given.
    pub scale: f64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            padding_multiple: 1,
            scale: 1.0,
        }
    }
}

impl ResolveOptions {
    pub fn padded(multiple: usize) -> Self {
        Self {
            padding_multiple: multiple,
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

pub fn padded_len(len: usize, multiple: usize) -> usize {
    if multiple <= 1 {
        len
    } else {
        len.div_ceil(multiple) * multiple
    }
}

/// Rounds an opacity fraction to the packed alpha byte.
pub fn opacity_byte(opacity: f64) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Packs resolved colors with their visibility and opacity into `0xRRGGBBAA`.
/// Invisible items get a zero alpha byte whatever their opacity.
pub fn pack_colors(colors: &[Color], visible: &[bool], opacity: &[f64]) -> Vec<u32> {
    colors
        .iter()
        .zip(visible)
        .zip(opacity)
        .map(|((color, &visible), &opacity)| color.pack(visible, opacity_byte(opacity)))
        .collect()
}

/// Resolves bindings against the project tables.
pub struct Resolver<'a> {
    tables: &'a dyn TableProvider,
    signal: &'a AbortSignal,
}

impl<'a> Resolver<'a> {
    pub fn new(tables: &'a dyn TableProvider, signal: &'a AbortSignal) -> Self {
        Self { tables, signal }
    }

    pub async fn resolve<T: Attribute>(
        &self,
        ids: &[ItemId],
        binding: &Binding<T>,
        maps: &HashMap<String, ValueMap<T>>,
        default: &T,
        options: &ResolveOptions,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<T>, ResolveError> {
        self.signal.check()?;
        let scale = options.scale;
        let mut values = match binding {
            Binding::Value(value) => vec![value.clone().scaled(scale); ids.len()],
            Binding::From(from) => {
                let (table, column) = self.load_column(&from.table, &from.column).await?;
                let rows = map_rows(ids, table.index(), default, |row| {
                    T::from_cell(&column, row).map(|v| v.scaled(scale))
                });
                rows.report(&from.table, &from.column, diagnostics)
            }
            Binding::GroupBy(group_by) => {
                self.resolve_groups(ids, group_by, maps, default, scale, diagnostics)
                    .await?
            }
            Binding::Random(random) => {
                let choices = T::choices(random.palette.as_deref(), diagnostics)
                    .filter(|c| !c.is_empty())
                    .ok_or(ResolveError::RandomUnsupported(T::KIND))?;
                let mut rng = rand::thread_rng();
                ids.iter()
                    .map(|_| {
                        choices
                            .choose(&mut rng)
                            .cloned()
                            .unwrap_or_else(|| default.clone())
                    })
                    .collect()
            }
        };
        values.resize(padded_len(ids.len(), options.padding_multiple), T::padding());
        Ok(values)
    }

    /// Like [`resolve`](Self::resolve), but a `from` binding over a numeric
    /// column maps values continuously onto a palette.
    pub async fn resolve_colors(
        &self,
        ids: &[ItemId],
        binding: &Binding<Color>,
        maps: &HashMap<String, ValueMap<Color>>,
        default: Color,
        options: &ResolveOptions,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<Color>, ResolveError> {
        let Binding::From(from) = binding else {
            return self
                .resolve(ids, binding, maps, &default, options, diagnostics)
                .await;
        };
        self.signal.check()?;
        let (table, column) = self.load_column(&from.table, &from.column).await?;
        let mut colors = if column.is_numeric() {
            continuous_colors(ids, from, table.index(), &column, default, diagnostics)
        } else {
            map_rows(ids, table.index(), &default, |row| {
                Color::from_cell(&column, row)
            })
            .report(&from.table, &from.column, diagnostics)
        };
        colors.resize(padded_len(ids.len(), options.padding_multiple), Color::padding());
        Ok(colors)
    }

    /// Whether each item belongs to `layer_id` according to a per-item layer
    /// column. Items absent from the table belong to no layer.
    pub async fn resolve_layer_membership(
        &self,
        ids: &[ItemId],
        column: &ColumnRef,
        layer_id: &LayerId,
        options: &ResolveOptions,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<bool>, ResolveError> {
        self.signal.check()?;
        let (table, data) = self.load_column(&column.table, &column.column).await?;
        let mut members = map_rows(ids, table.index(), &false, |row| {
            data.group_name(row).map(|group| group == layer_id.as_str())
        })
        .report(&column.table, &column.column, diagnostics);
        members.resize(padded_len(ids.len(), options.padding_multiple), false);
        Ok(members)
    }

    async fn resolve_groups<T: Attribute>(
        &self,
        ids: &[ItemId],
        group_by: &GroupByBinding<T>,
        maps: &HashMap<String, ValueMap<T>>,
        default: &T,
        scale: f64,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<T>, ResolveError> {
        let map = match &group_by.map {
            Some(MapRef::Id(id)) => match maps.get(id) {
                Some(map) => Some(map),
                None => {
                    diagnostics.push(Warning::MissingValueMap { map: id.clone() });
                    return Ok(vec![default.clone(); ids.len()]);
                }
            },
            Some(MapRef::Inline(map)) => Some(map),
            None => None,
        };
        // Without a map, groups hash onto the attribute's palette.
        let choices = match map {
            Some(_) => Vec::new(),
            None => match T::choices(group_by.palette.as_deref(), diagnostics) {
                Some(choices) if !choices.is_empty() => choices,
                _ => {
                    diagnostics.push(Warning::MissingValueMap {
                        map: format!("{}.{}", group_by.table, group_by.column),
                    });
                    return Ok(vec![default.clone(); ids.len()]);
                }
            },
        };

        let (table, column) = self
            .load_column(&group_by.table, &group_by.column)
            .await?;
        let rows = map_rows(ids, table.index(), default, |row| {
            let group = column.group_name(row)?;
            let value = match map {
                Some(map) => match map.lookup(&group) {
                    Some(value) => value.clone().scaled(scale),
                    None => default.clone(),
                },
                None => choices[group_index(&group, choices.len())]
                    .clone()
                    .scaled(scale),
            };
            Some(value)
        });
        Ok(rows.report(&group_by.table, &group_by.column, diagnostics))
    }

    async fn load_column(
        &self,
        table: &str,
        column: &str,
    ) -> Result<(Arc<dyn TableData>, Arc<Column>), ResolveError> {
        let data = self.tables.load_table(table, self.signal).await?;
        let column = data.load_column(column, self.signal).await?;
        Ok((data, column))
    }
}

struct Rows<T> {
    values: Vec<T>,
    total: usize,
    missing: usize,
    unreadable: usize,
}

impl<T> Rows<T> {
    fn report(self, table: &str, column: &str, diagnostics: &mut Diagnostics) -> Vec<T> {
        if self.missing > 0 {
            diagnostics.push(Warning::MissingIds {
                table: table.to_string(),
                missing: self.missing,
                total: self.total,
            });
        }
        if self.unreadable > 0 {
            diagnostics.push(Warning::UnparsableValues {
                table: table.to_string(),
                column: column.to_string(),
                count: self.unreadable,
            });
        }
        self.values
    }
}

fn row_lookup(index: &[ItemId]) -> HashMap<&ItemId, usize> {
    let mut rows = HashMap::with_capacity(index.len());
    for (row, id) in index.iter().enumerate() {
        rows.entry(id).or_insert(row);
    }
    rows
}

/// Maps each id to its table row and reads it with `cell`. Absent ids and
/// unreadable cells take `default`.
fn map_rows<T: Clone>(
    ids: &[ItemId],
    index: &[ItemId],
    default: &T,
    mut cell: impl FnMut(usize) -> Option<T>,
) -> Rows<T> {
    let rows = row_lookup(index);
    let mut missing = 0;
    let mut unreadable = 0;
    let values = ids
        .iter()
        .map(|id| match rows.get(id) {
            Some(&row) => cell(row).unwrap_or_else(|| {
                unreadable += 1;
                default.clone()
            }),
            None => {
                missing += 1;
                default.clone()
            }
        })
        .collect();
    Rows {
        values,
        total: ids.len(),
        missing,
        unreadable,
    }
}

fn continuous_colors(
    ids: &[ItemId],
    from: &FromBinding,
    index: &[ItemId],
    column: &Column,
    default: Color,
    diagnostics: &mut Diagnostics,
) -> Vec<Color> {
    let rows = map_rows(ids, index, &None, |row| {
        column.number(row).filter(|v| v.is_finite()).map(Some)
    });
    let values = rows.report(&from.table, &from.column, diagnostics);

    let range = match from.range {
        Some(range) => range,
        None => {
            let range = values
                .iter()
                .flatten()
                .fold(None, |acc: Option<[f64; 2]>, &v| match acc {
                    None => Some([v, v]),
                    Some([lo, hi]) => Some([lo.min(v), hi.max(v)]),
                })
                .unwrap_or([0.0, 1.0]);
            diagnostics.push(Warning::InferredRange {
                table: from.table.clone(),
                column: from.column.clone(),
                range,
            });
            range
        }
    };
    let [min, max] = if range.iter().all(|v| v.is_finite()) && range[1] > range[0] {
        range
    } else {
        diagnostics.push(Warning::DegenerateRange {
            table: from.table.clone(),
            column: from.column.clone(),
            range,
        });
        [0.0, 1.0]
    };

    let palette = named_palette(from.palette.as_deref(), CONTINUOUS_PALETTE, diagnostics);
    values
        .into_iter()
        .map(|value| match value {
            Some(v) if !palette.is_empty() => {
                let t = (v.clamp(min, max) - min) / (max - min);
                let slot = ((t * palette.len() as f64).floor() as usize).min(palette.len() - 1);
                palette[slot]
            }
            _ => default,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_core::binding::RandomBinding;
    use lamina_core::color::{self, palette};
    use lamina_core::marker::Marker;
    use lamina_core::object::Table;
    use lamina_io::{AbortController, DataStore};
    use serde_json::json;

    fn store_with(source: serde_json::Value) -> DataStore {
        let mut store = DataStore::in_memory();
        store.set_tables(&[Table {
            id: "cells".to_string(),
            name: "Cells".to_string(),
            data_source: serde_json::from_value(source).unwrap(),
        }]);
        store
    }

    fn cells() -> DataStore {
        store_with(json!({
            "type": "inline",
            "index": [1, 2, 3, 4],
            "columns": {
                "size": [1.0, 2.0, 3.0, 4.0],
                "score": [0.0, 5.0, 10.0, 20.0],
                "type": ["T", "B", "T", "NK"],
                "layer": ["a", "b", "a", "a"]
            }
        }))
    }

    fn ids(ids: &[i64]) -> Vec<ItemId> {
        ids.iter().copied().map(ItemId::from).collect()
    }

    #[test]
    fn test_missing_ids_fall_back_with_one_warning() {
        let store = store_with(json!({
            "type": "inline",
            "index": [2],
            "columns": {"size": [7.5]}
        }));
        let signal = AbortSignal::never();
        let resolver = Resolver::new(&store, &signal);
        let mut diagnostics = Diagnostics::new();
        let values = pollster::block_on(resolver.resolve(
            &ids(&[1, 2, 3]),
            &Binding::column("cells", "size"),
            &HashMap::new(),
            &1.0,
            &ResolveOptions::default(),
            &mut diagnostics,
        ))
        .unwrap();
        assert_eq!(values, vec![1.0, 7.5, 1.0]);
        assert_eq!(
            diagnostics.warnings(),
            &[Warning::MissingIds {
                table: "cells".to_string(),
                missing: 2,
                total: 3,
            }]
        );
    }

    #[test]
    fn test_value_is_scaled_and_padded() {
        let store = cells();
        let signal = AbortSignal::never();
        let resolver = Resolver::new(&store, &signal);
        let mut diagnostics = Diagnostics::new();
        let options = ResolveOptions::padded(4).with_scale(3.0);
        let values = pollster::block_on(resolver.resolve(
            &ids(&[1, 2, 3]),
            &Binding::Value(2.0),
            &HashMap::new(),
            &1.0,
            &options,
            &mut diagnostics,
        ))
        .unwrap();
        assert_eq!(values, vec![6.0, 6.0, 6.0, 0.0]);

        // The supplied default is not scaled.
        let values = pollster::block_on(resolver.resolve(
            &ids(&[2, 99]),
            &Binding::column("cells", "size"),
            &HashMap::new(),
            &1.0,
            &options,
            &mut diagnostics,
        ))
        .unwrap();
        assert_eq!(values, vec![6.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_group_by_inline_map_and_defaults() {
        let store = cells();
        let signal = AbortSignal::never();
        let resolver = Resolver::new(&store, &signal);
        let mut diagnostics = Diagnostics::new();
        let map = ValueMap::new().with("T", Marker::Star);
        let binding = Binding::group_by("cells", "type", Some(MapRef::Inline(map.clone())));
        let markers = pollster::block_on(resolver.resolve(
            &ids(&[1, 2, 4]),
            &binding,
            &HashMap::new(),
            &Marker::Cross,
            &ResolveOptions::default(),
            &mut diagnostics,
        ))
        .unwrap();
        assert_eq!(markers, vec![Marker::Star, Marker::Cross, Marker::Cross]);

        let binding = Binding::group_by(
            "cells",
            "type",
            Some(MapRef::Inline(map.with_default(Marker::Ring))),
        );
        let markers = pollster::block_on(resolver.resolve(
            &ids(&[1, 2]),
            &binding,
            &HashMap::new(),
            &Marker::Cross,
            &ResolveOptions::default(),
            &mut diagnostics,
        ))
        .unwrap();
        assert_eq!(markers, vec![Marker::Star, Marker::Ring]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_group_by_global_map() {
        let store = cells();
        let signal = AbortSignal::never();
        let resolver = Resolver::new(&store, &signal);
        let mut diagnostics = Diagnostics::new();
        let maps = HashMap::from([(
            "sizes".to_string(),
            ValueMap::new().with("T", 4.0).with("B", 2.0),
        )]);
        let binding = Binding::group_by("cells", "type", Some(MapRef::Id("sizes".to_string())));
        let options = ResolveOptions::default().with_scale(0.5);
        let sizes = pollster::block_on(resolver.resolve(
            &ids(&[1, 2, 4]),
            &binding,
            &maps,
            &1.0,
            &options,
            &mut diagnostics,
        ))
        .unwrap();
        assert_eq!(sizes, vec![2.0, 1.0, 1.0]);

        let sizes = pollster::block_on(resolver.resolve(
            &ids(&[1, 2]),
            &binding,
            &HashMap::new(),
            &1.0,
            &options,
            &mut diagnostics,
        ))
        .unwrap();
        assert_eq!(sizes, vec![1.0, 1.0]);
        assert_eq!(
            diagnostics.warnings(),
            &[Warning::MissingValueMap {
                map: "sizes".to_string()
            }]
        );
    }

    #[test]
    fn test_unmapped_groups_hash_onto_palette() {
        let store = cells();
        let signal = AbortSignal::never();
        let resolver = Resolver::new(&store, &signal);
        let mut diagnostics = Diagnostics::new();
        let binding: Binding<Color> = Binding::group_by("cells", "type", None);
        let resolve = |diagnostics: &mut Diagnostics| {
            pollster::block_on(resolver.resolve(
                &ids(&[1, 2, 3]),
                &binding,
                &HashMap::new(),
                &Color::WHITE,
                &ResolveOptions::default(),
                diagnostics,
            ))
            .unwrap()
        };
        let first = resolve(&mut diagnostics);
        let second = resolve(&mut diagnostics);
        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        let palette = color::default_palette();
        assert_eq!(first[1], palette[group_index("B", palette.len())]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_continuous_colors() {
        let store = cells();
        let signal = AbortSignal::never();
        let resolver = Resolver::new(&store, &signal);
        let mut diagnostics = Diagnostics::new();
        let viridis = palette("viridis").unwrap();
        let binding = Binding::From(FromBinding {
            table: "cells".to_string(),
            column: "score".to_string(),
            range: Some([0.0, 10.0]),
            palette: Some("viridis".to_string()),
        });
        let colors = pollster::block_on(resolver.resolve_colors(
            &ids(&[1, 2, 3, 4]),
            &binding,
            &HashMap::new(),
            Color::WHITE,
            &ResolveOptions::default(),
            &mut diagnostics,
        ))
        .unwrap();
        assert_eq!(
            colors,
            vec![viridis[0], viridis[viridis.len() / 2], viridis[15], viridis[15]]
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_inferred_and_degenerate_ranges_warn() {
        let store = cells();
        let signal = AbortSignal::never();
        let resolver = Resolver::new(&store, &signal);
        let mut diagnostics = Diagnostics::new();
        let binding = Binding::<Color>::column("cells", "score");
        pollster::block_on(resolver.resolve_colors(
            &ids(&[1, 2]),
            &binding,
            &HashMap::new(),
            Color::WHITE,
            &ResolveOptions::default(),
            &mut diagnostics,
        ))
        .unwrap();
        match diagnostics.warnings() {
            [Warning::InferredRange { range, .. }] => assert_eq!(*range, [0.0, 5.0]),
            other => panic!("unexpected warnings: {other:?}"),
        }

        let mut diagnostics = Diagnostics::new();
        let binding = Binding::From(FromBinding {
            table: "cells".to_string(),
            column: "score".to_string(),
            range: Some([5.0, 5.0]),
            palette: None,
        });
        pollster::block_on(resolver.resolve_colors(
            &ids(&[1]),
            &binding,
            &HashMap::new(),
            Color::WHITE,
            &ResolveOptions::default(),
            &mut diagnostics,
        ))
        .unwrap();
        assert!(matches!(
            diagnostics.warnings(),
            [Warning::DegenerateRange { .. }]
        ));
    }

    #[test]
    fn test_random_bindings() {
        let store = cells();
        let signal = AbortSignal::never();
        let resolver = Resolver::new(&store, &signal);
        let mut diagnostics = Diagnostics::new();
        let random = Binding::Random(RandomBinding {
            palette: Some("set1".to_string()),
        });
        let colors = pollster::block_on(resolver.resolve(
            &ids(&[1, 2, 3, 4]),
            &random,
            &HashMap::new(),
            &Color::WHITE,
            &ResolveOptions::default(),
            &mut diagnostics,
        ))
        .unwrap();
        let set1 = palette("set1").unwrap();
        assert!(colors.iter().all(|c| set1.contains(c)));

        let err = pollster::block_on(resolver.resolve(
            &ids(&[1]),
            &Binding::<f64>::Random(RandomBinding::default()),
            &HashMap::new(),
            &1.0,
            &ResolveOptions::default(),
            &mut diagnostics,
        ))
        .unwrap_err();
        assert!(matches!(err, ResolveError::RandomUnsupported("number")));
    }

    #[test]
    fn test_layer_membership() {
        let store = cells();
        let signal = AbortSignal::never();
        let resolver = Resolver::new(&store, &signal);
        let mut diagnostics = Diagnostics::new();
        let column = ColumnRef {
            table: "cells".to_string(),
            column: "layer".to_string(),
        };
        let members = pollster::block_on(resolver.resolve_layer_membership(
            &ids(&[1, 2, 9]),
            &column,
            &LayerId::from("a"),
            &ResolveOptions::padded(4),
            &mut diagnostics,
        ))
        .unwrap();
        assert_eq!(members, vec![true, false, false, false]);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let store = cells();
        let signal = AbortSignal::never();
        let resolver = Resolver::new(&store, &signal);
        let err = pollster::block_on(resolver.resolve(
            &ids(&[1]),
            &Binding::<f64>::column("cells", "nope"),
            &HashMap::new(),
            &1.0,
            &ResolveOptions::default(),
            &mut Diagnostics::new(),
        ))
        .unwrap_err();
        assert!(!err.is_aborted());
    }

    #[test]
    fn test_aborted_resolution() {
        let store = cells();
        let controller = AbortController::new();
        controller.abort();
        let signal = controller.signal();
        let resolver = Resolver::new(&store, &signal);
        let err = pollster::block_on(resolver.resolve(
            &ids(&[1]),
            &Binding::Value(1.0),
            &HashMap::new(),
            &1.0,
            &ResolveOptions::default(),
            &mut Diagnostics::new(),
        ))
        .unwrap_err();
        assert!(err.is_aborted());
    }

    #[test]
    fn test_invisible_color_packs_zero_alpha() {
        let red = Color::rgb(255, 0, 0);
        let opacity = 200.0 / 255.0;
        let packed = pack_colors(&[red, red], &[false, true], &[opacity, opacity]);
        assert_eq!(packed[0] & 0xff, 0);
        assert_eq!(packed[0] >> 8, 0xff0000);
        assert_eq!(packed[1] & 0xff, 200);
    }
}
