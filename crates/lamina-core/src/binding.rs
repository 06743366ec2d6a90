//! Declarative attribute bindings.
//!
//! A [`Binding`] says how one rendered attribute (color, size, marker,
//! visibility, opacity) of every item of an overlay object is derived:
//! a constant, a table column, a group-to-value map over a table column, or a
//! random draw from a palette.
//!
//! On the wire a binding is a JSON object with an optional `source` tag and
//! one payload field per variant. Without a tag, the variant is the first
//! payload present in the order `value`, `from`, `groupBy`, `random`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::color::Color;
use crate::marker::Marker;

/// Which variant a binding uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingSource {
    Value,
    From,
    GroupBy,
    Random,
}

impl fmt::Display for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BindingSource::Value => "value",
            BindingSource::From => "from",
            BindingSource::GroupBy => "groupBy",
            BindingSource::Random => "random",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("binding source is '{0}' but the '{0}' field is missing")]
    MissingPayload(BindingSource),

    #[error("binding has none of 'value', 'from', 'groupBy', or 'random'")]
    Empty,
}

/// Column-backed binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FromBinding {
    pub table: String,
    pub column: String,
    /// `[min, max]` for continuous color mapping; inferred when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,
}

/// A map referenced by project-global id or given inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapRef<T> {
    Id(String),
    Inline(ValueMap<T>),
}

/// Group-name → value lookup with an optional fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueMap<T> {
    #[serde(default = "BTreeMap::new")]
    pub values: BTreeMap<String, T>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<T>,
}

impl<T> Default for ValueMap<T> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            default_value: None,
        }
    }
}

impl<T: Clone> ValueMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, group: &str, value: T) -> Self {
        self.values.insert(group.to_string(), value);
        self
    }

    pub fn with_default(mut self, value: T) -> Self {
        self.default_value = Some(value);
        self
    }

    /// `values[group]`, else the map default.
    pub fn lookup(&self, group: &str) -> Option<&T> {
        self.values.get(group).or(self.default_value.as_ref())
    }
}

/// Group-column binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupByBinding<T> {
    pub table: String,
    pub column: String,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub map: Option<MapRef<T>>,
    /// Groups are hashed onto this palette when no map is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RandomBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,
}

/// How one attribute is derived for every item of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "RawBinding<T>",
    into = "RawBinding<T>",
    bound(serialize = "T: Serialize + Clone", deserialize = "T: Deserialize<'de>")
)]
pub enum Binding<T> {
    Value(T),
    From(FromBinding),
    GroupBy(GroupByBinding<T>),
    Random(RandomBinding),
}

impl<T> Binding<T> {
    pub fn source(&self) -> BindingSource {
        match self {
            Binding::Value(_) => BindingSource::Value,
            Binding::From(_) => BindingSource::From,
            Binding::GroupBy(_) => BindingSource::GroupBy,
            Binding::Random(_) => BindingSource::Random,
        }
    }

    /// The table this binding reads, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Binding::From(from) => Some(&from.table),
            Binding::GroupBy(group_by) => Some(&group_by.table),
            Binding::Value(_) | Binding::Random(_) => None,
        }
    }

    /// The project-global map this binding references, if any.
    pub fn map_id(&self) -> Option<&str> {
        match self {
            Binding::GroupBy(GroupByBinding {
                map: Some(MapRef::Id(id)),
                ..
            }) => Some(id),
            _ => None,
        }
    }

    pub fn column(table: &str, column: &str) -> Self {
        Binding::From(FromBinding {
            table: table.to_string(),
            column: column.to_string(),
            range: None,
            palette: None,
        })
    }

    pub fn group_by(table: &str, column: &str, map: Option<MapRef<T>>) -> Self {
        Binding::GroupBy(GroupByBinding {
            table: table.to_string(),
            column: column.to_string(),
            map,
            palette: None,
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBinding<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<BindingSource>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    value: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<FromBinding>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    group_by: Option<GroupByBinding<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    random: Option<RandomBinding>,
}

impl<T> TryFrom<RawBinding<T>> for Binding<T> {
    type Error = BindingError;

    fn try_from(raw: RawBinding<T>) -> Result<Self, Self::Error> {
        let source = match raw.source {
            Some(source) => source,
            None if raw.value.is_some() => BindingSource::Value,
            None if raw.from.is_some() => BindingSource::From,
            None if raw.group_by.is_some() => BindingSource::GroupBy,
            None if raw.random.is_some() => BindingSource::Random,
            None => return Err(BindingError::Empty),
        };
        let missing = BindingError::MissingPayload(source);
        match source {
            BindingSource::Value => raw.value.map(Binding::Value).ok_or(missing),
            BindingSource::From => raw.from.map(Binding::From).ok_or(missing),
            BindingSource::GroupBy => raw.group_by.map(Binding::GroupBy).ok_or(missing),
            BindingSource::Random => raw.random.map(Binding::Random).ok_or(missing),
        }
    }
}

impl<T> From<Binding<T>> for RawBinding<T> {
    fn from(binding: Binding<T>) -> Self {
        let mut raw = RawBinding {
            source: Some(binding.source()),
            value: None,
            from: None,
            group_by: None,
            random: None,
        };
        match binding {
            Binding::Value(v) => raw.value = Some(v),
            Binding::From(f) => raw.from = Some(f),
            Binding::GroupBy(g) => raw.group_by = Some(g),
            Binding::Random(r) => raw.random = Some(r),
        }
        raw
    }
}

/// Project-global value maps, one registry per attribute kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BindingMaps {
    pub colors: HashMap<String, ValueMap<Color>>,
    pub sizes: HashMap<String, ValueMap<f64>>,
    pub markers: HashMap<String, ValueMap<Marker>>,
    pub visibilities: HashMap<String, ValueMap<bool>>,
    pub opacities: HashMap<String, ValueMap<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: for<'de> Deserialize<'de>>(json: &str) -> Result<Binding<T>, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[test]
    fn test_untagged_value_wins_over_from() {
        let b: Binding<f64> =
            parse(r#"{"value": 3.0, "from": {"table": "t", "column": "c"}}"#).unwrap();
        assert_eq!(b, Binding::Value(3.0));
    }

    #[test]
    fn test_untagged_priority_order() {
        let b: Binding<f64> = parse(
            r#"{"groupBy": {"table": "t", "column": "g"}, "random": {}, "from": {"table": "t", "column": "c"}}"#,
        )
        .unwrap();
        assert_eq!(b.source(), BindingSource::From);

        let b: Binding<Color> =
            parse(r#"{"random": {"palette": "set1"}, "groupBy": {"table": "t", "column": "g"}}"#)
                .unwrap();
        assert_eq!(b.source(), BindingSource::GroupBy);

        let b: Binding<Color> = parse(r#"{"random": {}}"#).unwrap();
        assert_eq!(b, Binding::Random(RandomBinding::default()));
    }

    #[test]
    fn test_explicit_source_overrides_priority() {
        let b: Binding<f64> =
            parse(r#"{"source": "from", "value": 1.0, "from": {"table": "t", "column": "c"}}"#)
                .unwrap();
        assert_eq!(b, Binding::column("t", "c"));
    }

    #[test]
    fn test_explicit_source_without_payload_is_error() {
        let err = parse::<f64>(r#"{"source": "groupBy", "value": 1.0}"#).unwrap_err();
        assert!(err.to_string().contains("groupBy"));
    }

    #[test]
    fn test_empty_binding_is_error() {
        assert!(parse::<f64>("{}").is_err());
    }

    #[test]
    fn test_map_ref_id_or_inline() {
        let b: Binding<Color> =
            parse(r##"{"groupBy": {"table": "t", "column": "g", "map": "celltypes"}}"##).unwrap();
        assert_eq!(b.map_id(), Some("celltypes"));

        let b: Binding<Color> = parse(
            r##"{"groupBy": {"table": "t", "column": "g", "map": {"values": {"T": "#ff0000"}, "defaultValue": "#000000"}}}"##,
        )
        .unwrap();
        let Binding::GroupBy(GroupByBinding {
            map: Some(MapRef::Inline(map)),
            ..
        }) = b
        else {
            panic!("expected inline map");
        };
        assert_eq!(map.lookup("T"), Some(&Color::rgb(255, 0, 0)));
        assert_eq!(map.lookup("B"), Some(&Color::BLACK));
    }

    #[test]
    fn test_serialize_writes_source_tag() {
        let json = serde_json::to_value(Binding::Value(Marker::Star)).unwrap();
        assert_eq!(json["source"], "value");
        assert_eq!(json["value"], "star");
        let back: Binding<Marker> = serde_json::from_value(json).unwrap();
        assert_eq!(back, Binding::Value(Marker::Star));
    }

    #[test]
    fn test_table_accessor() {
        let b: Binding<bool> = Binding::group_by("cells", "cluster", None);
        assert_eq!(b.table(), Some("cells"));
        assert_eq!(Binding::Value(true).table(), None);
    }
}
