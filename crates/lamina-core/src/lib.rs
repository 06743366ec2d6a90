//! # Lamina Core
//!
//! Declarative scene model for layered tissue imagery with data-bound overlays:
//! layers, overlay objects (points, shapes, images, labels), layer configs,
//! attribute bindings and value maps, palettes and markers, and the
//! similarity-transform composer used to place every rendered instance.

pub mod binding;
pub mod color;
pub mod geometry;
pub mod layer;
pub mod marker;
pub mod object;
pub mod scene;
pub mod transform;

pub use binding::{Binding, BindingError, BindingMaps, BindingSource, MapRef, ValueMap};
pub use color::Color;
pub use geometry::{BBox, Matrix3, MultiPolygon, Point, Polygon};
pub use layer::{Layer, LayerId};
pub use marker::Marker;
pub use object::{
    DataSource, ImageObject, LabelsObject, LayerConfig, LayerSource, ObjectId, OverlayObject,
    PointsObject, ShapesObject, SizeUnit, Table,
};
pub use scene::Scene;
pub use transform::SimilarityTransform;
