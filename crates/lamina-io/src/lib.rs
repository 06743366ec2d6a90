//! # Lamina I/O
//!
//! Read interfaces for tables and overlay data, the loader-factory registry
//! that turns declarative data sources into loaders, and the per-project
//! [`DataStore`] that loads and caches data for the renderer.

pub mod data;
pub mod error;
pub mod inline;
pub mod project;
pub mod registry;
pub mod signal;
pub mod store;

pub use data::{
    Column, ImageData, ItemId, ItemsData, LabelsData, PointsData, ShapesData, TableData,
    TileSource,
};
pub use error::DataError;
pub use inline::{register_builtin_loaders, MemoryImage, MemoryPoints, MemoryShapes, MemoryTable};
pub use project::ProjectRoot;
pub use registry::{DataLoader, LoaderFactory, LoaderRegistry, TableProvider};
pub use signal::{AbortController, AbortSignal};
pub use store::{DataStore, Loaded};
