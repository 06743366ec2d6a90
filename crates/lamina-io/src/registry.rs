//! Loader-factory registry.
//!
//! Factories are registered per data-source type string and resolved when an
//! object is loaded. The registry is an ordinary value built at startup and
//! handed to the [`DataStore`](crate::store::DataStore); nothing here is
//! process-global.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use lamina_core::object::DataSource;

use crate::data::{ImageData, LabelsData, PointsData, ShapesData, TableData};
use crate::error::DataError;
use crate::project::ProjectRoot;
use crate::signal::AbortSignal;

/// Resolves project tables by id. Loaders of data backed by a table use it.
#[async_trait(?Send)]
pub trait TableProvider {
    async fn load_table(
        &self,
        table_id: &str,
        signal: &AbortSignal,
    ) -> Result<Arc<dyn TableData>, DataError>;
}

/// Loads one data set described by a data source.
#[async_trait(?Send)]
pub trait DataLoader<D: ?Sized> {
    async fn load(
        &self,
        tables: &dyn TableProvider,
        signal: &AbortSignal,
    ) -> Result<Arc<D>, DataError>;
}

/// Builds a loader from a raw data source and the project root.
pub type LoaderFactory<D> =
    Box<dyn Fn(&DataSource, &ProjectRoot) -> Result<Box<dyn DataLoader<D>>, DataError>>;

/// Data-source type → loader factory, one table per data kind.
#[derive(Default)]
pub struct LoaderRegistry {
    tables: HashMap<String, LoaderFactory<dyn TableData>>,
    points: HashMap<String, LoaderFactory<dyn PointsData>>,
    shapes: HashMap<String, LoaderFactory<dyn ShapesData>>,
    images: HashMap<String, LoaderFactory<dyn ImageData>>,
    labels: HashMap<String, LoaderFactory<dyn LabelsData>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `inline` and `table` loaders.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::inline::register_builtin_loaders(&mut registry);
        registry
    }

    // ── Registration ─────────────────────────────────────────────────

    pub fn register_table_loader<F>(&mut self, source_type: &str, factory: F)
    where
        F: Fn(&DataSource, &ProjectRoot) -> Result<Box<dyn DataLoader<dyn TableData>>, DataError>
            + 'static,
    {
        self.tables.insert(source_type.to_string(), Box::new(factory));
    }

    pub fn register_points_loader<F>(&mut self, source_type: &str, factory: F)
    where
        F: Fn(&DataSource, &ProjectRoot) -> Result<Box<dyn DataLoader<dyn PointsData>>, DataError>
            + 'static,
    {
        self.points.insert(source_type.to_string(), Box::new(factory));
    }

    pub fn register_shapes_loader<F>(&mut self, source_type: &str, factory: F)
    where
        F: Fn(&DataSource, &ProjectRoot) -> Result<Box<dyn DataLoader<dyn ShapesData>>, DataError>
            + 'static,
    {
        self.shapes.insert(source_type.to_string(), Box::new(factory));
    }

    pub fn register_image_loader<F>(&mut self, source_type: &str, factory: F)
    where
        F: Fn(&DataSource, &ProjectRoot) -> Result<Box<dyn DataLoader<dyn ImageData>>, DataError>
            + 'static,
    {
        self.images.insert(source_type.to_string(), Box::new(factory));
    }

    pub fn register_labels_loader<F>(&mut self, source_type: &str, factory: F)
    where
        F: Fn(&DataSource, &ProjectRoot) -> Result<Box<dyn DataLoader<dyn LabelsData>>, DataError>
            + 'static,
    {
        self.labels.insert(source_type.to_string(), Box::new(factory));
    }

    // ── Resolution ───────────────────────────────────────────────────

    pub fn table_loader(
        &self,
        source: &DataSource,
        root: &ProjectRoot,
    ) -> Result<Box<dyn DataLoader<dyn TableData>>, DataError> {
        create(&self.tables, "table", source, root)
    }

    pub fn points_loader(
        &self,
        source: &DataSource,
        root: &ProjectRoot,
    ) -> Result<Box<dyn DataLoader<dyn PointsData>>, DataError> {
        create(&self.points, "points", source, root)
    }

    pub fn shapes_loader(
        &self,
        source: &DataSource,
        root: &ProjectRoot,
    ) -> Result<Box<dyn DataLoader<dyn ShapesData>>, DataError> {
        create(&self.shapes, "shapes", source, root)
    }

    pub fn image_loader(
        &self,
        source: &DataSource,
        root: &ProjectRoot,
    ) -> Result<Box<dyn DataLoader<dyn ImageData>>, DataError> {
        create(&self.images, "image", source, root)
    }

    pub fn labels_loader(
        &self,
        source: &DataSource,
        root: &ProjectRoot,
    ) -> Result<Box<dyn DataLoader<dyn LabelsData>>, DataError> {
        create(&self.labels, "labels", source, root)
    }
}

fn create<D: ?Sized>(
    factories: &HashMap<String, LoaderFactory<D>>,
    kind: &'static str,
    source: &DataSource,
    root: &ProjectRoot,
) -> Result<Box<dyn DataLoader<D>>, DataError> {
    let factory = factories
        .get(&source.kind)
        .ok_or_else(|| DataError::UnregisteredType {
            kind,
            source_type: source.kind.clone(),
        })?;
    factory(source, root)
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn keys<V>(map: &HashMap<String, V>) -> Vec<&str> {
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            keys
        }
        f.debug_struct("LoaderRegistry")
            .field("tables", &keys(&self.tables))
            .field("points", &keys(&self.points))
            .field("shapes", &keys(&self.shapes))
            .field("images", &keys(&self.images))
            .field("labels", &keys(&self.labels))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TileSource;

    struct FixedImage(TileSource);

    impl ImageData for FixedImage {
        fn tile_source(&self) -> &TileSource {
            &self.0
        }
    }

    struct FixedImageLoader(TileSource);

    #[async_trait(?Send)]
    impl DataLoader<dyn ImageData> for FixedImageLoader {
        async fn load(
            &self,
            _tables: &dyn TableProvider,
            _signal: &AbortSignal,
        ) -> Result<Arc<dyn ImageData>, DataError> {
            Ok(Arc::new(FixedImage(self.0.clone())))
        }
    }

    #[test]
    fn test_unregistered_type_is_config_error() {
        let registry = LoaderRegistry::new();
        let err = registry
            .points_loader(&DataSource::new("parquet"), &ProjectRoot::none())
            .err()
            .unwrap();
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "no points loader registered for data source type 'parquet'"
        );
    }

    #[test]
    fn test_factory_receives_source_and_root() {
        let mut registry = LoaderRegistry::new();
        registry.register_image_loader("dzi", |source, root| {
            let path = source
                .option("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| DataError::MissingOption {
                    source_type: source.kind.clone(),
                    option: "path".to_string(),
                })?;
            let url = root
                .resolve(path)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| path.to_string());
            Ok(Box::new(FixedImageLoader(TileSource {
                url,
                width: 100,
                height: 50,
                tile_size: 256,
                levels: 1,
                format: "jpeg".to_string(),
            })) as Box<dyn DataLoader<dyn ImageData>>)
        });

        let source = DataSource::new("dzi").with_option("path", "he.dzi".into());
        let root = ProjectRoot::new("/proj");
        assert!(registry.image_loader(&source, &root).is_ok());
        assert!(registry
            .image_loader(&DataSource::new("dzi"), &root)
            .err()
            .unwrap()
            .is_config());
        // Registered for images only.
        assert!(registry.labels_loader(&source, &root).is_err());
    }

    #[test]
    fn test_builtin_registry_debug_lists_types() {
        let debug = format!("{:?}", LoaderRegistry::with_builtin());
        assert!(debug.contains("inline"));
        assert!(debug.contains("table"));
    }
}
