//! Per-project data store.
//!
//! Loads tables and overlay data through the [`LoaderRegistry`] and caches
//! every successful load, keyed by table/object id, for as long as its data
//! source stays the same. Each load is stamped with a generation number so
//! the synchronizers can tell fresh data from data they already uploaded.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use lamina_core::object::{
    DataSource, ImageObject, LabelsObject, PointsObject, ShapesObject, Table,
};

use crate::data::{ImageData, LabelsData, PointsData, ShapesData, TableData};
use crate::error::DataError;
use crate::project::ProjectRoot;
use crate::registry::{DataLoader, LoaderRegistry, TableProvider};
use crate::signal::AbortSignal;

/// A loaded data set and the generation it was loaded in.
pub struct Loaded<D: ?Sized> {
    pub data: Arc<D>,
    pub generation: u64,
}

impl<D: ?Sized> Clone for Loaded<D> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            generation: self.generation,
        }
    }
}

impl<D: ?Sized> fmt::Debug for Loaded<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loaded")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

struct CacheEntry<D: ?Sized> {
    source: DataSource,
    loaded: Loaded<D>,
}

type Cache<D> = RefCell<HashMap<String, CacheEntry<D>>>;

pub struct DataStore {
    registry: LoaderRegistry,
    root: ProjectRoot,
    tables: Vec<Table>,
    table_cache: Cache<dyn TableData>,
    points_cache: Cache<dyn PointsData>,
    shapes_cache: Cache<dyn ShapesData>,
    image_cache: Cache<dyn ImageData>,
    labels_cache: Cache<dyn LabelsData>,
    generation: Cell<u64>,
}

impl DataStore {
    pub fn new(registry: LoaderRegistry, root: ProjectRoot) -> Self {
        Self {
            registry,
            root,
            tables: Vec::new(),
            table_cache: RefCell::default(),
            points_cache: RefCell::default(),
            shapes_cache: RefCell::default(),
            image_cache: RefCell::default(),
            labels_cache: RefCell::default(),
            generation: Cell::new(0),
        }
    }

    /// A store with the built-in loaders and no project root.
    pub fn in_memory() -> Self {
        Self::new(LoaderRegistry::with_builtin(), ProjectRoot::none())
    }

    pub fn registry(&self) -> &LoaderRegistry {
        &self.registry
    }

    pub fn root(&self) -> &ProjectRoot {
        &self.root
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Replaces the project table list.
    ///
    /// Cached tables that were removed or whose data source changed are
    /// evicted, together with overlay data read from them.
    pub fn set_tables(&mut self, tables: &[Table]) {
        let stale: Vec<String> = self
            .table_cache
            .get_mut()
            .iter()
            .filter(|(id, entry)| {
                !tables
                    .iter()
                    .any(|t| &t.id == *id && t.data_source == entry.source)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            debug!("evicting table '{id}'");
            self.table_cache.get_mut().remove(id);
            evict_dependents(self.points_cache.get_mut(), id);
            evict_dependents(self.shapes_cache.get_mut(), id);
        }
        self.tables = tables.to_vec();
    }

    pub fn table_source(&self, table_id: &str) -> Option<&DataSource> {
        self.tables
            .iter()
            .find(|t| t.id == table_id)
            .map(|t| &t.data_source)
    }

    /// Drops every cached data set.
    pub fn clear(&mut self) {
        self.table_cache.get_mut().clear();
        self.points_cache.get_mut().clear();
        self.shapes_cache.get_mut().clear();
        self.image_cache.get_mut().clear();
        self.labels_cache.get_mut().clear();
    }

    pub async fn load_table_data(
        &self,
        table_id: &str,
        signal: &AbortSignal,
    ) -> Result<Loaded<dyn TableData>, DataError> {
        let source = self
            .table_source(table_id)
            .ok_or_else(|| DataError::UnknownTable(table_id.to_string()))?
            .clone();
        self.load_cached(&self.table_cache, table_id, &source, signal, |s, r| {
            self.registry.table_loader(s, r)
        })
        .await
    }

    pub async fn load_points(
        &self,
        object: &PointsObject,
        signal: &AbortSignal,
    ) -> Result<Loaded<dyn PointsData>, DataError> {
        self.load_cached(
            &self.points_cache,
            object.id.as_str(),
            &object.data_source,
            signal,
            |s, r| self.registry.points_loader(s, r),
        )
        .await
    }

    pub async fn load_shapes(
        &self,
        object: &ShapesObject,
        signal: &AbortSignal,
    ) -> Result<Loaded<dyn ShapesData>, DataError> {
        self.load_cached(
            &self.shapes_cache,
            object.id.as_str(),
            &object.data_source,
            signal,
            |s, r| self.registry.shapes_loader(s, r),
        )
        .await
    }

    pub async fn load_image(
        &self,
        object: &ImageObject,
        signal: &AbortSignal,
    ) -> Result<Loaded<dyn ImageData>, DataError> {
        self.load_cached(
            &self.image_cache,
            object.id.as_str(),
            &object.data_source,
            signal,
            |s, r| self.registry.image_loader(s, r),
        )
        .await
    }

    pub async fn load_labels(
        &self,
        object: &LabelsObject,
        signal: &AbortSignal,
    ) -> Result<Loaded<dyn LabelsData>, DataError> {
        self.load_cached(
            &self.labels_cache,
            object.id.as_str(),
            &object.data_source,
            signal,
            |s, r| self.registry.labels_loader(s, r),
        )
        .await
    }

    async fn load_cached<D, F>(
        &self,
        cache: &Cache<D>,
        key: &str,
        source: &DataSource,
        signal: &AbortSignal,
        create: F,
    ) -> Result<Loaded<D>, DataError>
    where
        D: ?Sized,
        F: FnOnce(&DataSource, &ProjectRoot) -> Result<Box<dyn DataLoader<D>>, DataError>,
    {
        let cached = cache
            .borrow()
            .get(key)
            .filter(|entry| entry.source == *source)
            .map(|entry| entry.loaded.clone());
        if let Some(loaded) = cached {
            return Ok(loaded);
        }

        signal.check()?;
        let loader = create(source, &self.root)?;
        let data = loader.load(self, signal).await?;
        signal.check()?;

        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        debug!(
            "loaded '{key}' from '{}' data source (generation {generation})",
            source.kind
        );
        let loaded = Loaded { data, generation };
        cache.borrow_mut().insert(
            key.to_string(),
            CacheEntry {
                source: source.clone(),
                loaded: loaded.clone(),
            },
        );
        Ok(loaded)
    }
}

/// Removes overlay data whose source reads the given table.
fn evict_dependents<D: ?Sized>(cache: &mut HashMap<String, CacheEntry<D>>, table_id: &str) {
    cache.retain(|_, entry| {
        entry.source.option("table").and_then(|v| v.as_str()) != Some(table_id)
    });
}

#[async_trait(?Send)]
impl TableProvider for DataStore {
    async fn load_table(
        &self,
        table_id: &str,
        signal: &AbortSignal,
    ) -> Result<Arc<dyn TableData>, DataError> {
        Ok(self.load_table_data(table_id, signal).await?.data)
    }
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("registry", &self.registry)
            .field("root", &self.root)
            .field("tables", &self.tables.len())
            .field("generation", &self.generation.get())
            .finish()
    }
}
