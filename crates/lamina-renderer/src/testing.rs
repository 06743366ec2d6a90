//! Loaders that cancel the running pass from inside a load.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;

use lamina_core::geometry::BBox;
use lamina_io::{
    AbortController, AbortSignal, Column, DataError, DataLoader, ImageData, ItemId, ItemsData,
    LoaderRegistry, MemoryImage, MemoryPoints, MemoryTable, PointsData, TableData,
    TableProvider, TileSource,
};

/// Counts loads and fires its controller on the `n`-th one.
#[derive(Debug)]
pub struct Tripwire {
    controller: AbortController,
    remaining: Cell<usize>,
    loads: Cell<usize>,
}

impl Tripwire {
    pub fn on_load(controller: &AbortController, n: usize) -> Rc<Self> {
        Rc::new(Self {
            controller: controller.clone(),
            remaining: Cell::new(n),
            loads: Cell::new(0),
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.get()
    }

    fn observe(&self, signal: &AbortSignal) -> Result<(), DataError> {
        self.loads.set(self.loads.get() + 1);
        match self.remaining.get() {
            0 => {}
            1 => {
                self.controller.abort();
                self.remaining.set(0);
            }
            n => self.remaining.set(n - 1),
        }
        signal.check()
    }
}

/// Registry with the built-in loaders plus `tripwire` points, table and
/// image loaders that all report to `wire`.
///
/// The table has four rows and a text column `stroke`. The points are
/// `(5, 7)` and `(6, 8)`.
pub fn tripwire_registry(wire: &Rc<Tripwire>) -> LoaderRegistry {
    let mut registry = LoaderRegistry::with_builtin();

    let points = Rc::clone(wire);
    registry.register_points_loader("tripwire", move |_, _| {
        Ok(Box::new(TripwireLoader(Rc::clone(&points))) as Box<dyn DataLoader<dyn PointsData>>)
    });
    let table = Rc::clone(wire);
    registry.register_table_loader("tripwire", move |_, _| {
        Ok(Box::new(TripwireLoader(Rc::clone(&table))) as Box<dyn DataLoader<dyn TableData>>)
    });
    let image = Rc::clone(wire);
    registry.register_image_loader("tripwire", move |_, _| {
        Ok(Box::new(TripwireLoader(Rc::clone(&image))) as Box<dyn DataLoader<dyn ImageData>>)
    });
    registry
}

struct TripwireLoader(Rc<Tripwire>);

#[async_trait(?Send)]
impl DataLoader<dyn PointsData> for TripwireLoader {
    async fn load(
        &self,
        _tables: &dyn TableProvider,
        _signal: &AbortSignal,
    ) -> Result<Arc<dyn PointsData>, DataError> {
        Ok(Arc::new(TripwirePoints {
            inner: MemoryPoints::new(vec![5.0, 6.0], vec![7.0, 8.0]),
            wire: Rc::clone(&self.0),
        }))
    }
}

#[async_trait(?Send)]
impl DataLoader<dyn TableData> for TripwireLoader {
    async fn load(
        &self,
        _tables: &dyn TableProvider,
        _signal: &AbortSignal,
    ) -> Result<Arc<dyn TableData>, DataError> {
        let index = (0..4_usize).map(ItemId::from).collect();
        let stroke = Column::Text(vec!["#ff0000".to_string(); 4]);
        Ok(Arc::new(TripwireTable {
            inner: MemoryTable::new(index).with_column("stroke", stroke),
            wire: Rc::clone(&self.0),
        }))
    }
}

#[async_trait(?Send)]
impl DataLoader<dyn ImageData> for TripwireLoader {
    async fn load(
        &self,
        _tables: &dyn TableProvider,
        signal: &AbortSignal,
    ) -> Result<Arc<dyn ImageData>, DataError> {
        self.0.observe(signal)?;
        Ok(Arc::new(MemoryImage(TileSource {
            url: "late.dzi".to_string(),
            width: 100,
            height: 50,
            tile_size: 256,
            levels: 1,
            format: "png".to_string(),
        })))
    }
}

/// Observes every coordinate load.
struct TripwirePoints {
    inner: MemoryPoints,
    wire: Rc<Tripwire>,
}

impl ItemsData for TripwirePoints {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn index(&self) -> &[ItemId] {
        self.inner.index()
    }

    fn bounds(&self) -> Option<BBox> {
        self.inner.bounds()
    }
}

#[async_trait(?Send)]
impl PointsData for TripwirePoints {
    async fn load_coordinates(
        &self,
        dimension: &str,
        signal: &AbortSignal,
    ) -> Result<Arc<[f32]>, DataError> {
        self.wire.observe(signal)?;
        self.inner.load_coordinates(dimension, signal).await
    }
}

/// Observes every column load.
struct TripwireTable {
    inner: MemoryTable,
    wire: Rc<Tripwire>,
}

#[async_trait(?Send)]
impl TableData for TripwireTable {
    fn index(&self) -> &[ItemId] {
        self.inner.index()
    }

    fn column_names(&self) -> Vec<String> {
        self.inner.column_names()
    }

    async fn load_column(
        &self,
        name: &str,
        signal: &AbortSignal,
    ) -> Result<Arc<Column>, DataError> {
        self.wire.observe(signal)?;
        self.inner.load_column(name, signal).await
    }
}
